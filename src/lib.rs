//! Async client for Bosch's "Mode 2" automation protocol, spoken by
//! Solution, AMAX, and B/G family alarm panels.
//!
//! A [`Panel`] dials a panel over TLS, negotiates the panel's capabilities,
//! authenticates with the family-appropriate credential scheme, loads
//! areas/points/outputs/doors and their live status, then keeps that model
//! current via the panel's push-subscription mechanism (falling back to a
//! 1-second poll on panels that don't support it). A background supervisor
//! reconnects on idle timeout and resets the connection if a known panel
//! firmware bug desynchronizes the request/response multiplexer.

pub mod auth;
pub mod capability;
pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod loader;
pub mod model;
pub mod multiplexer;
pub mod observable;
pub mod panel;
pub mod subscription;
mod supervisor;
pub mod transport;

pub use config::{Credentials, PanelConfig};
pub use error::{Error, Result};
pub use history::HistoryEvent;
pub use loader::LoadSelector;
pub use model::{Area, AreaStatus, Door, DoorStatus, Output, OutputStatus, Point, PointStatus, ReadyStatus};
pub use panel::{ConnectionStatus, Panel};
pub use transport::{LenientTlsProvider, TlsProvider};
