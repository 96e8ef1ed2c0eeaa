//! The wire layer: endian helpers and the frame codec (§4.1).

pub mod endian;
pub mod frame;

pub use frame::{FrameCodec, IncomingFrame, Protocol, Request, ResponseBody, BASIC_MAX_PAYLOAD};
