//! Error taxonomy for the panel session.
//!
//! One flat enum per failure domain, in the spirit of the teacher's
//! `EncryptedError` — callers match on variants rather than downcast.

use std::fmt;

/// Errors produced anywhere in a panel session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pre-flight validation failure (missing/malformed credentials, bad
    /// arguments) that never reaches the wire.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The panel rejected authentication outright.
    #[error("permission denied: {0}")]
    Permission(String),

    /// TLS/TCP failure, heartbeat expiry, or connect timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// A command was answered with an FD (NACK) frame.
    #[error("panel rejected command (0x{code:02X}): {text}")]
    Nack { code: u8, text: &'static str },

    /// A response frame with an unrecognised status byte, or a frame whose
    /// shape doesn't match the three documented kinds.
    #[error("unexpected response: {}", hex::encode(.0))]
    UnexpectedResponse(Vec<u8>),

    /// History or enum decoding failure. Callers that load best-effort data
    /// (history, alarm memory) downgrade this to a logged warning rather
    /// than failing the whole operation.
    #[error("decode error: {0}")]
    Decode(String),

    /// No transport is currently attached to the session.
    #[error("not connected")]
    NotConnected,

    /// A caller-supplied deadline elapsed while awaiting a response.
    #[error("command timed out")]
    Timeout,
}

impl Error {
    pub fn nack(code: u8) -> Self {
        Error::Nack { code, text: super::commands::error_text(code) }
    }

    pub fn configuration(msg: impl fmt::Display) -> Self {
        Error::Configuration(msg.to_string())
    }

    pub fn transport(msg: impl fmt::Display) -> Self {
        Error::Transport(msg.to_string())
    }

    pub fn decode(msg: impl fmt::Display) -> Self {
        Error::Decode(msg.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
