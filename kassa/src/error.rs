//! High-level error types

use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] kassa_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] kassa_transport::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] kassa_protocol::Error),

    #[error("Type error: {0}")]
    Types(#[from] kassa_types::Error),

    #[error("Device not connected")]
    NotConnected,

    #[error("No answer from device within {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Check if the session may continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_framing(),
            Self::Transport(e) => e.is_timeout(),
            Self::Protocol(e) => e.is_recoverable(),
            Self::Types(_) | Self::Timeout(_) => true,
            Self::NotConnected => false,
        }
    }

    /// Check if the connection must be re-established
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Self::Transport(e) => e.requires_reconnect(),
            Self::Protocol(e) => e.requires_reconnect(),
            Self::NotConnected => true,
            _ => false,
        }
    }
}
