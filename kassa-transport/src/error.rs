//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Read timeout")]
    ReadTimeout,

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Inbound stream already handed to a subscriber")]
    AlreadySubscribed,

    #[error("Pull reads are unavailable while a subscriber owns the inbound stream")]
    Subscribed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Check if the operation may succeed when simply retried
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout | Self::ConnectionTimeout)
    }

    /// Check if the link is gone and must be re-established
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectionClosed | Self::Io(_))
    }
}
