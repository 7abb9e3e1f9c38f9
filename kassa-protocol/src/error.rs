//! Protocol engine errors

use kassa_core::Status;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] kassa_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] kassa_transport::Error),

    #[error("Protocol not started")]
    NotStarted,

    #[error("Protocol already started")]
    AlreadyStarted,

    #[error("Task cancelled before the device answered")]
    Cancelled,

    #[error("Task rejected by device: {0}")]
    TaskRejected(Status),

    #[error("Device not ready to receive")]
    DeviceNotReady,

    #[error("Device did not acknowledge the frame")]
    NotAcknowledged,

    #[error("No valid response after {0} attempts")]
    NoValidResponse(usize),
}

impl Error {
    /// Check if the session may continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_framing(),
            Self::Transport(e) => e.is_timeout(),
            Self::Cancelled
            | Self::TaskRejected(_)
            | Self::DeviceNotReady
            | Self::NotAcknowledged
            | Self::NoValidResponse(_) => true,
            Self::NotStarted | Self::AlreadyStarted => false,
        }
    }

    /// Check if the connection must be re-established
    pub fn requires_reconnect(&self) -> bool {
        match self {
            Self::Transport(e) => e.requires_reconnect(),
            Self::NotStarted => true,
            _ => false,
        }
    }
}
