//! Task status codes reported by the device

use std::fmt;

use crate::error::{Error, Result};

/// Task status
///
/// The first byte of every non-empty v3 response payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Queued
    Pending = 0xA1,
    /// Executing
    InProgress = 0xA2,
    /// Finished without error
    Result = 0xA3,
    /// Finished with error
    Error = 0xA4,
    /// Stopped because an earlier task failed
    Stopped = 0xA5,
    /// Asynchronous completion without error (followed by a task id byte)
    AsyncResult = 0xA6,
    /// Asynchronous completion with error (followed by a task id byte)
    AsyncError = 0xA7,
    /// Waiting for an external device
    Waiting = 0xA8,

    // Queue rejects
    /// Task queue overflow
    Overflow = 0xB1,
    /// Task id already queued
    AlreadyExists = 0xB2,
    /// Task id not found
    NotFound = 0xB3,
    /// Illegal envelope value
    IllegalValue = 0xB4,
}

impl Status {
    /// Check if an explicit task id byte follows the status
    pub fn is_async(self) -> bool {
        matches!(self, Self::AsyncResult | Self::AsyncError)
    }

    /// Fold asynchronous completions onto their synchronous counterparts
    pub fn synchronous(self) -> Self {
        match self {
            Self::AsyncResult => Self::Result,
            Self::AsyncError => Self::Error,
            other => other,
        }
    }

    /// Check if the device has finished with the task
    ///
    /// Only `Result` and `Error` carry the command answer.
    pub fn is_final(self) -> bool {
        matches!(self.synchronous(), Self::Result | Self::Error)
    }

    /// Check if the device refused or dropped the task
    pub fn is_reject(self) -> bool {
        matches!(
            self,
            Self::Stopped
                | Self::Overflow
                | Self::AlreadyExists
                | Self::NotFound
                | Self::IllegalValue
        )
    }

    /// Check if no further status will arrive for the task
    pub fn is_terminal(self) -> bool {
        self.is_final() || self.is_reject()
    }

    /// Get status name
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Result => "RESULT",
            Self::Error => "ERROR",
            Self::Stopped => "STOPPED",
            Self::AsyncResult => "ASYNC_RESULT",
            Self::AsyncError => "ASYNC_ERROR",
            Self::Waiting => "WAITING",
            Self::Overflow => "OVERFLOW",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::IllegalValue => "ILLEGAL_VALUE",
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0xA1 => Ok(Status::Pending),
            0xA2 => Ok(Status::InProgress),
            0xA3 => Ok(Status::Result),
            0xA4 => Ok(Status::Error),
            0xA5 => Ok(Status::Stopped),
            0xA6 => Ok(Status::AsyncResult),
            0xA7 => Ok(Status::AsyncError),
            0xA8 => Ok(Status::Waiting),
            0xB1 => Ok(Status::Overflow),
            0xB2 => Ok(Status::AlreadyExists),
            0xB3 => Ok(Status::NotFound),
            0xB4 => Ok(Status::IllegalValue),
            _ => Err(Error::UnknownStatus(value)),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> u8 {
        status as u8
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}
