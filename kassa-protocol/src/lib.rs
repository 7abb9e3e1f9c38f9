//! # kassa-protocol
//!
//! Transport protocol engines for ATOL cash registers.
//!
//! - [`ProtocolV3`]: pipelined packets with packet ids, task ids and CRC8;
//!   answers are correlated asynchronously by a background receive worker
//! - [`ProtocolV2`]: legacy half-duplex lock-step exchange
//!
//! Both carry opaque command payloads and hand back the device's answer
//! through a [`Completion`].

pub mod completion;
pub mod error;
pub mod timeout;
pub mod v2;
pub mod v3;

pub use completion::Completion;
pub use error::{Error, Result};
pub use timeout::Timeouts;
pub use v2::ProtocolV2;
pub use v3::ProtocolV3;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

/// Wire protocol generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V2,
    V3,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V2 => write!(f, "v2"),
            Self::V3 => write!(f, "v3"),
        }
    }
}

/// Transport protocol engine
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Connect the transport and begin processing
    async fn start(&self) -> Result<()>;

    /// Stop processing and disconnect; pending completions are cancelled
    async fn stop(&self) -> Result<()>;

    /// Deliver a command payload
    async fn send(&self, message: Bytes) -> Result<Completion>;

    /// Clear the device's task queue
    ///
    /// Engines without a task queue log a warning and do nothing.
    async fn abort(&self) -> Result<()> {
        warn!("Protocol {} has no task queue to abort", self.version());
        Ok(())
    }

    /// Check if [`Protocol::abort`] has an effect
    fn supports_abort(&self) -> bool {
        false
    }

    /// Forget a pending task; its completion resolves to [`Error::Cancelled`]
    ///
    /// Returns `true` if the task was pending.
    fn cancel(&self, task_id: u8) -> bool {
        let _ = task_id;
        false
    }

    /// Wire protocol generation
    fn version(&self) -> ProtocolVersion;
}
