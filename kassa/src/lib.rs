//! # kassa
//!
//! Driver for ATOL fiscal cash registers.
//!
//! ## Features
//!
//! - Pipelined v3 protocol with asynchronous answer correlation
//! - Legacy half-duplex v2 protocol
//! - Automatic return to mode selection after failed commands
//! - Command chains with short-circuit on device errors
//!
//! ## Quick Start
//!
//! ```no_run
//! use kassa::CashRegister;
//!
//! #[tokio::main]
//! async fn main() -> kassa::Result<()> {
//!     let mut register = CashRegister::tcp("192.168.1.10", 5555);
//!     let device = register.connect().await?;
//!     println!("{}", device);
//!
//!     let result = register.command().cancel_bill().reset_mode().execute().await?;
//!     println!("{}", result);
//!
//!     register.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod chain;
pub mod command;
pub mod device;
pub mod error;

#[cfg(test)]
mod testing;

// Re-exports
pub use chain::CommandChain;
pub use command::{
    BasicCommand, CancelBill, Command, DeviceStateRequest, DeviceTypeRequest, Outcome,
    ResetMode, Step, Wait,
};
pub use device::CashRegister;
pub use error::{Error, Result};

pub use kassa_core::{Password, Status};
pub use kassa_protocol::{Protocol, ProtocolV2, ProtocolV3, ProtocolVersion, Timeouts};
pub use kassa_transport::{TcpTransport, Transport};
pub use kassa_types::{DeviceResult, DeviceState, DeviceType, Reply, StateFlags};
