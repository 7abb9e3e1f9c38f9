//! Type definitions for kassa
//!
//! Decoded answers of the commands the driver itself relies on.

pub mod device_state;
pub mod device_type;
pub mod error;
pub mod result;

pub use device_state::{DeviceState, StateFlags};
pub use device_type::DeviceType;
pub use error::{Error, Result};
pub use result::{DeviceResult, Reply};
