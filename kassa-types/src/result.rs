//! Command results

use std::fmt;

use kassa_core::constants::NO_ERROR;

use crate::error::{Error, Result};

/// Outcome header of a device answer
///
/// A normal answer starts with `response code | error code | error ext`.
/// A non-zero error code is a business error reported by the device, not a
/// driver failure.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceResult {
    pub response_code: u8,
    pub error_code: u8,
    pub error_ext: u8,
}

impl DeviceResult {
    pub fn new(response_code: u8, error_code: u8, error_ext: u8) -> Self {
        Self {
            response_code,
            error_code,
            error_ext,
        }
    }

    /// Result of steps that never reach the device
    pub fn success() -> Self {
        Self::default()
    }

    /// Parse the three header bytes of an answer
    pub fn parse(buf: &[u8]) -> Result<Self> {
        match buf {
            [response_code, error_code, error_ext, ..] => {
                Ok(Self::new(*response_code, *error_code, *error_ext))
            }
            _ => Err(Error::TooShort {
                expected: 3,
                actual: buf.len(),
            }),
        }
    }

    /// Check if the device reported an error
    pub fn has_error(&self) -> bool {
        self.error_code != NO_ERROR
    }
}

impl fmt::Display for DeviceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_error() {
            return write!(f, "OK");
        }
        if self.error_ext == NO_ERROR {
            write!(f, "error {}", self.error_code)
        } else {
            write!(f, "error {}.{}", self.error_code, self.error_ext)
        }
    }
}

/// Answer carrying decoded data unless the device reported an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    pub result: DeviceResult,
    pub data: Option<T>,
}

impl<T> Reply<T> {
    pub fn ok(result: DeviceResult, data: T) -> Self {
        Self {
            result,
            data: Some(data),
        }
    }

    pub fn failed(result: DeviceResult) -> Self {
        Self { result, data: None }
    }

    pub fn has_error(&self) -> bool {
        self.result.has_error()
    }

    /// Decoded data, or the reported error
    pub fn into_data(self) -> Result<T> {
        match self.data {
            Some(data) => Ok(data),
            None => Err(Error::Device(self.result)),
        }
    }
}
