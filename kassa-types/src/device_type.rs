//! Device type (answer to `0xA5`)

use std::fmt;

use bytes::Bytes;
use kassa_core::constants::NO_ERROR;

use crate::{
    error::{Error, Result},
    result::DeviceResult,
};

const HEADER_LEN: usize = 11;

/// Device identification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceType {
    pub protocol_version: u8,
    pub device_type: u8,
    pub model: u8,
    pub mode: [u8; 2],
    pub version: [u8; 5],
    /// Device name in the device charset
    pub name: Bytes,
}

impl DeviceType {
    /// Parse a device type answer
    ///
    /// ```text
    /// error code | protocol | type | model | mode(2) | version(5) | name...
    /// ```
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let Some(&error_code) = buf.first() else {
            return Err(Error::TooShort {
                expected: HEADER_LEN,
                actual: 0,
            });
        };
        if error_code != NO_ERROR {
            return Err(Error::Device(DeviceResult::new(0, error_code, 0)));
        }
        if buf.len() < HEADER_LEN {
            return Err(Error::TooShort {
                expected: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let mut mode = [0u8; 2];
        mode.copy_from_slice(&buf[4..6]);
        let mut version = [0u8; 5];
        version.copy_from_slice(&buf[6..11]);

        Ok(Self {
            protocol_version: buf[1],
            device_type: buf[2],
            model: buf[3],
            mode,
            version,
            name: Bytes::copy_from_slice(&buf[HEADER_LEN..]),
        })
    }

    /// Device name, ASCII part only
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [type: {}, model: {}, protocol: {}]",
            self.name_lossy(),
            self.device_type,
            self.model,
            self.protocol_version
        )
    }
}
