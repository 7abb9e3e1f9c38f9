//! Access password
//!
//! Every command sent to the device starts with the access password of the
//! operator. The device ships with password `0000`, stored as two BCD bytes.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{bcd, error::Result};

/// Width of the numeric access code in BCD bytes
pub const PASSWORD_LEN: usize = 2;

/// Access password prefixed to outgoing commands
///
/// # Examples
///
/// ```
/// use kassa_core::Password;
///
/// let password = Password::from_code(30).unwrap();
/// assert_eq!(password.prefix(&[0x3F]).as_ref(), &[0x00, 0x30, 0x3F]);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Password {
    bytes: Bytes,
}

impl Password {
    /// Use raw password bytes as they go on the wire
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Numeric access code (`0..=9999`)
    pub fn from_code(code: u32) -> Result<Self> {
        Ok(Self::new(bcd::encode(code as u64, PASSWORD_LEN)?.freeze()))
    }

    /// Wire representation
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Build `password | command`
    pub fn prefix(&self, command: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.bytes.len() + command.len());
        buf.put_slice(&self.bytes);
        buf.put_slice(command);
        buf.freeze()
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::new(Bytes::from_static(&[0x00, 0x00]))
    }
}

// Never print the secret itself
impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("len", &self.bytes.len())
            .finish()
    }
}
