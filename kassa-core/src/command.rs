//! Transport-level (v3) command definitions
//!
//! These opcodes address the device's task queue, not the fiscal command set.
//! Business commands travel as the opaque payload of an [`Opcode::Add`]
//! envelope.

use std::fmt;

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Task queue opcodes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Add a task to the queue
    Add = 0xC1,

    /// Acknowledge a task result
    Ack = 0xC2,

    /// Request task status
    Req = 0xC3,

    /// Clear the task queue
    Abort = 0xC4,

    /// Acknowledge a result and add a new task in one envelope
    AckAdd = 0xC5,
}

impl Opcode {
    /// Get opcode name
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Ack => "ACK",
            Self::Req => "REQ",
            Self::Abort => "ABORT",
            Self::AckAdd => "ACK_ADD",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0xC1 => Ok(Self::Add),
            0xC2 => Ok(Self::Ack),
            0xC3 => Ok(Self::Req),
            0xC4 => Ok(Self::Abort),
            0xC5 => Ok(Self::AckAdd),
            _ => Err(Error::UnknownOpcode(value)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

bitflags! {
    /// Flags of an `Add` envelope
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TaskFlags: u8 {
        /// The device must report the task result
        const NEED_RESULT = 0x01;
        /// Keep the queue running if this task fails
        const IGNORE_ERROR = 0x02;
        /// Execute asynchronously
        const ASYNC = 0x04;
    }
}

/// Build an `Add` envelope: `ADD | FLAGS | TASK_ID | PAYLOAD`
///
/// # Examples
///
/// ```
/// use kassa_core::command::{add_task, TaskFlags};
///
/// let envelope = add_task(3, TaskFlags::NEED_RESULT, &[0x3F]);
/// assert_eq!(envelope.as_ref(), &[0xC1, 0x01, 0x03, 0x3F]);
/// ```
pub fn add_task(task_id: u8, flags: TaskFlags, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(3 + payload.len());
    buf.put_u8(Opcode::Add.into());
    buf.put_u8(flags.bits());
    buf.put_u8(task_id);
    buf.put_slice(payload);
    buf.freeze()
}

/// Build an `Ack` envelope: `ACK | TASK_ID`
pub fn ack(task_id: u8) -> Bytes {
    Bytes::copy_from_slice(&[Opcode::Ack.into(), task_id])
}

/// Build the `Abort` envelope
pub fn abort() -> Bytes {
    Bytes::from_static(&[Opcode::Abort as u8])
}
