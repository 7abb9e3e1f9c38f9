//! # kassa-core
//!
//! Wire-level primitives for ATOL fiscal cash registers.
//!
//! This crate provides:
//! - Ring buffer for stream reassembly
//! - v3 packet structure, escaping and CRC8
//! - Incremental v3 packet reader
//! - v2 frame encoding with XOR checksum
//! - Task envelopes, opcodes and status codes
//! - BCD helpers and the access password
//! - Protocol constants

pub mod auth;
pub mod bcd;
pub mod buffer;
pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod frame;
pub mod packet;
pub mod reader;
pub mod sequence;
pub mod status;

pub use auth::Password;
pub use buffer::RingByteBuffer;
pub use command::{Opcode, TaskFlags};
pub use error::{Error, Result};
pub use packet::Packet;
pub use reader::PacketReader;
pub use sequence::IdSequence;
pub use status::Status;
