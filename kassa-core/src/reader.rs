//! Incremental v3 frame reassembly
//!
//! Bytes arrive in arbitrary chunks. The reader keeps them in a
//! [`RingByteBuffer`] and cuts out complete raw frames:
//!
//! 1. Locate `STX`, discarding anything in front of it
//! 2. Wait for the 5-byte minimum, then read the declared length
//! 3. Every `ESC` inside the declared span adds one physical byte
//! 4. Extract only when the whole physical span is buffered

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{
    buffer::RingByteBuffer,
    constants::v3::{ESC, MIN_FRAME_SIZE, STX},
    packet::declared_len,
};

/// Reassembles raw v3 frames from a byte stream
///
/// Owned by a single consumer; frames come out in arrival order and are
/// validated separately with [`Packet::decode`](crate::Packet::decode).
///
/// # Examples
///
/// ```
/// use kassa_core::{Packet, PacketReader};
///
/// let frame = Packet::new(7, vec![0xA3, 0x01]).encode();
/// let mut reader = PacketReader::new();
///
/// reader.push(&frame[..3]);
/// assert!(reader.next_frame().is_none());
///
/// reader.push(&frame[3..]);
/// assert_eq!(reader.next_frame().unwrap(), frame.freeze());
/// ```
#[derive(Debug, Default)]
pub struct PacketReader {
    buffer: RingByteBuffer,
}

impl PacketReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received chunk
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.append(chunk);
    }

    /// Number of bytes waiting for a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Cut the next complete raw frame out of the buffer
    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            let Some(start) = self.buffer.find(STX, 0) else {
                if !self.buffer.is_empty() {
                    debug!("Discarding {} bytes without frame start", self.buffer.len());
                    self.buffer.clear();
                }
                return None;
            };
            if start > 0 {
                debug!("Discarding {} bytes before frame start", start);
                self.buffer.skip(start).ok()?;
            }

            if self.buffer.len() < MIN_FRAME_SIZE {
                return None;
            }

            let declared = declared_len(self.buffer.get(1)?, self.buffer.get(2)?);
            let mut span = declared + MIN_FRAME_SIZE;

            let mut cursor = self.buffer.find(ESC, 4);
            while let Some(index) = cursor {
                if index >= span {
                    break;
                }
                span += 1;
                cursor = self.buffer.find(ESC, index + 2);
            }

            // STX never appears unescaped inside a frame: a second one means
            // the current frame was cut short
            if let Some(next) = self.buffer.find(STX, 1) {
                if next < span {
                    debug!("Truncated frame, resynchronising at offset {}", next);
                    self.buffer.skip(next).ok()?;
                    continue;
                }
            }

            if self.buffer.len() < span {
                return None;
            }

            let frame = self.buffer.take(span).ok()?;
            trace!("Reassembled frame: {}", hex::encode(&frame));
            return Some(frame);
        }
    }
}
