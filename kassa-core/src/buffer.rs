//! Byte buffer for stream reassembly
//!
//! Bytes are appended at the tail and consumed from the head. Extraction only
//! copies once a whole frame is known to be present.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Default initial capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// Append-at-tail, consume-at-head byte buffer
///
/// Invariant: `head <= tail <= capacity`. The cursors reset to `(0, 0)`
/// whenever the buffer is drained.
///
/// Not synchronized: every mutating call takes `&mut self`.
///
/// # Examples
///
/// ```
/// use kassa_core::RingByteBuffer;
///
/// let mut buf = RingByteBuffer::new();
/// buf.append(&[1, 2, 3, 4]);
/// buf.skip(1).unwrap();
///
/// assert_eq!(buf.find(3, 0), Some(1));
/// assert_eq!(buf.take(2).unwrap().as_ref(), &[2, 3]);
/// assert_eq!(buf.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RingByteBuffer {
    data: Vec<u8>,
    head: usize,
    tail: usize,
}

impl RingByteBuffer {
    /// Create a buffer with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a buffer with the given initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            head: 0,
            tail: 0,
        }
    }

    /// Number of stored bytes
    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current backing capacity
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Append bytes at the tail
    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.data[self.tail..self.tail + bytes.len()].copy_from_slice(bytes);
        self.tail += bytes.len();
    }

    /// Peek at the byte at logical offset `index`
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len() {
            Some(self.data[self.head + index])
        } else {
            None
        }
    }

    /// Copy and remove `count` bytes from the head
    pub fn take(&mut self, count: usize) -> Result<Bytes> {
        self.check(count)?;
        let out = Bytes::copy_from_slice(&self.data[self.head..self.head + count]);
        self.advance(count);
        Ok(out)
    }

    /// Drop `count` bytes from the head without copying
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.check(count)?;
        self.advance(count);
        Ok(())
    }

    /// Find the first `byte` at or after logical offset `from`
    pub fn find(&self, byte: u8, from: usize) -> Option<usize> {
        let start = self.head.checked_add(from)?;
        if start >= self.tail {
            return None;
        }
        self.data[start..self.tail]
            .iter()
            .position(|&b| b == byte)
            .map(|pos| pos + from)
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    fn check(&self, count: usize) -> Result<()> {
        if count > self.len() {
            return Err(Error::OutOfBounds {
                requested: count,
                available: self.len(),
            });
        }
        Ok(())
    }

    fn advance(&mut self, count: usize) {
        self.head += count;
        if self.head == self.tail {
            self.clear();
        }
    }

    /// Make room for `extra` bytes at the tail
    fn ensure(&mut self, extra: usize) {
        let len = self.len();

        if self.capacity() - len < extra {
            // Grow: double plus what was asked for
            let mut grown = vec![0; self.capacity() * 2 + extra];
            grown[..len].copy_from_slice(&self.data[self.head..self.tail]);
            self.data = grown;
            self.head = 0;
            self.tail = len;
        } else if self.capacity() - self.tail < extra {
            // Enough space overall, compact in place
            self.data.copy_within(self.head..self.tail, 0);
            self.head = 0;
            self.tail = len;
        }
    }
}

impl Default for RingByteBuffer {
    fn default() -> Self {
        Self::new()
    }
}
