//! Packet and task identifier generation

use std::sync::atomic::{AtomicU8, Ordering};

use crate::constants::MAX_ID;

/// Wrapping identifier counter
///
/// Advances through `0..=MAX_ID` and wraps to 0. The counter starts at 0, so
/// the first issued identifier is 1. Thread-safe; every caller gets a
/// distinct value until the counter wraps.
///
/// # Examples
///
/// ```
/// use kassa_core::IdSequence;
///
/// let ids = IdSequence::new();
/// assert_eq!(ids.next_id(), 1);
/// assert_eq!(ids.next_id(), 2);
/// ```
#[derive(Debug, Default)]
pub struct IdSequence {
    counter: AtomicU8,
}

impl IdSequence {
    /// Create a sequence whose first identifier is 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the next identifier
    pub fn next_id(&self) -> u8 {
        let previous = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| Some(Self::step(id)))
            .unwrap_or_else(|id| id);
        Self::step(previous)
    }

    fn step(id: u8) -> u8 {
        if id >= MAX_ID { 0 } else { id + 1 }
    }
}
