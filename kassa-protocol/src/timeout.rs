//! Timing table of the v2 exchange

use std::collections::HashMap;
use std::time::Duration;

/// v2 exchange timeouts
///
/// | name | waits for                                  | default |
/// |------|--------------------------------------------|---------|
/// | T1   | answer to ENQ                              | 500 ms  |
/// | T2   | first byte of the response frame           | 2 s     |
/// | T3   | pause after an unexpected handshake answer | 500 ms  |
/// | T4   | ACK after a frame                          | 500 ms  |
/// | T5   | ENQ opening the response (per opcode)      | 10 s    |
/// | T6   | next byte inside a frame                   | 500 ms  |
/// | T7   | back-off after line contention             | 500 ms  |
/// | T8   | EOT closing the response                   | 1 s     |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub t1: Duration,
    pub t2: Duration,
    pub t3: Duration,
    pub t4: Duration,
    pub t5: Duration,
    pub t6: Duration,
    pub t7: Duration,
    pub t8: Duration,
    t5_by_opcode: HashMap<u8, Duration>,
}

impl Timeouts {
    /// Response timeout for a command opcode
    ///
    /// Slow fiscal operations (reports, fiscal storage access) answer after
    /// up to two minutes.
    pub fn t5(&self, opcode: u8) -> Duration {
        self.t5_by_opcode.get(&opcode).copied().unwrap_or(self.t5)
    }

    /// Override the response timeout of one opcode
    pub fn with_t5(mut self, opcode: u8, timeout: Duration) -> Self {
        self.t5_by_opcode.insert(opcode, timeout);
        self
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        let table: [(&[u8], u64); 6] = [
            (&[0x6B], 10_000),
            (&[0x8D, 0x8E, 0xA7, 0x4A], 20_000),
            (&[0x5A], 40_000),
            (&[0x91], 45_000),
            (&[0xA6, 0xE6, 0xEA, 0xEB], 50_000),
            (&[0xA8, 0xAB], 120_000),
        ];
        let t5_by_opcode = table
            .iter()
            .flat_map(|(opcodes, ms)| {
                opcodes
                    .iter()
                    .map(move |&op| (op, Duration::from_millis(*ms)))
            })
            .collect();

        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_millis(2000),
            t3: Duration::from_millis(500),
            t4: Duration::from_millis(500),
            t5: Duration::from_millis(10_000),
            t6: Duration::from_millis(500),
            t7: Duration::from_millis(500),
            t8: Duration::from_millis(1000),
            t5_by_opcode,
        }
    }
}
