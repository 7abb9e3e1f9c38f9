//! Scripted protocol engine for session tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use kassa_core::auth::PASSWORD_LEN;
use kassa_core::constants::opcodes;
use kassa_protocol::{Completion, Protocol, ProtocolVersion};
use parking_lot::Mutex;

/// Protocol answering each opcode from a script
///
/// Unscripted opcodes answer with a plain success header.
pub(crate) struct ScriptedProtocol {
    script: Arc<Script>,
}

#[derive(Default)]
pub(crate) struct Script {
    answers: Mutex<HashMap<u8, VecDeque<Bytes>>>,
    failing: Mutex<Vec<u8>>,
    sent: Mutex<Vec<Bytes>>,
    aborts: AtomicUsize,
}

impl ScriptedProtocol {
    pub(crate) fn new() -> (Self, Arc<Script>) {
        let script = Arc::new(Script::default());
        script.answer(opcodes::DEVICE_STATE, state(0x00, 0));
        script.answer(opcodes::DEVICE_TYPE, device_type());
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }
}

impl Script {
    /// Answer used for every later `opcode` request
    pub(crate) fn answer(&self, opcode: u8, answer: impl Into<Bytes>) {
        let mut answers = self.answers.lock();
        let queue = answers.entry(opcode).or_default();
        queue.clear();
        queue.push_back(answer.into());
    }

    /// Answer used for the next `opcode` request only
    ///
    /// Queued before the standing answer set by [`Script::answer`].
    pub(crate) fn answer_once(&self, opcode: u8, answer: impl Into<Bytes>) {
        self.answers
            .lock()
            .entry(opcode)
            .or_default()
            .push_front(answer.into());
    }

    /// Make `opcode` requests fail at the transport level
    pub(crate) fn fail(&self, opcode: u8) {
        self.failing.lock().push(opcode);
    }

    pub(crate) fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    pub(crate) fn sent_opcodes(&self) -> Vec<u8> {
        self.sent
            .lock()
            .iter()
            .filter_map(|message| message.get(PASSWORD_LEN).copied())
            .collect()
    }

    pub(crate) fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    fn next_answer(&self, opcode: u8) -> Bytes {
        let mut answers = self.answers.lock();
        match answers.get_mut(&opcode) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => Bytes::from_static(&[0x55, 0x00, 0x00]),
        }
    }
}

#[async_trait]
impl Protocol for ScriptedProtocol {
    async fn start(&self) -> kassa_protocol::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> kassa_protocol::Result<()> {
        Ok(())
    }

    async fn send(&self, message: Bytes) -> kassa_protocol::Result<Completion> {
        let opcode = message.get(PASSWORD_LEN).copied().unwrap_or_default();
        self.script.sent.lock().push(message);

        if self.script.failing.lock().contains(&opcode) {
            return Err(kassa_transport::Error::ConnectionClosed.into());
        }
        Ok(Completion::ready(self.script.next_answer(opcode)))
    }

    async fn abort(&self) -> kassa_protocol::Result<()> {
        self.script.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_abort(&self) -> bool {
        true
    }

    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V3
    }
}

/// Device state answer with the given mode byte and bill state
pub(crate) fn state(mode: u8, bill_state: u8) -> Bytes {
    let mut buf = vec![0u8; kassa_types::device_state::STATE_LEN];
    buf[0] = 0x44;
    buf[3..6].copy_from_slice(&[0x24, 0x01, 0x01]);
    buf[17] = mode;
    buf[22] = bill_state;
    buf.into()
}

pub(crate) fn device_type() -> Bytes {
    let mut buf = vec![0x00, 0x03, 0x01, 67, 0x01, 0x00, 0x03, 0x00, 0x00, 0x12, 0x34];
    buf.extend_from_slice(b"FPrint-22");
    buf.into()
}

/// Generic answer carrying `error_code`
pub(crate) fn failure(error_code: u8) -> Bytes {
    Bytes::copy_from_slice(&[0x55, error_code, 0x00])
}
