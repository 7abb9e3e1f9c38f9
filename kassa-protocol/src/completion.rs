//! Completion handles for sent commands

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use kassa_core::Status;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Resolving side of a [`Completion`]
///
/// Carries the answer payload, or the reject status that ended the task.
pub(crate) type Resolver = oneshot::Sender<std::result::Result<Bytes, Status>>;

/// Answer to a sent command
///
/// A future resolving to the device's answer payload. Resolves at most once:
/// - `Ok(payload)` when the device finished the task
/// - [`Error::TaskRejected`] when the device refused or dropped it
/// - [`Error::Cancelled`] when the engine gave up on it (stop, eviction,
///   task id reuse)
#[derive(Debug)]
pub struct Completion {
    task_id: Option<u8>,
    state: State,
}

#[derive(Debug)]
enum State {
    Ready(Option<Bytes>),
    Pending(oneshot::Receiver<std::result::Result<Bytes, Status>>),
}

impl Completion {
    /// Already resolved completion
    pub fn ready(payload: Bytes) -> Self {
        Self {
            task_id: None,
            state: State::Ready(Some(payload)),
        }
    }

    pub(crate) fn pending(task_id: u8) -> (Self, Resolver) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            task_id: Some(task_id),
            state: State::Pending(rx),
        };
        (completion, tx)
    }

    /// Device task this completion waits for
    ///
    /// `None` for engines without a task queue.
    pub fn task_id(&self) -> Option<u8> {
        self.task_id
    }
}

impl Future for Completion {
    type Output = Result<Bytes>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            State::Ready(payload) => Poll::Ready(payload.take().ok_or(Error::Cancelled)),
            State::Pending(rx) => Pin::new(rx).poll(cx).map(|answer| match answer {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(status)) => Err(Error::TaskRejected(status)),
                Err(_) => Err(Error::Cancelled),
            }),
        }
    }
}
