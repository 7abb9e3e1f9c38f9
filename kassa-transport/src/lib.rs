//! Transport layer for ATOL cash registers
//!
//! Provides byte-stream communication with devices over TCP, plus an
//! in-memory channel pair for driving protocol engines in tests.
//!
//! Inbound data is delivered in two styles:
//! - pull: [`Transport::read`] / [`Transport::read_exact`] for lock-step
//!   exchanges
//! - push: [`Transport::subscribe`] hands the raw chunk stream to a single
//!   consumer, e.g. a background receive worker

pub mod channel;
pub mod error;
pub mod tcp;

pub use channel::{ChannelPeer, ChannelTransport};
pub use error::{Error, Result};
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Stream of inbound chunks, in arrival order
pub type InboundStream = mpsc::UnboundedReceiver<Bytes>;

/// Transport trait for different communication methods
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send raw bytes
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Receive the next available chunk
    async fn read(&mut self) -> Result<Bytes>;

    /// Receive exactly `count` bytes
    ///
    /// Fails with [`Error::ReadTimeout`] when `timeout` elapses first; bytes
    /// received so far stay buffered for the next read.
    async fn read_exact(&mut self, count: usize, timeout: Option<Duration>) -> Result<Bytes>;

    /// Take the push-style inbound stream
    ///
    /// Can be called once per connection. Afterwards pull reads fail with
    /// [`Error::Subscribed`].
    fn subscribe(&mut self) -> Result<InboundStream>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}

/// Inbound side of a connection shared by the transports
#[derive(Debug)]
pub(crate) struct Inbound {
    rx: Option<InboundStream>,
    pending: BytesMut,
}

impl Inbound {
    pub(crate) fn new(rx: InboundStream) -> Self {
        Self {
            rx: Some(rx),
            pending: BytesMut::new(),
        }
    }

    pub(crate) fn subscribe(&mut self) -> Result<InboundStream> {
        let rx = self.rx.take().ok_or(Error::AlreadySubscribed)?;
        if !self.pending.is_empty() {
            debug!("Dropping {} unread bytes on subscribe", self.pending.len());
            self.pending.clear();
        }
        Ok(rx)
    }

    /// Give the receiver back when the connection is torn down
    pub(crate) fn into_stream(self) -> Option<InboundStream> {
        self.rx
    }

    pub(crate) async fn read(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        if !self.pending.is_empty() {
            return Ok(self.pending.split().freeze());
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        self.recv(deadline).await
    }

    pub(crate) async fn read_exact(&mut self, count: usize, timeout: Option<Duration>) -> Result<Bytes> {
        let deadline = timeout.map(|t| Instant::now() + t);
        while self.pending.len() < count {
            let chunk = self.recv(deadline).await?;
            self.pending.extend_from_slice(&chunk);
        }
        Ok(self.pending.split_to(count).freeze())
    }

    async fn recv(&mut self, deadline: Option<Instant>) -> Result<Bytes> {
        let rx = self.rx.as_mut().ok_or(Error::Subscribed)?;
        let chunk = match deadline {
            Some(deadline) => timeout_at(deadline, rx.recv())
                .await
                .map_err(|_| Error::ReadTimeout)?,
            None => rx.recv().await,
        };
        chunk.ok_or(Error::ConnectionClosed)
    }
}
