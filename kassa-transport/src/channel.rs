//! In-memory transport
//!
//! [`ChannelTransport::pair`] returns the transport side handed to a
//! protocol engine plus a [`ChannelPeer`] playing the device: the peer sees
//! every `write` as one chunk and can deliver arbitrary chunks back.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{error::*, Inbound, InboundStream, Transport};

/// Transport backed by in-process channels
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    idle: Option<InboundStream>,
    inbound: Option<Inbound>,
}

/// Device side of a [`ChannelTransport`]
#[derive(Debug)]
pub struct ChannelPeer {
    written: mpsc::UnboundedReceiver<Bytes>,
    deliver: Option<mpsc::UnboundedSender<Bytes>>,
}

impl ChannelTransport {
    /// Create a connected-on-demand transport and its peer
    pub fn pair() -> (Self, ChannelPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let transport = Self {
            outbound: out_tx,
            idle: Some(in_rx),
            inbound: None,
        };
        let peer = ChannelPeer {
            written: out_rx,
            deliver: Some(in_tx),
        };
        (transport, peer)
    }

    fn inbound(&mut self) -> Result<&mut Inbound> {
        self.inbound.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        // The receiver is gone for good once a subscriber has dropped it
        let rx = self.idle.take().ok_or(Error::ConnectionClosed)?;
        self.inbound = Some(Inbound::new(rx));
        debug!("Channel transport connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(inbound) = self.inbound.take() {
            self.idle = inbound.into_stream();
            debug!("Channel transport disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inbound.is_some()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));
        self.outbound
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn read(&mut self) -> Result<Bytes> {
        self.inbound()?.read(None).await
    }

    async fn read_exact(&mut self, count: usize, timeout: Option<Duration>) -> Result<Bytes> {
        self.inbound()?.read_exact(count, timeout).await
    }

    fn subscribe(&mut self) -> Result<InboundStream> {
        self.inbound()?.subscribe()
    }

    fn remote_addr(&self) -> String {
        "channel".to_string()
    }
}

impl ChannelPeer {
    /// Next chunk written by the transport side
    ///
    /// `None` once the transport is dropped.
    pub async fn received(&mut self) -> Option<Bytes> {
        self.written.recv().await
    }

    /// Next written chunk if one is already queued
    pub fn try_received(&mut self) -> Option<Bytes> {
        self.written.try_recv().ok()
    }

    /// Deliver a chunk to the transport side
    pub fn deliver(&self, data: impl Into<Bytes>) -> Result<()> {
        self.deliver
            .as_ref()
            .ok_or(Error::ConnectionClosed)?
            .send(data.into())
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Close the device side of the stream
    pub fn close(&mut self) {
        self.deliver = None;
    }
}
