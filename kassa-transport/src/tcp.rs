//! TCP transport

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use kassa_core::constants::DEFAULT_PORT;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, Inbound, InboundStream, Transport};

const READ_CHUNK: usize = 1024;

/// TCP transport for ATOL devices
///
/// A background task reads the socket and queues chunks, so writes never
/// wait on a pending read.
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    writer: Option<OwnedWriteHalf>,
    reader_task: Option<JoinHandle<()>>,
    inbound: Option<Inbound>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            writer: None,
            reader_task: None,
            inbound: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }

    /// Create TCP transport on the default device port (5555)
    pub fn with_default_port(addr: impl Into<String>) -> Self {
        Self::new(addr, DEFAULT_PORT)
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set read timeout for [`Transport::read`]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }

    fn inbound(&mut self) -> Result<&mut Inbound> {
        self.inbound.as_mut().ok_or(Error::NotConnected)
    }
}

/// Forward socket reads into the inbound channel until EOF or error
async fn pump(mut reader: OwnedReadHalf, tx: mpsc::UnboundedSender<Bytes>, peer: SocketAddr) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("Connection to {} closed by remote", peer);
                break;
            }
            Ok(n) => {
                trace!("Received {} bytes: {}", n, hex::encode(&buf[..n]));
                if tx.send(buf.split().freeze()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Read from {} failed: {}", peer, e);
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        self.reader_task = Some(tokio::spawn(pump(reader, tx, addr)));
        self.inbound = Some(Inbound::new(rx));
        self.writer = Some(writer);

        debug!("Connected to {}", addr);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = writer.shutdown().await;
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        self.inbound = None;
        self.socket_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));

        writer.write_all(data).await?;
        writer.flush().await?;

        Ok(())
    }

    async fn read(&mut self) -> Result<Bytes> {
        let read_timeout = self.read_timeout;
        self.inbound()?.read(Some(read_timeout)).await
    }

    async fn read_exact(&mut self, count: usize, timeout: Option<Duration>) -> Result<Bytes> {
        self.inbound()?.read_exact(count, timeout).await
    }

    fn subscribe(&mut self) -> Result<InboundStream> {
        self.inbound()?.subscribe()
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}
