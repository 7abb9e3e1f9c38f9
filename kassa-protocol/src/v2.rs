//! Legacy half-duplex (v2) protocol engine
//!
//! Every command is one lock-step exchange:
//!
//! ```text
//! host                                  device
//!  ENQ ───────────────────────────────►          handshake  (T1, 5 attempts)
//!      ◄─────────────────────────────── ACK
//!  STX data ETX CRC ──────────────────►          transfer   (T4, 10 attempts)
//!      ◄─────────────────────────────── ACK
//!  EOT ───────────────────────────────►
//!      ◄─────────────────────────────── ENQ      turnaround (T5 by opcode, 5 attempts)
//!  ACK ───────────────────────────────►
//!      ◄─────────────────────────────── STX data ETX CRC   receive (T2/T6, 10 attempts)
//!  ACK ───────────────────────────────►
//!      ◄─────────────────────────────── EOT
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use kassa_core::{
    auth::PASSWORD_LEN,
    constants::v2::{
        ACK, ENQ, EOT, HANDSHAKE_ATTEMPTS, NAK, RECEIVE_ATTEMPTS, STX, TRANSFER_ATTEMPTS,
        TURNAROUND_ATTEMPTS,
    },
    frame,
};
use kassa_transport::{Error as TransportError, Transport};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::{
    completion::Completion,
    error::{Error, Result},
    timeout::Timeouts,
    Protocol, ProtocolVersion,
};

/// Half-duplex protocol engine
///
/// `send` performs the whole exchange before returning, so the returned
/// [`Completion`] is already resolved. Exchanges are serialised by the
/// engine's transport lock.
pub struct ProtocolV2 {
    transport: Mutex<Box<dyn Transport>>,
    timeouts: Timeouts,
    opcode_offset: usize,
}

impl ProtocolV2 {
    /// Create an engine over `transport`
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Mutex::new(Box::new(transport)),
            timeouts: Timeouts::default(),
            opcode_offset: PASSWORD_LEN,
        }
    }

    /// Replace the timing table
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Position of the command opcode inside sent payloads
    ///
    /// Defaults to the access password length; the opcode selects the
    /// response timeout.
    pub fn with_opcode_offset(mut self, offset: usize) -> Self {
        self.opcode_offset = offset;
        self
    }

    async fn handshake(&self, transport: &mut dyn Transport) -> Result<()> {
        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            transport.write(&[ENQ]).await?;
            match read_byte(transport, self.timeouts.t1).await? {
                Some(ACK) => return Ok(()),
                Some(ENQ) => {
                    debug!("Line contention on attempt {}, backing off", attempt);
                    sleep(self.timeouts.t7).await;
                }
                Some(other) => {
                    debug!("Unexpected answer 0x{:02X} to ENQ on attempt {}", other, attempt);
                    sleep(self.timeouts.t3).await;
                }
                None => debug!("No answer to ENQ on attempt {}", attempt),
            }
        }

        transport.write(&[EOT]).await?;
        Err(Error::DeviceNotReady)
    }

    async fn transfer(&self, transport: &mut dyn Transport, framed: &[u8]) -> Result<()> {
        for attempt in 1..=TRANSFER_ATTEMPTS {
            transport.write(framed).await?;
            match read_byte(transport, self.timeouts.t4).await? {
                Some(ACK) => return Ok(()),
                answer => debug!("Frame not acknowledged on attempt {}: {:02X?}", attempt, answer),
            }
        }
        Err(Error::NotAcknowledged)
    }

    /// Hand the line over and wait for the device to claim it
    ///
    /// Returns `false` when the device stays silent: the command has no
    /// answer.
    async fn turnaround(&self, transport: &mut dyn Transport, response_timeout: Duration) -> Result<bool> {
        transport.write(&[EOT]).await?;

        for attempt in 1..=TURNAROUND_ATTEMPTS {
            match read_byte(transport, response_timeout).await? {
                Some(ENQ) => return Ok(true),
                Some(other) => {
                    debug!("Expected ENQ, got 0x{:02X} on attempt {}", other, attempt);
                    transport.write(&[NAK]).await?;
                }
                None => return Ok(false),
            }
        }
        Err(Error::NoValidResponse(TURNAROUND_ATTEMPTS))
    }

    async fn receive(&self, transport: &mut dyn Transport) -> Result<Bytes> {
        transport.write(&[ACK]).await?;

        for attempt in 1..=RECEIVE_ATTEMPTS {
            match self.read_frame(transport).await? {
                Some(raw) if frame::check(&raw) => {
                    transport.write(&[ACK]).await?;
                    self.finish(transport).await?;
                    return Ok(frame::unwrap(&raw)?);
                }
                Some(raw) => debug!("Bad checksum on attempt {}: {}", attempt, hex::encode(&raw)),
                None => debug!("Incomplete frame on attempt {}", attempt),
            }
            transport.write(&[NAK]).await?;
        }
        Err(Error::NoValidResponse(RECEIVE_ATTEMPTS))
    }

    /// Accumulate one frame; `None` when the device stops sending midway
    async fn read_frame(&self, transport: &mut dyn Transport) -> Result<Option<Bytes>> {
        let mut buf = BytesMut::new();

        loop {
            let timeout = if buf.is_empty() { self.timeouts.t2 } else { self.timeouts.t6 };
            let Some(b) = read_byte(transport, timeout).await? else {
                return Ok(None);
            };
            if buf.is_empty() && b != STX {
                trace!("Skipping 0x{:02X} before frame start", b);
                continue;
            }
            buf.extend_from_slice(&[b]);

            if let Some(end) = frame::frame_end(&buf) {
                buf.truncate(end);
                trace!("Received frame: {}", hex::encode(&buf));
                return Ok(Some(buf.freeze()));
            }
        }
    }

    async fn finish(&self, transport: &mut dyn Transport) -> Result<()> {
        match read_byte(transport, self.timeouts.t8).await? {
            Some(EOT) => {}
            other => warn!("Unexpected end of transmission: {:02X?}", other),
        }
        Ok(())
    }
}

/// Read one byte; `None` on timeout
async fn read_byte(transport: &mut dyn Transport, timeout: Duration) -> Result<Option<u8>> {
    match transport.read_exact(1, Some(timeout)).await {
        Ok(b) => Ok(b.first().copied()),
        Err(TransportError::ReadTimeout) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Protocol for ProtocolV2 {
    async fn start(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        transport.connect().await?;
        info!("Protocol v2 started on {}", transport.remote_addr());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.transport.lock().await.disconnect().await?;
        info!("Protocol v2 stopped");
        Ok(())
    }

    async fn send(&self, message: Bytes) -> Result<Completion> {
        let mut guard = self.transport.lock().await;
        let transport: &mut dyn Transport = &mut **guard;
        if !transport.is_connected() {
            return Err(Error::NotStarted);
        }

        let response_timeout = match message.get(self.opcode_offset) {
            Some(&opcode) => self.timeouts.t5(opcode),
            None => self.timeouts.t5,
        };

        self.handshake(transport).await?;
        self.transfer(transport, &frame::wrap(&message)).await?;

        if !self.turnaround(transport, response_timeout).await? {
            debug!("No answer within {:?}", response_timeout);
            return Ok(Completion::ready(Bytes::new()));
        }

        let response = self.receive(transport).await?;
        Ok(Completion::ready(response))
    }

    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kassa_core::constants::v2::{DLE, ETX};
    use kassa_transport::{ChannelPeer, ChannelTransport};
    use pretty_assertions::assert_eq;

    const REQUEST: [u8; 3] = [0x00, 0x00, 0x3F];
    const ANSWER: [u8; 4] = [0x44, 0x10, 0x03, 0x00];

    async fn started() -> (ProtocolV2, ChannelPeer) {
        let (transport, peer) = ChannelTransport::pair();
        let protocol = ProtocolV2::new(transport);
        protocol.start().await.unwrap();
        (protocol, peer)
    }

    async fn expect(peer: &mut ChannelPeer, bytes: &[u8]) {
        assert_eq!(peer.received().await.unwrap().as_ref(), bytes);
    }

    /// Device side of a successful exchange
    async fn device(mut peer: ChannelPeer, answer: Bytes) -> ChannelPeer {
        expect(&mut peer, &[ENQ]).await;
        peer.deliver(vec![ACK]).unwrap();
        expect(&mut peer, &frame::wrap(&REQUEST)).await;
        peer.deliver(vec![ACK]).unwrap();
        expect(&mut peer, &[EOT]).await;
        peer.deliver(vec![ENQ]).unwrap();
        expect(&mut peer, &[ACK]).await;
        peer.deliver(answer).unwrap();
        expect(&mut peer, &[ACK]).await;
        peer.deliver(vec![EOT]).unwrap();
        peer
    }

    #[tokio::test]
    async fn test_full_exchange() {
        let (protocol, peer) = started().await;
        let device = tokio::spawn(device(peer, frame::wrap(&ANSWER)));

        let answer = protocol.send(Bytes::from_static(&REQUEST)).await.unwrap();
        assert_eq!(answer.task_id(), None);
        assert_eq!(answer.await.unwrap().as_ref(), &ANSWER);

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_escaped_answer() {
        let framed = frame::wrap(&ANSWER);
        assert!(framed.windows(2).any(|w| w == [DLE, ETX]));

        // Frame split across chunks, with line noise in front
        let (protocol, mut peer) = started().await;
        let device = tokio::spawn(async move {
            expect(&mut peer, &[ENQ]).await;
            peer.deliver(vec![ACK]).unwrap();
            peer.received().await.unwrap();
            peer.deliver(vec![ACK]).unwrap();
            expect(&mut peer, &[EOT]).await;
            peer.deliver(vec![ENQ]).unwrap();
            expect(&mut peer, &[ACK]).await;
            peer.deliver(vec![0xFF]).unwrap();
            peer.deliver(framed.slice(..4)).unwrap();
            peer.deliver(framed.slice(4..)).unwrap();
            expect(&mut peer, &[ACK]).await;
            peer.deliver(vec![EOT]).unwrap();
        });

        let answer = protocol.send(Bytes::from_static(&REQUEST)).await.unwrap();
        assert_eq!(answer.await.unwrap().as_ref(), &ANSWER);
        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_checksum_is_naked() {
        let (protocol, mut peer) = started().await;
        let device = tokio::spawn(async move {
            expect(&mut peer, &[ENQ]).await;
            peer.deliver(vec![ACK]).unwrap();
            peer.received().await.unwrap();
            peer.deliver(vec![ACK]).unwrap();
            expect(&mut peer, &[EOT]).await;
            peer.deliver(vec![ENQ]).unwrap();
            expect(&mut peer, &[ACK]).await;

            let mut corrupted = frame::wrap(&ANSWER).to_vec();
            let last = corrupted.len() - 1;
            corrupted[last] ^= 0x40;
            peer.deliver(corrupted).unwrap();
            expect(&mut peer, &[NAK]).await;

            peer.deliver(frame::wrap(&ANSWER)).unwrap();
            expect(&mut peer, &[ACK]).await;
            peer.deliver(vec![EOT]).unwrap();
        });

        let answer = protocol.send(Bytes::from_static(&REQUEST)).await.unwrap();
        assert_eq!(answer.await.unwrap().as_ref(), &ANSWER);
        device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_exhausted() {
        let (protocol, mut peer) = started().await;

        let result = protocol.send(Bytes::from_static(&REQUEST)).await;
        assert!(matches!(result, Err(Error::DeviceNotReady)));

        for _ in 0..HANDSHAKE_ATTEMPTS {
            expect(&mut peer, &[ENQ]).await;
        }
        expect(&mut peer, &[EOT]).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_contention_backs_off() {
        let (protocol, mut peer) = started().await;
        peer.deliver(vec![ENQ]).unwrap();

        let device = tokio::spawn(async move {
            expect(&mut peer, &[ENQ]).await;
            expect(&mut peer, &[ENQ]).await;
            peer.deliver(vec![ACK]).unwrap();
            peer.received().await.unwrap();
            peer.deliver(vec![ACK]).unwrap();
            expect(&mut peer, &[EOT]).await;
            peer
        });

        // Device stays silent after the transfer
        let answer = protocol.send(Bytes::from_static(&REQUEST)).await.unwrap();
        assert!(answer.await.unwrap().is_empty());
        device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_not_acknowledged() {
        let (protocol, mut peer) = started().await;
        let device = tokio::spawn(async move {
            expect(&mut peer, &[ENQ]).await;
            peer.deliver(vec![ACK]).unwrap();
            for _ in 0..TRANSFER_ATTEMPTS {
                peer.received().await.unwrap();
                peer.deliver(vec![NAK]).unwrap();
            }
            peer
        });

        let result = protocol.send(Bytes::from_static(&REQUEST)).await;
        assert!(matches!(result, Err(Error::NotAcknowledged)));
        device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_turnaround_timeout_is_empty_answer() {
        let (transport, mut peer) = ChannelTransport::pair();
        let protocol = ProtocolV2::new(transport)
            .with_timeouts(Timeouts::default().with_t5(0x3F, Duration::from_millis(200)));
        protocol.start().await.unwrap();

        let device = tokio::spawn(async move {
            expect(&mut peer, &[ENQ]).await;
            peer.deliver(vec![ACK]).unwrap();
            peer.received().await.unwrap();
            peer.deliver(vec![ACK]).unwrap();
            expect(&mut peer, &[EOT]).await;
            peer
        });

        let started_at = tokio::time::Instant::now();
        let answer = protocol.send(Bytes::from_static(&REQUEST)).await.unwrap();
        assert!(answer.await.unwrap().is_empty());
        assert!(started_at.elapsed() < Duration::from_secs(1));
        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_not_started() {
        let (transport, _peer) = ChannelTransport::pair();
        let protocol = ProtocolV2::new(transport);

        let result = protocol.send(Bytes::from_static(&REQUEST)).await;
        assert!(matches!(result, Err(Error::NotStarted)));
    }

    #[tokio::test]
    async fn test_abort_is_noop() {
        let (protocol, mut peer) = started().await;
        assert!(!protocol.supports_abort());
        assert!(!protocol.cancel(1));

        protocol.abort().await.unwrap();
        assert!(peer.try_received().is_none());
    }
}
