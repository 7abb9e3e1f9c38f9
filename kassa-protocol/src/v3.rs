//! Pipelined (v3) protocol engine
//!
//! Commands are wrapped into `Add` task envelopes and written immediately;
//! answers arrive asynchronously and are matched to their task by a single
//! background worker that owns the inbound stream.
//!
//! # Receive path
//!
//! ```text
//! chunk ─► PacketReader ─► Packet::decode ─┬─ bad frame      ─► empty frame with the same packet id
//!                                          ├─ empty payload  ─► retransmit from history (once)
//!                                          └─ status + data  ─► complete task, ACK final statuses
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kassa_core::{
    command::{self, TaskFlags},
    constants::ASYNC_PACKET_ID,
    IdSequence, Packet, PacketReader, Status,
};
use kassa_transport::{InboundStream, Transport};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::{
    completion::{Completion, Resolver},
    error::{Error, Result},
    Protocol, ProtocolVersion,
};

/// Default age after which unanswered frames leave the history
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(60);

/// Pipelined protocol engine
///
/// # Examples
///
/// ```no_run
/// use bytes::Bytes;
/// use kassa_protocol::{Protocol, ProtocolV3};
/// use kassa_transport::TcpTransport;
///
/// # async fn run() -> kassa_protocol::Result<()> {
/// let protocol = ProtocolV3::new(TcpTransport::with_default_port("192.168.1.10"));
/// protocol.start().await?;
///
/// // Password 0000, device state request
/// let answer = protocol.send(Bytes::from_static(&[0x00, 0x00, 0x3F])).await?.await?;
/// println!("{:02X?}", answer);
///
/// protocol.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct ProtocolV3 {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    history_ttl: Duration,
}

/// State shared between senders and the receive worker
struct Shared {
    transport: tokio::sync::Mutex<Box<dyn Transport>>,
    packet_ids: IdSequence,
    task_ids: IdSequence,
    /// Encoded frames by packet id, for device-requested retransmission
    history: Mutex<HashMap<u8, SentFrame>>,
    /// Waiters by task id
    pending: Mutex<HashMap<u8, Resolver>>,
    /// Task carried by each sent `Add` packet; synchronous statuses carry no
    /// task id of their own. Entries outlive completion so repeated results
    /// are still acknowledged, and go away when either id is reused.
    tasks_by_packet: Mutex<HashMap<u8, u8>>,
}

struct SentFrame {
    raw: Bytes,
    sent_at: Instant,
}

impl ProtocolV3 {
    /// Create an engine over `transport`
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport: tokio::sync::Mutex::new(Box::new(transport)),
                packet_ids: IdSequence::new(),
                task_ids: IdSequence::new(),
                history: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                tasks_by_packet: Mutex::new(HashMap::new()),
            }),
            worker: Mutex::new(None),
            history_ttl: DEFAULT_HISTORY_TTL,
        }
    }

    /// Set the age after which frames nobody asked to retransmit are dropped
    pub fn with_history_ttl(mut self, ttl: Duration) -> Self {
        self.history_ttl = ttl;
        self
    }

    /// Number of commands still waiting for their result
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Number of frames held for retransmission
    pub fn history_len(&self) -> usize {
        self.shared.history.lock().len()
    }

    /// Check if the receive worker is running
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }
}

#[async_trait]
impl Protocol for ProtocolV3 {
    async fn start(&self) -> Result<()> {
        if self.worker.lock().is_some() {
            return Err(Error::AlreadyStarted);
        }

        let (inbound, addr) = {
            let mut transport = self.shared.transport.lock().await;
            transport.connect().await?;
            (transport.subscribe()?, transport.remote_addr())
        };

        let worker = tokio::spawn(receive_loop(Arc::clone(&self.shared), inbound));
        *self.worker.lock() = Some(worker);

        info!("Protocol v3 started on {}", addr);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.abort();
        }

        self.shared.cancel_all();
        self.shared.transport.lock().await.disconnect().await?;

        info!("Protocol v3 stopped");
        Ok(())
    }

    async fn send(&self, message: Bytes) -> Result<Completion> {
        let task_id = self.shared.task_ids.next_id();
        let packet_id = self.shared.packet_ids.next_id();
        let frame = Packet::new(packet_id, command::add_task(task_id, TaskFlags::NEED_RESULT, &message))
            .try_encode()?
            .freeze();

        self.shared.purge_history(self.history_ttl);

        let (completion, resolver) = Completion::pending(task_id);
        let replaced = self.shared.pending.lock().insert(task_id, resolver);
        if replaced.is_some() {
            warn!("Task id {} reused while still pending, cancelling the old waiter", task_id);
        }
        self.shared.remember(packet_id, frame.clone());
        {
            let mut tasks = self.shared.tasks_by_packet.lock();
            tasks.retain(|_, task| *task != task_id);
            tasks.insert(packet_id, task_id);
        }

        debug!("Sending task {} in packet {}", task_id, packet_id);
        if let Err(e) = self.shared.write(&frame).await {
            self.shared.forget_task(task_id);
            return Err(e);
        }

        Ok(completion)
    }

    async fn abort(&self) -> Result<()> {
        let packet_id = self.shared.packet_ids.next_id();
        let frame = Packet::new(packet_id, command::abort()).encode().freeze();
        self.shared.remember(packet_id, frame.clone());

        debug!("Aborting device task queue (packet {})", packet_id);
        self.shared.write(&frame).await
    }

    fn supports_abort(&self) -> bool {
        true
    }

    fn cancel(&self, task_id: u8) -> bool {
        let cancelled = self.shared.forget_task(task_id);
        if cancelled {
            debug!("Cancelled pending task {}", task_id);
        }
        cancelled
    }

    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V3
    }
}

impl Drop for ProtocolV3 {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.abort();
        }
    }
}

/// Single consumer of the inbound stream
async fn receive_loop(shared: Arc<Shared>, mut inbound: InboundStream) {
    let mut reader = PacketReader::new();

    while let Some(chunk) = inbound.recv().await {
        reader.push(&chunk);
        while let Some(raw) = reader.next_frame() {
            if let Err(e) = shared.process_frame(&raw).await {
                warn!("Failed to answer packet: {}", e);
            }
        }
    }

    debug!("Inbound stream closed, cancelling pending tasks");
    shared.cancel_all();
}

impl Shared {
    async fn write(&self, frame: &[u8]) -> Result<()> {
        self.transport.lock().await.write(frame).await?;
        Ok(())
    }

    fn remember(&self, packet_id: u8, raw: Bytes) {
        self.tasks_by_packet.lock().remove(&packet_id);
        self.history.lock().insert(
            packet_id,
            SentFrame {
                raw,
                sent_at: Instant::now(),
            },
        );
    }

    fn purge_history(&self, ttl: Duration) {
        let mut history = self.history.lock();
        let before = history.len();
        history.retain(|_, frame| frame.sent_at.elapsed() < ttl);
        if history.len() < before {
            debug!("Purged {} stale frames from history", before - history.len());
        }
    }

    /// Drop the waiter of `task_id`
    fn forget_task(&self, task_id: u8) -> bool {
        self.pending.lock().remove(&task_id).is_some()
    }

    fn cancel_all(&self) {
        let cancelled = self.pending.lock().drain().count();
        if cancelled > 0 {
            debug!("Cancelled {} pending tasks", cancelled);
        }
        self.tasks_by_packet.lock().clear();
        self.history.lock().clear();
    }

    async fn process_frame(&self, raw: &[u8]) -> Result<()> {
        let packet = match Packet::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                let Some(packet_id) = Packet::peek_id(raw) else {
                    return Ok(());
                };
                debug!("Bad packet {} ({}), asking for retransmission", packet_id, e);
                return self.write(&Packet::empty(packet_id).encode()).await;
            }
        };

        trace!("Received {:?}", packet);

        if packet.is_empty() {
            return self.retransmit(packet.id).await;
        }

        let Ok(status) = Status::try_from(packet.payload[0]) else {
            warn!(
                "Dropping packet {} with unknown status 0x{:02X}",
                packet.id, packet.payload[0]
            );
            return Ok(());
        };

        let (task_id, data) = if status.is_async() {
            let Some(&task_id) = packet.payload.get(1) else {
                warn!("Dropping {} without task id", status);
                return Ok(());
            };
            (Some(task_id), packet.payload.slice(2..))
        } else {
            let task_id = self.tasks_by_packet.lock().get(&packet.id).copied();
            (task_id, packet.payload.slice(1..))
        };
        let status = status.synchronous();

        let Some(task_id) = task_id else {
            debug!("{} for packet {} answers no task", status, packet.id);
            return Ok(());
        };

        if !status.is_terminal() {
            debug!("Task {} is {}", task_id, status);
            return Ok(());
        }

        self.complete(task_id, status, data);

        if status.is_final() && packet.id != ASYNC_PACKET_ID {
            self.acknowledge(task_id).await?;
        }
        Ok(())
    }

    /// Resolve the waiter of `task_id`; later statuses for it are dropped
    fn complete(&self, task_id: u8, status: Status, data: Bytes) {
        let resolver = self.pending.lock().remove(&task_id);

        let Some(resolver) = resolver else {
            warn!("Dropping {} for unknown task {}: {}", status, task_id, hex::encode(&data));
            return;
        };

        debug!("Task {} finished with {}", task_id, status);
        let answer = if status.is_reject() { Err(status) } else { Ok(data) };
        if resolver.send(answer).is_err() {
            debug!("Waiter of task {} is gone", task_id);
        }
    }

    async fn acknowledge(&self, task_id: u8) -> Result<()> {
        let packet_id = self.packet_ids.next_id();
        let frame = Packet::new(packet_id, command::ack(task_id)).encode().freeze();
        self.remember(packet_id, frame.clone());

        trace!("Acknowledging task {} in packet {}", task_id, packet_id);
        self.write(&frame).await
    }

    async fn retransmit(&self, packet_id: u8) -> Result<()> {
        // Single shot: a second request for the same id finds nothing
        let frame = self.history.lock().remove(&packet_id);
        match frame {
            Some(frame) => {
                debug!("Device requested packet {} again", packet_id);
                self.write(&frame.raw).await
            }
            None => {
                warn!("Device requested unknown packet {}", packet_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kassa_core::constants::v3::STX;
    use kassa_transport::{ChannelPeer, ChannelTransport};
    use pretty_assertions::assert_eq;

    async fn started() -> (ProtocolV3, ChannelPeer) {
        let (transport, peer) = ChannelTransport::pair();
        let protocol = ProtocolV3::new(transport);
        protocol.start().await.unwrap();
        (protocol, peer)
    }

    async fn next_packet(peer: &mut ChannelPeer) -> Packet {
        let raw = peer.received().await.unwrap();
        Packet::decode(&raw).unwrap()
    }

    fn deliver(peer: &ChannelPeer, id: u8, payload: &[u8]) {
        peer.deliver(Packet::new(id, payload.to_vec()).encode().freeze())
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_wraps_add_task() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x00, 0x00, 0x3F])).await.unwrap();
        assert_eq!(completion.task_id(), Some(1));

        let packet = next_packet(&mut peer).await;
        assert_eq!(packet.id, 1);
        assert_eq!(packet.payload.as_ref(), &[0xC1, 0x01, 0x01, 0x00, 0x00, 0x3F]);
        assert_eq!(protocol.pending_count(), 1);
        assert_eq!(protocol.history_len(), 1);
    }

    #[tokio::test]
    async fn test_synchronous_result_completes_and_acks() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        let request = next_packet(&mut peer).await;

        deliver(&peer, request.id, &[0xA1]);
        deliver(&peer, request.id, &[0xA3, 0x55, 0x00, 0x00]);

        assert_eq!(completion.await.unwrap().as_ref(), &[0x55, 0x00, 0x00]);

        let ack = next_packet(&mut peer).await;
        assert_eq!(ack.payload.as_ref(), &[0xC2, 0x01]);
        assert_eq!(protocol.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_async_result_by_task_id() {
        let (protocol, mut peer) = started().await;

        let first = protocol.send(Bytes::from_static(&[0x01])).await.unwrap();
        let second = protocol.send(Bytes::from_static(&[0x02])).await.unwrap();
        next_packet(&mut peer).await;
        next_packet(&mut peer).await;

        // Answers arrive out of order on a device-chosen packet id
        deliver(&peer, 0x30, &[0xA6, 0x02, 0x55, 0x02]);
        deliver(&peer, 0x31, &[0xA7, 0x01, 0x55, 0x7E]);

        assert_eq!(second.await.unwrap().as_ref(), &[0x55, 0x02]);
        assert_eq!(first.await.unwrap().as_ref(), &[0x55, 0x7E]);

        assert_eq!(next_packet(&mut peer).await.payload.as_ref(), &[0xC2, 0x02]);
        assert_eq!(next_packet(&mut peer).await.payload.as_ref(), &[0xC2, 0x01]);
    }

    #[tokio::test]
    async fn test_out_of_band_result_is_not_acked() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        next_packet(&mut peer).await;

        deliver(&peer, ASYNC_PACKET_ID, &[0xA6, 0x01, 0x55, 0x00, 0x00]);

        assert_eq!(completion.await.unwrap().as_ref(), &[0x55, 0x00, 0x00]);

        tokio::task::yield_now().await;
        assert!(peer.try_received().is_none());
    }

    #[tokio::test]
    async fn test_completes_at_most_once() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        next_packet(&mut peer).await;

        deliver(&peer, 0x40, &[0xA6, 0x01, 0x55, 0x00]);
        deliver(&peer, 0x41, &[0xA7, 0x01, 0x55, 0x99]);

        assert_eq!(completion.await.unwrap().as_ref(), &[0x55, 0x00]);
        assert_eq!(next_packet(&mut peer).await.payload.as_ref(), &[0xC2, 0x01]);
        // The duplicate is still acknowledged so the device releases it
        assert_eq!(next_packet(&mut peer).await.payload.as_ref(), &[0xC2, 0x01]);
        assert_eq!(protocol.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_synchronous_result_is_acked() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        let request = next_packet(&mut peer).await;

        deliver(&peer, request.id, &[0xA3, 0x55, 0x00, 0x00]);
        assert_eq!(completion.await.unwrap().as_ref(), &[0x55, 0x00, 0x00]);
        assert_eq!(next_packet(&mut peer).await.payload.as_ref(), &[0xC2, 0x01]);

        // Device missed the first ack and repeats the result
        deliver(&peer, request.id, &[0xA3, 0x55, 0x00, 0x00]);
        assert_eq!(next_packet(&mut peer).await.payload.as_ref(), &[0xC2, 0x01]);
        assert_eq!(protocol.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_late_result_of_cancelled_task_is_acked() {
        let (protocol, mut peer) = started().await;

        let _completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        let request = next_packet(&mut peer).await;
        assert!(protocol.cancel(1));

        deliver(&peer, request.id, &[0xA4, 0x55, 0x7E, 0x00]);
        assert_eq!(next_packet(&mut peer).await.payload.as_ref(), &[0xC2, 0x01]);
    }

    #[tokio::test]
    async fn test_retransmit_honoured_once() {
        let (protocol, mut peer) = started().await;

        let _completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        let original = peer.received().await.unwrap();
        let packet_id = Packet::peek_id(&original).unwrap();

        peer.deliver(Packet::empty(packet_id).encode().freeze()).unwrap();
        assert_eq!(peer.received().await.unwrap(), original);
        assert_eq!(protocol.history_len(), 0);

        // Second request finds nothing to resend
        peer.deliver(Packet::empty(packet_id).encode().freeze()).unwrap();
        tokio::task::yield_now().await;
        assert!(peer.try_received().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_frame_is_rejected() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        next_packet(&mut peer).await;

        let mut corrupted = Packet::new(1, vec![0xA3, 0x55, 0x00, 0x00]).encode();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0x01;
        peer.deliver(corrupted.freeze()).unwrap();

        let nak = next_packet(&mut peer).await;
        assert_eq!(nak.id, 1);
        assert!(nak.is_empty());
        assert_eq!(protocol.pending_count(), 1);

        // The device resends the answer intact
        deliver(&peer, 1, &[0xA3, 0x55, 0x00, 0x00]);
        assert_eq!(completion.await.unwrap().as_ref(), &[0x55, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_split_delivery() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        next_packet(&mut peer).await;

        let answer = Packet::new(1, vec![0xA3, 0xFE, 0xFD, 0x00]).encode();
        for b in answer.iter() {
            peer.deliver(vec![*b]).unwrap();
        }

        assert_eq!(completion.await.unwrap().as_ref(), &[0xFE, 0xFD, 0x00]);
    }

    #[tokio::test]
    async fn test_reject_status() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        next_packet(&mut peer).await;

        deliver(&peer, 1, &[0xB1]);

        assert!(matches!(
            completion.await,
            Err(Error::TaskRejected(Status::Overflow))
        ));
        // Rejects carry no result to acknowledge
        tokio::task::yield_now().await;
        assert!(peer.try_received().is_none());
    }

    #[tokio::test]
    async fn test_unmatched_result_is_dropped() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        next_packet(&mut peer).await;

        deliver(&peer, 0x50, &[0xA6, 0x99, 0x55, 0x00]);
        deliver(&peer, 0x51, &[0xA6, 0x01, 0x55, 0x00]);

        assert_eq!(completion.await.unwrap().as_ref(), &[0x55, 0x00]);
    }

    #[tokio::test]
    async fn test_abort_frame() {
        let (protocol, mut peer) = started().await;
        assert!(protocol.supports_abort());

        protocol.abort().await.unwrap();

        let raw = peer.received().await.unwrap();
        assert_eq!(raw.as_ref(), &[STX, 1, 0, 1, 0xC4, 0xF6]);
        assert_eq!(protocol.history_len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_evicts_waiter() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        next_packet(&mut peer).await;

        assert!(protocol.cancel(1));
        assert!(!protocol.cancel(1));
        assert!(matches!(completion.await, Err(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_expires() {
        let (transport, mut peer) = ChannelTransport::pair();
        let protocol = ProtocolV3::new(transport).with_history_ttl(Duration::from_secs(1));
        protocol.start().await.unwrap();

        protocol.send(Bytes::from_static(&[0x01])).await.unwrap();
        next_packet(&mut peer).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        protocol.send(Bytes::from_static(&[0x02])).await.unwrap();

        assert_eq!(protocol.history_len(), 1);
    }

    #[tokio::test]
    async fn test_packet_ids_wrap() {
        let (protocol, mut peer) = started().await;

        let mut ids = Vec::new();
        for _ in 0..225 {
            protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
            ids.push(next_packet(&mut peer).await.id);
        }

        assert_eq!(ids[0], 1);
        assert_eq!(ids[222], 0xDF);
        assert_eq!(ids[223], 0);
        assert_eq!(ids[224], 1);
    }

    #[tokio::test]
    async fn test_stop_cancels_pending() {
        let (protocol, mut peer) = started().await;

        let completion = protocol.send(Bytes::from_static(&[0x3F])).await.unwrap();
        next_packet(&mut peer).await;

        protocol.stop().await.unwrap();
        assert!(matches!(completion.await, Err(Error::Cancelled)));
        assert!(!protocol.is_running());
    }

    #[tokio::test]
    async fn test_double_start() {
        let (protocol, _peer) = started().await;
        assert!(matches!(protocol.start().await, Err(Error::AlreadyStarted)));
    }
}
