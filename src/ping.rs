//! Ping factory: issues pings, matches replies, expires stale entries.
//!
//! Each outstanding ping owns a 32-bit id (client-issued ids are odd and
//! monotonic), its delegate and an issue timestamp. Expiry is evaluated on
//! the reactor heartbeat rather than per-timer tasks, which bounds worst-case
//! timeout detection to `expiry + heartbeat_interval`.
//!
//! Gateway-initiated pings carry even ids and are echoed back unchanged.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::intf::{ControlFrameConsumer, FrameProvider, PingDelegate};
use crate::protocol::codec::{frame_type, version};
use crate::protocol::{ControlHeader, Frame, FramePool};

/// An outstanding ping awaiting its reply.
struct PendingPing {
    delegate: Box<dyn PingDelegate>,
    issued_at: Instant,
}

impl PendingPing {
    fn is_expired(&self, now: Instant, expiry: Duration) -> bool {
        now.duration_since(self.issued_at) > expiry
    }
}

/// Issues pings with unique ids and routes replies back to their delegates.
pub struct PingFactory {
    pending: HashMap<u32, PendingPing>,
    /// Ping ids (fresh or echoed) waiting for the next provider poll.
    out_queue: VecDeque<u32>,
    next_ping_id: u32,
    expiry: Duration,
}

impl PingFactory {
    /// Create a factory expiring unanswered pings after `expiry`.
    pub fn new(expiry: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            out_queue: VecDeque::new(),
            next_ping_id: 1,
            expiry,
        }
    }

    /// Issue a new ping: allocate an id, record the pending entry and queue
    /// the outgoing PING frame. Returns the allocated id; the pong arrives
    /// later through the delegate.
    pub fn ping(&mut self, delegate: Box<dyn PingDelegate>, now: Instant) -> u32 {
        // Odd ids, monotonic; on 32-bit wrap, skip ids still pending.
        let mut id = self.next_ping_id;
        while self.pending.contains_key(&id) {
            id = id.wrapping_add(2);
        }
        self.next_ping_id = id.wrapping_add(2) | 1;

        self.pending.insert(
            id,
            PendingPing {
                delegate,
                issued_at: now,
            },
        );
        self.out_queue.push_back(id);
        tracing::debug!(ping_id = id, "ping issued");
        id
    }

    /// Frames queued and not yet emitted; the reactor keeps one one-shot
    /// provider slot registered per queued id.
    pub fn queued_count(&self) -> usize {
        self.out_queue.len()
    }

    /// Pending pings awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Expire pending pings older than the expiry threshold, firing the
    /// optional cancellation callback once per retired id.
    pub fn heart_beat(&mut self, now: Instant) {
        let expiry = self.expiry;
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| p.is_expired(now, expiry))
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(mut ping) = self.pending.remove(&id) {
                tracing::warn!(ping_id = id, "ping expired");
                ping.delegate.ping_canceled(id);
            }
        }
    }

    /// Drop all pending state without callbacks. Used on connection reset;
    /// in-flight ids are no longer meaningful.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.out_queue.clear();
    }
}

impl FrameProvider for PingFactory {
    fn build_frame(&mut self, pool: &mut FramePool) -> Result<Option<Frame>> {
        let Some(id) = self.out_queue.pop_front() else {
            return Ok(None);
        };
        let mut frame = pool.borrow("ping")?;
        frame.build_spd3_ping(id)?;
        Ok(Some(frame))
    }
}

impl ControlFrameConsumer for PingFactory {
    fn received_control_frame(
        &mut self,
        frame: &mut Frame,
        header: ControlHeader,
    ) -> Result<bool> {
        if header.version != version::SPD3 || header.frame_type != frame_type::PING {
            return Ok(false);
        }

        let ping_id = frame.load32()?;
        if let Some(mut ping) = self.pending.remove(&ping_id) {
            tracing::debug!(ping_id, "pong received");
            ping.delegate.pong(ping_id);
            return Ok(true);
        }

        if ping_id % 2 == 0 {
            // Gateway-initiated ping: echo it back.
            self.out_queue.push_back(ping_id);
            return Ok(true);
        }

        tracing::warn!(ping_id, "unmatched ping reply dropped");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct RecordingDelegate {
        pongs: mpsc::Sender<u32>,
        cancels: mpsc::Sender<u32>,
    }

    impl PingDelegate for RecordingDelegate {
        fn pong(&mut self, ping_id: u32) {
            self.pongs.send(ping_id).unwrap();
        }
        fn ping_canceled(&mut self, ping_id: u32) {
            self.cancels.send(ping_id).unwrap();
        }
    }

    fn delegate() -> (Box<RecordingDelegate>, mpsc::Receiver<u32>, mpsc::Receiver<u32>) {
        let (pong_tx, pong_rx) = mpsc::channel();
        let (cancel_tx, cancel_rx) = mpsc::channel();
        (
            Box::new(RecordingDelegate {
                pongs: pong_tx,
                cancels: cancel_tx,
            }),
            pong_rx,
            cancel_rx,
        )
    }

    fn pool() -> FramePool {
        FramePool::new(256, 4, 16, Duration::from_secs(30))
    }

    fn ping_reply(id: u32) -> (Frame, ControlHeader) {
        let mut frame = Frame::with_capacity(64);
        frame.store32(id).unwrap();
        frame.flip();
        let header = ControlHeader::new(version::SPD3, frame_type::PING, 0, 4);
        (frame, header)
    }

    #[test]
    fn test_ping_pong_roundtrip() {
        let mut factory = PingFactory::new(Duration::from_secs(60));
        let (d, pong_rx, _cancel_rx) = delegate();
        let id = factory.ping(d, Instant::now());
        assert_eq!(id % 2, 1);
        assert_eq!(factory.pending_count(), 1);

        // Provider emits the PING frame.
        let mut p = pool();
        let frame = factory.build_frame(&mut p).unwrap().unwrap();
        assert_eq!(&frame.readable()[8..12], &id.to_be_bytes());
        p.give_back(frame).unwrap();

        // Reply retires the entry and fires exactly one pong.
        let (mut reply, header) = ping_reply(id);
        assert!(factory.received_control_frame(&mut reply, header).unwrap());
        assert_eq!(pong_rx.try_recv().unwrap(), id);
        assert!(pong_rx.try_recv().is_err());
        assert_eq!(factory.pending_count(), 0);
    }

    #[test]
    fn test_ping_ids_are_unique_and_odd() {
        let mut factory = PingFactory::new(Duration::from_secs(60));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let (d, _p, _c) = delegate();
            let id = factory.ping(d, Instant::now());
            assert_eq!(id % 2, 1);
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_expiry_fires_cancellation_once() {
        let mut factory = PingFactory::new(Duration::from_millis(10));
        let (d, pong_rx, cancel_rx) = delegate();
        let start = Instant::now();
        let id = factory.ping(d, start);

        factory.heart_beat(start + Duration::from_millis(100));
        assert_eq!(cancel_rx.try_recv().unwrap(), id);
        assert_eq!(factory.pending_count(), 0);

        // A late reply after expiry is dropped, no second callback.
        let (mut reply, header) = ping_reply(id);
        assert!(factory.received_control_frame(&mut reply, header).unwrap());
        assert!(pong_rx.try_recv().is_err());
        assert!(cancel_rx.try_recv().is_err());
    }

    #[test]
    fn test_heartbeat_keeps_fresh_pings() {
        let mut factory = PingFactory::new(Duration::from_secs(60));
        let (d, _p, cancel_rx) = delegate();
        let start = Instant::now();
        factory.ping(d, start);

        factory.heart_beat(start + Duration::from_secs(1));
        assert_eq!(factory.pending_count(), 1);
        assert!(cancel_rx.try_recv().is_err());
    }

    #[test]
    fn test_reset_clears_without_callbacks() {
        let mut factory = PingFactory::new(Duration::from_secs(60));
        let (d, pong_rx, cancel_rx) = delegate();
        factory.ping(d, Instant::now());

        factory.reset();
        assert_eq!(factory.pending_count(), 0);
        assert_eq!(factory.queued_count(), 0);
        assert!(pong_rx.try_recv().is_err());
        assert!(cancel_rx.try_recv().is_err());
    }

    #[test]
    fn test_gateway_ping_is_echoed() {
        let mut factory = PingFactory::new(Duration::from_secs(60));
        let (mut frame, header) = ping_reply(42); // even id, not pending
        assert!(factory.received_control_frame(&mut frame, header).unwrap());
        assert_eq!(factory.queued_count(), 1);

        let mut p = pool();
        let echo = factory.build_frame(&mut p).unwrap().unwrap();
        assert_eq!(&echo.readable()[8..12], &42u32.to_be_bytes());
    }

    #[test]
    fn test_non_ping_frames_not_claimed() {
        let mut factory = PingFactory::new(Duration::from_secs(60));
        let mut frame = Frame::with_capacity(16);
        frame.flip();
        let header = ControlHeader::new(version::SPD3, frame_type::RST_STREAM, 0, 8);
        assert!(!factory.received_control_frame(&mut frame, header).unwrap());
    }
}
