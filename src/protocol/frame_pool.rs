//! Frame pool: a reuse allocator for fixed-capacity frames.
//!
//! The pool is the sole allocator of [`Frame`] instances for a connection.
//! `borrow` hands out exclusive ownership, `give_back` reclaims it; the
//! heartbeat trims the free list so an idle connection does not pin a burst's
//! worth of buffers. Exhaustion is an explicit error to the borrower; the
//! reactor loop must never wait on itself.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::frame::Frame;
use crate::error::{Result, TunnelError};

static NEXT_POOL_TAG: AtomicU64 = AtomicU64::new(1);

/// A recycling allocator for [`Frame`] instances.
pub struct FramePool {
    /// Idle frames, oldest first.
    free: VecDeque<(Frame, Instant)>,
    /// Tag stamped onto issued frames; `give_back` rejects mismatches.
    tag: u64,
    frame_capacity: usize,
    /// Free-list size the heartbeat trims back to.
    preferred: usize,
    /// Hard cap on frames alive (idle + outstanding).
    hard_cap: usize,
    /// Idle age past which a frame is dropped on heartbeat.
    keep_idle: Duration,
    outstanding: usize,
}

impl FramePool {
    /// Create a pool issuing frames of `frame_capacity` bytes.
    pub fn new(
        frame_capacity: usize,
        preferred: usize,
        hard_cap: usize,
        keep_idle: Duration,
    ) -> Self {
        Self {
            free: VecDeque::new(),
            tag: NEXT_POOL_TAG.fetch_add(1, Ordering::Relaxed),
            frame_capacity,
            preferred,
            hard_cap,
            keep_idle,
            outstanding: 0,
        }
    }

    /// Borrow a frame, preferring a pooled idle instance over allocating.
    ///
    /// The frame is reset to write mode. `reason` is a human-readable tag
    /// for diagnostics only.
    pub fn borrow(&mut self, reason: &str) -> Result<Frame> {
        if let Some((mut frame, _)) = self.free.pop_back() {
            frame.clear();
            self.outstanding += 1;
            tracing::trace!(reason, reused = true, "frame borrowed");
            return Ok(frame);
        }

        if self.size() >= self.hard_cap {
            tracing::warn!(reason, hard_cap = self.hard_cap, "frame pool exhausted");
            return Err(TunnelError::PoolExhausted);
        }

        let mut frame = Frame::with_capacity(self.frame_capacity);
        frame.set_pool_tag(self.tag);
        self.outstanding += 1;
        tracing::trace!(reason, reused = false, "frame allocated");
        Ok(frame)
    }

    /// Return a previously borrowed frame to the free set.
    ///
    /// Returning a frame issued by a different pool, or more frames than were
    /// borrowed, is a caller-contract violation and fails loudly.
    pub fn give_back(&mut self, mut frame: Frame) -> Result<()> {
        if frame.pool_tag() != self.tag {
            return Err(TunnelError::ForeignFrame);
        }
        if self.outstanding == 0 {
            return Err(TunnelError::ForeignFrame);
        }
        self.outstanding -= 1;
        frame.clear();
        self.free.push_back((frame, Instant::now()));
        Ok(())
    }

    /// Periodic maintenance: drop frames idle past the keep-idle age and
    /// truncate the free list to the preferred working-set size.
    pub fn heart_beat(&mut self, now: Instant) {
        while let Some((_, idle_since)) = self.free.front() {
            if now.duration_since(*idle_since) > self.keep_idle {
                self.free.pop_front();
            } else {
                break;
            }
        }
        while self.free.len() > self.preferred {
            self.free.pop_front();
        }
    }

    /// Frames currently alive: outstanding borrows plus idle instances.
    pub fn size(&self) -> usize {
        self.outstanding + self.free.len()
    }

    /// Hard cap on frames alive at once.
    pub fn capacity(&self) -> usize {
        self.hard_cap
    }

    /// Frames currently borrowed.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}
