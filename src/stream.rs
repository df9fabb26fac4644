//! Stream factory: allocates stream ids and routes frames to handlers.
//!
//! Streams are identified by 31-bit, client-parity (odd) ids, strictly
//! increasing and never reused for the factory's lifetime; the counter
//! deliberately survives connection resets. The factory holds the routing
//! map; logical ownership of each stream stays with the layer that
//! registered the handler.

use std::collections::{HashMap, VecDeque};

use crate::error::{Result, TunnelError};
use crate::intf::{ControlFrameConsumer, FrameProvider, StreamHandler};
use crate::protocol::codec::{frame_type, rst_status, version};
use crate::protocol::{ControlHeader, DataHeader, Frame, FramePool, STREAM_ID_MASK};

/// Maps stream ids to their handlers and routes inbound frames.
pub struct StreamFactory {
    streams: HashMap<u32, Box<dyn StreamHandler>>,
    next_stream_id: u32,
    /// (stream id, status) pairs awaiting an outbound RST_STREAM.
    rst_queue: VecDeque<(u32, u32)>,
}

impl StreamFactory {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            next_stream_id: 1,
            rst_queue: VecDeque::new(),
        }
    }

    /// Allocate the next stream id and register `handler` under it.
    ///
    /// The caller builds its own SYN_STREAM frame carrying the returned id.
    pub fn register_stream(&mut self, handler: Box<dyn StreamHandler>) -> Result<u32> {
        if self.next_stream_id > STREAM_ID_MASK {
            return Err(TunnelError::StreamIdsExhausted);
        }
        let id = self.next_stream_id;
        self.next_stream_id += 2;
        self.streams.insert(id, handler);
        tracing::debug!(stream_id = id, "stream registered");
        Ok(id)
    }

    /// Route an inbound data frame to the owning handler.
    ///
    /// An unknown stream id is a recoverable protocol error: the frame is
    /// discarded and an RST_STREAM with INVALID_STREAM is queued.
    pub fn received_data_frame(&mut self, frame: &mut Frame, header: DataHeader) -> Result<bool> {
        match self.streams.get_mut(&header.stream_id) {
            Some(handler) => handler.received_data_frame(frame, header),
            None => {
                tracing::warn!(stream_id = header.stream_id, "data frame for unknown stream");
                self.rst_queue
                    .push_back((header.stream_id, rst_status::INVALID_STREAM));
                Ok(false)
            }
        }
    }

    /// Registered stream count (diagnostics, STATS reporting).
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Tear down all streams: each handler's `reset` runs and the map is
    /// cleared. The id counter is not rewound.
    pub fn reset_all(&mut self) {
        for (_, handler) in self.streams.iter_mut() {
            handler.reset();
        }
        self.streams.clear();
        self.rst_queue.clear();
    }
}

impl Default for StreamFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFrameConsumer for StreamFactory {
    fn received_control_frame(
        &mut self,
        frame: &mut Frame,
        header: ControlHeader,
    ) -> Result<bool> {
        let is_syn_reply =
            header.version == version::ALX1 && header.frame_type == frame_type::SYN_REPLY;
        let is_rst =
            header.version == version::SPD3 && header.frame_type == frame_type::RST_STREAM;
        if !is_syn_reply && !is_rst {
            return Ok(false);
        }

        let stream_id = frame.load32()? & STREAM_ID_MASK;

        if is_rst {
            match self.streams.remove(&stream_id) {
                Some(mut handler) => {
                    handler.received_rst_stream(frame, header)?;
                }
                None => {
                    tracing::warn!(stream_id, "RST_STREAM for unknown stream");
                }
            }
            return Ok(true);
        }

        match self.streams.get_mut(&stream_id) {
            Some(handler) => {
                handler.received_syn_reply(frame, header)?;
            }
            None => {
                tracing::warn!(stream_id, "SYN_REPLY for unknown stream");
                self.rst_queue
                    .push_back((stream_id, rst_status::INVALID_STREAM));
            }
        }
        Ok(true)
    }
}

impl FrameProvider for StreamFactory {
    fn build_frame(&mut self, pool: &mut FramePool) -> Result<Option<Frame>> {
        let Some((stream_id, status)) = self.rst_queue.pop_front() else {
            return Ok(None);
        };
        let mut frame = pool.borrow("rst_stream")?;
        frame.build_spd3_rst_stream(stream_id, status)?;
        Ok(Some(frame))
    }
}
