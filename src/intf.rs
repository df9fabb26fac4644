//! Capability traits at the engine's seams.
//!
//! External layers plug into the reactor through these: providers supply
//! outbound frames on demand, consumers claim inbound control frames, stream
//! handlers own the per-stream protocol, and ping delegates receive pong and
//! cancellation callbacks. All of them are invoked only from the reactor
//! loop's task; implementations marshal results back to their own context.

use crate::error::Result;
use crate::protocol::{ControlHeader, DataHeader, Frame, FramePool};

/// Produces outbound frames on demand.
///
/// The reactor polls registered providers in registration order on every
/// loop iteration. A provider with nothing to send returns `Ok(None)`.
/// Providers registered as `single` are deregistered after yielding exactly
/// one frame.
pub trait FrameProvider: Send {
    /// Build the next outbound frame, borrowing its buffer from `pool`,
    /// or return `None` if nothing is ready.
    fn build_frame(&mut self, pool: &mut FramePool) -> Result<Option<Frame>>;
}

/// Receives fully-parsed inbound control frames.
///
/// The reactor calls registered consumers in order until one claims the
/// frame by returning `Ok(true)`. A consumer that does not handle the
/// `(version, type)` discriminant must return `Ok(false)` without reading
/// the frame.
pub trait ControlFrameConsumer: Send {
    /// `frame` is flipped and positioned at the payload start.
    fn received_control_frame(&mut self, frame: &mut Frame, header: ControlHeader)
        -> Result<bool>;
}

/// Owns the protocol of one multiplexed stream.
///
/// Handlers are registered through
/// [`Reactor::register_stream`](crate::Reactor::register_stream) and
/// referenced by stream id; the external layer (e.g. an HTTP-bridging
/// adapter) retains logical ownership of the stream's lifecycle.
pub trait StreamHandler: Send {
    /// The connection was torn down; drop any in-flight state.
    fn reset(&mut self);

    /// An ALX1 SYN_REPLY arrived for this stream. The frame is positioned
    /// just past the stream id.
    fn received_syn_reply(&mut self, frame: &mut Frame, header: ControlHeader) -> Result<bool>;

    /// An SPD3 RST_STREAM arrived for this stream; the mapping is removed
    /// after this returns. The frame is positioned at the status code.
    fn received_rst_stream(&mut self, frame: &mut Frame, header: ControlHeader) -> Result<bool>;

    /// A data frame arrived for this stream; the frame holds the payload.
    fn received_data_frame(&mut self, frame: &mut Frame, header: DataHeader) -> Result<bool>;
}

/// Receives the outcome of a ping issued through the reactor.
pub trait PingDelegate: Send {
    /// The gateway answered ping `ping_id`.
    fn pong(&mut self, ping_id: u32);

    /// Ping `ping_id` expired unanswered. Optional; the default drops it
    /// silently.
    fn ping_canceled(&mut self, ping_id: u32) {
        let _ = ping_id;
    }
}
