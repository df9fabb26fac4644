//! Commands marshaled into the reactor loop.
//!
//! All engine state lives inside the loop task; handles interact with it
//! exclusively through these messages. Commands that produce a value carry a
//! oneshot sender for the reply.

use tokio::sync::oneshot;

use crate::error::Result;
use crate::intf::{ControlFrameConsumer, FrameProvider, PingDelegate, StreamHandler};

use super::event::ConnState;

pub enum Command {
    /// Open the gateway socket.
    Connect,
    /// Close the socket without resetting stream/ping state.
    Disconnect,
    /// Full teardown: reset factories, drop queued frames, close the socket.
    Reset,
    /// Ask the gateway to reissue the client certificate.
    Renew,
    /// Issue a ping; the delegate receives the pong or cancellation.
    Ping(Box<dyn PingDelegate>),
    /// Register a stream handler; replies with the allocated stream id.
    RegisterStream(Box<dyn StreamHandler>, oneshot::Sender<Result<u32>>),
    /// Register an outbound frame provider. `true` marks it one-shot.
    RegisterProvider(Box<dyn FrameProvider>, bool),
    /// Register an inbound control-frame consumer (after the built-ins).
    RegisterConsumer(Box<dyn ControlFrameConsumer>),
    /// Query the current connection state.
    QueryState(oneshot::Sender<ConnState>),
}
