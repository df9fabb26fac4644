//! Reactor: the engine task and its cloneable handle.
//!
//! [`Reactor::spawn`] starts the loop task and returns a handle. Handles are
//! cheap to clone; every method marshals a [`Command`](command::Command) into
//! the loop and the engine replies over a oneshot where a value is produced.
//! Dropping every handle stops the loop.

mod command;
mod core;
mod event;

pub use event::{ConnState, TunnelEvent};

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::ReactorConfig;
use crate::error::{Result, TunnelError};
use crate::intf::{ControlFrameConsumer, FrameProvider, PingDelegate, StreamHandler};

use self::command::Command;
use self::core::ReactorCore;

/// Handle to a running tunnel engine.
#[derive(Clone)]
pub struct Reactor {
    cmd_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<TunnelEvent>,
}

impl Reactor {
    /// Spawn the engine loop on the current tokio runtime.
    pub fn spawn(config: ReactorConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let core = ReactorCore::new(config, cmd_rx, event_tx.clone());
        tokio::spawn(core.run());
        Self { cmd_tx, event_tx }
    }

    /// Subscribe to engine events. Subscribe before issuing commands to
    /// observe the resulting state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.event_tx.subscribe()
    }

    /// Open the gateway connection. Completion is signaled via
    /// [`TunnelEvent::Connected`]; already connected is a no-op.
    pub async fn connect(&self) -> Result<()> {
        self.send(Command::Connect).await
    }

    /// Close the socket, keeping streams and pending pings registered.
    pub async fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect).await
    }

    /// Full teardown: streams reset, pings dropped, queued frames reclaimed.
    pub async fn reset(&self) -> Result<()> {
        self.send(Command::Reset).await
    }

    /// Ask the gateway to reissue the client certificate.
    pub async fn renew(&self) -> Result<()> {
        self.send(Command::Renew).await
    }

    /// Issue a ping. The delegate receives the pong, or a cancellation if
    /// the ping expires unanswered.
    pub async fn ping(&self, delegate: Box<dyn PingDelegate>) -> Result<()> {
        self.send(Command::Ping(delegate)).await
    }

    /// Register a stream handler and return its allocated stream id.
    pub async fn register_stream(&self, handler: Box<dyn StreamHandler>) -> Result<u32> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::RegisterStream(handler, tx)).await?;
        rx.await.map_err(|_| TunnelError::ConnectionClosed)?
    }

    /// Register an outbound frame provider. `single` providers retire after
    /// yielding one frame.
    pub async fn register_frame_provider(
        &self,
        provider: Box<dyn FrameProvider>,
        single: bool,
    ) -> Result<()> {
        self.send(Command::RegisterProvider(provider, single)).await
    }

    /// Register a control-frame consumer, polled after the built-in ones.
    pub async fn register_control_consumer(
        &self,
        consumer: Box<dyn ControlFrameConsumer>,
    ) -> Result<()> {
        self.send(Command::RegisterConsumer(consumer)).await
    }

    /// Current connection state.
    pub async fn state(&self) -> Result<ConnState> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::QueryState(tx)).await?;
        rx.await.map_err(|_| TunnelError::ConnectionClosed)
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| TunnelError::ConnectionClosed)
    }
}
