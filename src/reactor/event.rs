//! Events broadcast by the reactor to interested subscribers.

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No socket; idle.
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Socket up, frames flowing.
    Connected,
    /// Teardown in progress: factories resetting, queues draining.
    Resetting,
}

/// Notifications emitted on the reactor's broadcast channel.
///
/// Subscribers that fall behind lose the oldest events (broadcast lag), so
/// state-dependent consumers should query [`Reactor::state`](crate::Reactor)
/// after a lag rather than replaying.
#[derive(Debug, Clone)]
pub enum TunnelEvent {
    /// The connection state changed.
    StateChanged(ConnState),
    /// The gateway link is established and frames can be sent.
    Connected,
    /// The connection was torn down; streams and pings were dropped.
    ConnectionReset,
    /// The gateway delivered (or refreshed) the client identity.
    ClientIdChanged { client_id: String, client_tag: String },
    /// The gateway holds no certificate for this client; a CSR must be
    /// submitted before streams can be opened.
    CsrNeeded,
}
