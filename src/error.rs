//! Error types for alx-tunnel.

use thiserror::Error;

/// Main error type for all tunnel engine operations.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error (malformed header, reserved-bit violation, unknown type).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A frame store/load would cross the frame's capacity or length.
    #[error("Frame bounds exceeded: requested {requested} bytes, {available} available")]
    Bounds { requested: usize, available: usize },

    /// Frame pool reached its hard cap with no idle frames left.
    #[error("Frame pool exhausted")]
    PoolExhausted,

    /// A frame was given back to a pool that did not issue it.
    #[error("Frame does not belong to this pool")]
    ForeignFrame,

    /// The 31-bit stream id space is used up for this reactor lifetime.
    #[error("Stream id space exhausted")]
    StreamIdsExhausted,

    /// The reactor loop is gone; no further commands can be delivered.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation not valid in the current connection state.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
}

/// Result type alias using TunnelError.
pub type Result<T> = std::result::Result<T, TunnelError>;
