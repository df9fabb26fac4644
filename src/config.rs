//! Reactor configuration.
//!
//! The protocol leaves several thresholds to the implementation (ping expiry,
//! pool working set, heartbeat cadence). They are all exposed here so hosts
//! and tests can tune them explicitly.

use std::time::Duration;

/// Default capacity of a pooled frame in bytes (16 KiB).
pub const DEFAULT_FRAME_CAPACITY: usize = 16 * 1024;

/// Default preferred working-set size of the frame pool.
pub const DEFAULT_POOL_PREFERRED: usize = 16;

/// Default hard cap on frames alive at once (idle + outstanding).
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Default age after which an idle pooled frame is dropped.
pub const DEFAULT_POOL_KEEP_IDLE: Duration = Duration::from_secs(30);

/// Default heartbeat interval driving pool trimming and ping expiry.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Default age after which an unanswered ping is canceled.
pub const DEFAULT_PING_EXPIRY: Duration = Duration::from_secs(60);

/// Default socket read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default command channel capacity.
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Default event broadcast channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for a [`Reactor`](crate::Reactor).
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Gateway address, `host:port`.
    pub gateway_addr: String,
    /// Capacity of each pooled frame.
    pub frame_capacity: usize,
    /// Preferred idle working-set size of the frame pool; the heartbeat
    /// trims the free list back to this.
    pub pool_preferred: usize,
    /// Hard cap on frames alive at once. `borrow` fails past this.
    pub pool_capacity: usize,
    /// Idle age past which a pooled frame is released on heartbeat.
    pub pool_keep_idle: Duration,
    /// Heartbeat interval. Ping expiry and pool trimming run only on this
    /// cadence, so worst-case ping-timeout detection is
    /// `ping_expiry + heartbeat_interval`.
    pub heartbeat_interval: Duration,
    /// Age past which a pending ping is expired and its delegate canceled.
    pub ping_expiry: Duration,
    /// Socket read buffer size.
    pub read_buffer_size: usize,
    /// Command channel capacity.
    pub command_capacity: usize,
    /// Event broadcast channel capacity.
    pub event_capacity: usize,
}

impl ReactorConfig {
    /// Create a configuration for the given gateway address with defaults.
    pub fn new(gateway_addr: impl Into<String>) -> Self {
        Self {
            gateway_addr: gateway_addr.into(),
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            pool_preferred: DEFAULT_POOL_PREFERRED,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            pool_keep_idle: DEFAULT_POOL_KEEP_IDLE,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            ping_expiry: DEFAULT_PING_EXPIRY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
