//! # alx-tunnel
//!
//! Client engine for a multiplexed gateway tunnel. A single reactor task
//! owns the TCP socket and multiplexes any number of logical streams, pings
//! and certificate exchanges over it using an SPDY-derived binary framing
//! (the SPD3 base dialect plus the ALX1 vendor extension).
//!
//! ## Architecture
//!
//! - [`Reactor`]: the engine task and its cloneable handle. Commands are
//!   marshaled into the loop; events come back on a broadcast channel.
//! - [`protocol`]: wire format, [`Frame`] buffers, the [`FramePool`]
//!   allocator and inbound reassembly.
//! - Capability traits ([`FrameProvider`], [`ControlFrameConsumer`],
//!   [`StreamHandler`], [`PingDelegate`]) are the seams where host layers
//!   plug in.
//!
//! ## Example
//!
//! ```no_run
//! use alx_tunnel::{Reactor, ReactorConfig, TunnelEvent};
//!
//! # async fn run() -> alx_tunnel::Result<()> {
//! let reactor = Reactor::spawn(ReactorConfig::new("gw.example.com:9443"));
//! let mut events = reactor.subscribe();
//! reactor.connect().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if matches!(event, TunnelEvent::Connected) {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod intf;
pub mod protocol;

mod ping;
mod reactor;
mod stream;

pub use config::ReactorConfig;
pub use error::{Result, TunnelError};
pub use intf::{ControlFrameConsumer, FrameProvider, PingDelegate, StreamHandler};
pub use protocol::{Frame, FramePool, SynStreamRequest};
pub use reactor::{ConnState, Reactor, TunnelEvent};
