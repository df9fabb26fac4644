//! Protocol module - SPD3/ALX1 wire format, frames, pooling, reassembly.

pub mod codec;

mod assembler;
mod frame;
mod frame_pool;

pub use assembler::{FrameAssembler, InboundFrame, WireHeader};
pub use codec::{ControlHeader, DataHeader, HEADER_SIZE, MAX_PAYLOAD_LENGTH, STREAM_ID_MASK};
pub use frame::{Frame, SynStreamRequest};
pub use frame_pool::FramePool;
