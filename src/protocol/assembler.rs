//! Frame assembler for accumulating partial socket reads.
//!
//! Uses `bytes::BytesMut` for buffer management and a two-state machine:
//! - `WaitingForHeader`: need at least 8 bytes
//! - `WaitingForPayload`: header parsed, need `length` more bytes
//!
//! A frame is surfaced only once its full payload is available; fragments
//! are buffered across reads. The first header byte classifies the frame as
//! control or data before the dialect-specific parse runs.

use bytes::{Bytes, BytesMut};

use super::codec::{self, ControlHeader, DataHeader, HEADER_SIZE};
use crate::error::{Result, TunnelError};

/// A fully-parsed frame header, classified by the control bit.
#[derive(Debug, Clone, Copy)]
pub enum WireHeader {
    Control(ControlHeader),
    Data(DataHeader),
}

impl WireHeader {
    /// Payload length declared by the header.
    pub fn payload_length(&self) -> u32 {
        match self {
            WireHeader::Control(h) => h.length,
            WireHeader::Data(h) => h.length,
        }
    }
}

/// A complete inbound frame: header plus payload bytes.
#[derive(Debug)]
pub struct InboundFrame {
    pub header: WireHeader,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForHeader,
    WaitingForPayload { header: WireHeader, remaining: u32 },
}

/// Accumulates inbound bytes and extracts complete frames.
pub struct FrameAssembler {
    buffer: BytesMut,
    state: State,
    /// Payloads above this are a protocol error (reassembly desync guard).
    max_payload: u32,
}

impl FrameAssembler {
    /// Create an assembler that rejects payloads larger than `max_payload`.
    pub fn new(max_payload: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload,
        }
    }

    /// Push socket bytes and extract all complete frames.
    ///
    /// Partial data is buffered for the next push. A declared payload length
    /// above the maximum is non-recoverable: the stream offsets can no longer
    /// be trusted and the connection must be reset.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<InboundFrame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<InboundFrame>> {
        match self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(None);
                }

                let header = if codec::is_control(self.buffer[0]) {
                    WireHeader::Control(ControlHeader::parse(&self.buffer[..HEADER_SIZE])?)
                } else {
                    WireHeader::Data(DataHeader::parse(&self.buffer[..HEADER_SIZE])?)
                };

                let length = header.payload_length();
                if length > self.max_payload {
                    return Err(TunnelError::Protocol(format!(
                        "declared payload of {} bytes exceeds maximum {}",
                        length, self.max_payload
                    )));
                }

                let _ = self.buffer.split_to(HEADER_SIZE);

                if length == 0 {
                    return Ok(Some(InboundFrame {
                        header,
                        payload: Bytes::new(),
                    }));
                }

                self.state = State::WaitingForPayload {
                    header,
                    remaining: length,
                };
                self.try_extract_one()
            }

            State::WaitingForPayload { header, remaining } => {
                let remaining = remaining as usize;
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                self.state = State::WaitingForHeader;
                Ok(Some(InboundFrame { header, payload }))
            }
        }
    }

    /// Number of buffered bytes not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered bytes and reset the state machine (connection reset).
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::{frame_type, version};
    use crate::protocol::Frame;

    fn ping_bytes(ping_id: u32) -> Vec<u8> {
        let mut frame = Frame::with_capacity(64);
        frame.build_spd3_ping(ping_id).unwrap();
        frame.readable().to_vec()
    }

    fn data_bytes(stream_id: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = Frame::with_capacity(1024);
        frame.build_data_frame(stream_id, flags, payload).unwrap();
        frame.readable().to_vec()
    }

    #[test]
    fn test_single_control_frame() {
        let mut assembler = FrameAssembler::new(1 << 20);
        let frames = assembler.push(&ping_bytes(41)).unwrap();

        assert_eq!(frames.len(), 1);
        match frames[0].header {
            WireHeader::Control(h) => {
                assert_eq!(h.version, version::SPD3);
                assert_eq!(h.frame_type, frame_type::PING);
                assert_eq!(h.length, 4);
            }
            WireHeader::Data(_) => panic!("expected control frame"),
        }
        assert_eq!(&frames[0].payload[..], &41u32.to_be_bytes());
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_classifies_data_frame() {
        let mut assembler = FrameAssembler::new(1 << 20);
        let frames = assembler.push(&data_bytes(3, 0x01, b"abc")).unwrap();

        assert_eq!(frames.len(), 1);
        match frames[0].header {
            WireHeader::Data(h) => {
                assert_eq!(h.stream_id, 3);
                assert_eq!(h.flags, 0x01);
                assert_eq!(h.length, 3);
            }
            WireHeader::Control(_) => panic!("expected data frame"),
        }
    }

    #[test]
    fn test_multiple_frames_one_push() {
        let mut assembler = FrameAssembler::new(1 << 20);
        let mut combined = ping_bytes(1);
        combined.extend(data_bytes(3, 0, b"payload"));
        combined.extend(ping_bytes(2));

        let frames = assembler.push(&combined).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0].header, WireHeader::Control(_)));
        assert!(matches!(frames[1].header, WireHeader::Data(_)));
        assert!(matches!(frames[2].header, WireHeader::Control(_)));
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut assembler = FrameAssembler::new(1 << 20);
        let bytes = data_bytes(7, 0, b"fragmented payload");

        let mut collected = Vec::new();
        for byte in &bytes {
            collected.extend(assembler.push(&[*byte]).unwrap());
        }

        assert_eq!(collected.len(), 1);
        assert_eq!(&collected[0].payload[..], b"fragmented payload");
    }

    #[test]
    fn test_zero_length_payload() {
        let mut assembler = FrameAssembler::new(1 << 20);
        let frames = assembler.push(&data_bytes(5, 0x01, b"")).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut assembler = FrameAssembler::new(16);
        let bytes = data_bytes(1, 0, &[0u8; 64]);
        let err = assembler.push(&bytes).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut assembler = FrameAssembler::new(1 << 20);
        let bytes = data_bytes(1, 0, b"partial");
        assembler.push(&bytes[..HEADER_SIZE + 2]).unwrap();
        assert!(assembler.buffered() > 0);

        assembler.clear();
        assert_eq!(assembler.buffered(), 0);

        // A fresh complete frame parses normally after the reset.
        let frames = assembler.push(&ping_bytes(9)).unwrap();
        assert_eq!(frames.len(), 1);
    }
}
