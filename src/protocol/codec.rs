//! Wire format encoding and decoding for the SPD3/ALX1 framing dialects.
//!
//! Both frame kinds carry a fixed 8-byte header:
//! ```text
//! Control frame                        Data frame
//! ┌─┬───────────┬────────┬─────┬────┐ ┌─┬───────────┬─────┬────────┐
//! │1│ version   │ type   │flags│len │ │0│ stream id │flags│ length │
//! │ │ 15 bits   │ 16 bits│ 8   │ 24 │ │ │ 31 bits   │ 8   │ 24     │
//! └─┴───────────┴────────┴─────┴────┘ └─┴───────────┴─────┴────────┘
//! ```
//! All multi-byte integers are Big Endian. Bit 7 of byte 0 is the control
//! flag; the version field selects the dialect (SPD3 base framing or the
//! ALX1 vendor extension used for stream setup and certificate provisioning).

use super::frame::Frame;
use crate::error::{Result, TunnelError};

/// Header size in bytes (fixed, exactly 8 for both frame kinds).
pub const HEADER_SIZE: usize = 8;

/// Mask for the 31-bit stream id / reserved high bit.
pub const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

/// Maximum payload length expressible in the 24-bit length field.
pub const MAX_PAYLOAD_LENGTH: u32 = 0x00FF_FFFF;

/// Header dialect versions.
pub mod version {
    /// Base dialect: PING, RST_STREAM, SYN_REPLY.
    pub const SPD3: u16 = 0x03;
    /// Vendor extension dialect: SYN_STREAM, STATS, certificate exchange.
    pub const ALX1: u16 = 0xA1;
}

/// Control frame types.
pub mod frame_type {
    pub const SYN_STREAM: u16 = 1;
    pub const SYN_REPLY: u16 = 2;
    pub const RST_STREAM: u16 = 3;
    pub const PING: u16 = 6;

    pub const STATS_REQ: u16 = 0xA1;
    pub const STATS_REP: u16 = 0xA2;

    pub const CSR: u16 = 0xC1;
    pub const CERT_QUERY: u16 = 0xC2;
    pub const CERT: u16 = 0xC3;
}

/// Frame flag bits.
pub mod flags {
    /// Last frame on this stream.
    pub const FIN: u8 = 0x01;
    /// Stream is one-directional.
    pub const UNIDIRECTIONAL: u8 = 0x02;
    /// Gateway holds no certificate for this client (CERT frames only).
    pub const CSR_NOT_FOUND: u8 = 0x80;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// RST_STREAM status codes.
pub mod rst_status {
    pub const PROTOCOL_ERROR: u32 = 1;
    pub const INVALID_STREAM: u32 = 2;
    pub const REFUSED_STREAM: u32 = 3;
    pub const INTERNAL_ERROR: u32 = 6;
    pub const STREAM_ALREADY_CLOSED: u32 = 9;
}

/// Check whether the leading header byte marks a control frame.
#[inline]
pub fn is_control(first_byte: u8) -> bool {
    first_byte & 0x80 != 0
}

/// Decoded control-frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHeader {
    /// Dialect version (SPD3 or ALX1).
    pub version: u16,
    /// Frame type within the dialect.
    pub frame_type: u16,
    /// Flags byte (see [`flags`]).
    pub flags: u8,
    /// Payload length in bytes (24-bit).
    pub length: u32,
}

impl ControlHeader {
    /// Create a new control header.
    pub fn new(version: u16, frame_type: u16, flags: u8, length: u32) -> Self {
        Self {
            version,
            frame_type,
            flags,
            length,
        }
    }

    /// Decode a control header from the first 8 bytes of `buf`.
    ///
    /// Rejects a clear control bit or an unknown dialect version as a
    /// protocol error.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(TunnelError::Bounds {
                requested: HEADER_SIZE,
                available: buf.len(),
            });
        }
        if !is_control(buf[0]) {
            return Err(TunnelError::Protocol(
                "control bit clear in control frame header".to_string(),
            ));
        }

        let ver = u16::from_be_bytes([buf[0] & 0x7F, buf[1]]);
        if ver != version::SPD3 && ver != version::ALX1 {
            return Err(TunnelError::Protocol(format!(
                "unknown control frame version 0x{:04X}",
                ver
            )));
        }

        Ok(Self {
            version: ver,
            frame_type: u16::from_be_bytes([buf[2], buf[3]]),
            flags: buf[4],
            length: u32::from_be_bytes([0, buf[5], buf[6], buf[7]]),
        })
    }

    /// Encode this header to its 8-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = 0x80 | ((self.version >> 8) as u8 & 0x7F);
        buf[1] = self.version as u8;
        buf[2..4].copy_from_slice(&self.frame_type.to_be_bytes());
        buf[4] = self.flags;
        buf[5] = (self.length >> 16) as u8;
        buf[6] = (self.length >> 8) as u8;
        buf[7] = self.length as u8;
        buf
    }

    /// The `(version, type)` discriminant packed into one word, used when
    /// matching inbound frames against consumer interest.
    #[inline]
    pub fn version_type(&self) -> u32 {
        ((self.version as u32) << 16) | self.frame_type as u32
    }

    /// Check if the FIN flag is set.
    #[inline]
    pub fn is_fin(&self) -> bool {
        flags::has_flag(self.flags, flags::FIN)
    }
}

/// Decoded data-frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    /// Stream identifier (31-bit).
    pub stream_id: u32,
    /// Flags byte (see [`flags`]).
    pub flags: u8,
    /// Payload length in bytes (24-bit).
    pub length: u32,
}

impl DataHeader {
    /// Create a new data header.
    pub fn new(stream_id: u32, flags: u8, length: u32) -> Self {
        Self {
            stream_id,
            flags,
            length,
        }
    }

    /// Decode a data header from the first 8 bytes of `buf`.
    ///
    /// The high bit of the stream-id word is the control flag and must be
    /// clear here.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(TunnelError::Bounds {
                requested: HEADER_SIZE,
                available: buf.len(),
            });
        }
        if is_control(buf[0]) {
            return Err(TunnelError::Protocol(
                "control bit set in data frame header".to_string(),
            ));
        }

        Ok(Self {
            stream_id: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) & STREAM_ID_MASK,
            flags: buf[4],
            length: u32::from_be_bytes([0, buf[5], buf[6], buf[7]]),
        })
    }

    /// Encode this header to its 8-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&(self.stream_id & STREAM_ID_MASK).to_be_bytes());
        buf[4] = self.flags;
        buf[5] = (self.length >> 16) as u8;
        buf[6] = (self.length >> 8) as u8;
        buf[7] = self.length as u8;
        buf
    }

    /// Check if the FIN flag is set.
    #[inline]
    pub fn is_fin(&self) -> bool {
        flags::has_flag(self.flags, flags::FIN)
    }
}

/// Finalize an ALX1 CSR frame.
///
/// The caller writes the CSR payload after reserving 8 bytes of header space
/// (via [`Frame::advance`]); this patches the header around the payload and
/// flips the frame for sending.
pub fn finish_alx1_csr(frame: &mut Frame) -> Result<()> {
    let payload_len = frame.position().saturating_sub(HEADER_SIZE) as u32;
    if payload_len > MAX_PAYLOAD_LENGTH {
        return Err(TunnelError::Protocol(format!(
            "CSR payload of {} bytes exceeds 24-bit length field",
            payload_len
        )));
    }
    let header = ControlHeader::new(version::ALX1, frame_type::CSR, 0, payload_len);
    frame.store_header_at(0, &header.encode())?;
    frame.flip();
    Ok(())
}

/// Build a complete ALX1 CERT_QUERY frame into a fresh frame.
///
/// The payload is the 16-bit query type discriminant.
pub fn build_alx1_cert_query(frame: &mut Frame, query_type: u16) -> Result<()> {
    frame.clear();
    let header = ControlHeader::new(version::ALX1, frame_type::CERT_QUERY, 0, 2);
    frame.store_header_at(0, &header.encode())?;
    frame.advance(HEADER_SIZE)?;
    frame.store16(query_type)?;
    frame.flip();
    Ok(())
}
