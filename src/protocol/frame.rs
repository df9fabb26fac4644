//! Frame: a fixed-capacity byte buffer with bounds-checked cursors.
//!
//! A frame is either in *write mode* (`length == capacity`, stores append at
//! `position`) or, after [`Frame::flip`], in *read mode* (`length` fixes the
//! valid region, loads advance `position` from 0). The invariant
//! `0 <= position <= length <= capacity` holds at all times; every store and
//! load validates it and returns an explicit error instead of touching memory
//! out of bounds.
//!
//! Frames are issued by the [`FramePool`](super::FramePool) and must be given
//! back to it; they are never shared between owners.

use crate::error::{Result, TunnelError};
use crate::protocol::codec::{self, ControlHeader, DataHeader, HEADER_SIZE, STREAM_ID_MASK};

/// Single-byte VLE lengths stop here; longer strings use the escape marker.
const VLE_ESCAPE: u8 = 0xFF;
const VLE_MAX_SHORT: usize = 0xF9;

/// Request parameters carried by an ALX1 SYN_STREAM frame.
///
/// The external HTTP-bridging layer maps its own request representation onto
/// this before opening a stream.
#[derive(Debug, Clone, Default)]
pub struct SynStreamRequest {
    /// Target host.
    pub host: String,
    /// Request method (e.g. `GET`).
    pub method: String,
    /// Request path including query.
    pub path: String,
    /// Additional header key/value pairs.
    pub headers: Vec<(String, String)>,
}

/// A protocol frame buffer with independent read/write cursors.
#[derive(Debug)]
pub struct Frame {
    buf: Box<[u8]>,
    position: usize,
    length: usize,
    pool_tag: u64,
}

impl Frame {
    /// Create an empty frame in write mode with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            length: capacity,
            pool_tag: 0,
        }
    }

    pub(crate) fn set_pool_tag(&mut self, tag: u64) {
        self.pool_tag = tag;
    }

    pub(crate) fn pool_tag(&self) -> u64 {
        self.pool_tag
    }

    /// Total buffer capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Next read/write offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Valid byte count after a flip; equals capacity in write mode.
    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Bytes left between `position` and `length`.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.length - self.position
    }

    /// The valid region of a flipped frame, `position..length`.
    #[inline]
    pub fn readable(&self) -> &[u8] {
        &self.buf[self.position..self.length]
    }

    /// Switch to read mode: the written region becomes the valid region.
    pub fn flip(&mut self) {
        self.length = self.position;
        self.position = 0;
    }

    /// Switch to read mode with an explicit valid length.
    pub fn flip_to(&mut self, length: usize) -> Result<()> {
        if length > self.capacity() {
            return Err(TunnelError::Bounds {
                requested: length,
                available: self.capacity(),
            });
        }
        self.length = length;
        self.position = 0;
        Ok(())
    }

    /// Reset to the empty write-mode state.
    pub fn clear(&mut self) {
        self.position = 0;
        self.length = self.capacity();
    }

    /// Move the cursor forward without writing (reserves header space).
    pub fn advance(&mut self, delta: usize) -> Result<()> {
        self.check(delta)?;
        self.position += delta;
        Ok(())
    }

    #[inline]
    fn check(&self, needed: usize) -> Result<()> {
        if self.position + needed > self.length {
            return Err(TunnelError::Bounds {
                requested: needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    // Stores: append big-endian integers at the cursor.

    pub fn store8(&mut self, value: u8) -> Result<()> {
        self.check(1)?;
        self.buf[self.position] = value;
        self.position += 1;
        Ok(())
    }

    pub fn store16(&mut self, value: u16) -> Result<()> {
        self.check(2)?;
        self.buf[self.position..self.position + 2].copy_from_slice(&value.to_be_bytes());
        self.position += 2;
        Ok(())
    }

    pub fn store24(&mut self, value: u32) -> Result<()> {
        self.check(3)?;
        self.buf[self.position] = (value >> 16) as u8;
        self.buf[self.position + 1] = (value >> 8) as u8;
        self.buf[self.position + 2] = value as u8;
        self.position += 3;
        Ok(())
    }

    pub fn store32(&mut self, value: u32) -> Result<()> {
        self.check(4)?;
        self.buf[self.position..self.position + 4].copy_from_slice(&value.to_be_bytes());
        self.position += 4;
        Ok(())
    }

    /// Overwrite a 24-bit value at an absolute offset, cursor unmoved.
    pub fn store24_at(&mut self, at: usize, value: u32) -> Result<()> {
        if at + 3 > self.capacity() {
            return Err(TunnelError::Bounds {
                requested: at + 3,
                available: self.capacity(),
            });
        }
        self.buf[at] = (value >> 16) as u8;
        self.buf[at + 1] = (value >> 8) as u8;
        self.buf[at + 2] = value as u8;
        Ok(())
    }

    /// Overwrite a 32-bit value at an absolute offset, cursor unmoved.
    pub fn store32_at(&mut self, at: usize, value: u32) -> Result<()> {
        if at + 4 > self.capacity() {
            return Err(TunnelError::Bounds {
                requested: at + 4,
                available: self.capacity(),
            });
        }
        self.buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Overwrite a pre-encoded 8-byte header at an absolute offset,
    /// cursor unmoved.
    pub fn store_header_at(&mut self, at: usize, header: &[u8; HEADER_SIZE]) -> Result<()> {
        if at + HEADER_SIZE > self.capacity() {
            return Err(TunnelError::Bounds {
                requested: at + HEADER_SIZE,
                available: self.capacity(),
            });
        }
        self.buf[at..at + HEADER_SIZE].copy_from_slice(header);
        Ok(())
    }

    /// Append raw bytes at the cursor.
    pub fn store_slice(&mut self, data: &[u8]) -> Result<()> {
        self.check(data.len())?;
        self.buf[self.position..self.position + data.len()].copy_from_slice(data);
        self.position += data.len();
        Ok(())
    }

    /// Append a length-prefixed UTF-8 string.
    ///
    /// Lengths below 0xFA use a single prefix byte; longer strings use the
    /// 0xFF escape followed by a 16-bit big-endian length.
    pub fn store_vle(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        if bytes.len() <= VLE_MAX_SHORT {
            self.store8(bytes.len() as u8)?;
        } else if bytes.len() <= u16::MAX as usize {
            self.store8(VLE_ESCAPE)?;
            self.store16(bytes.len() as u16)?;
        } else {
            return Err(TunnelError::Bounds {
                requested: bytes.len(),
                available: u16::MAX as usize,
            });
        }
        self.store_slice(bytes)
    }

    // Loads: read big-endian integers at the cursor.

    pub fn load8(&mut self) -> Result<u8> {
        self.check(1)?;
        let v = self.buf[self.position];
        self.position += 1;
        Ok(v)
    }

    pub fn load16(&mut self) -> Result<u16> {
        self.check(2)?;
        let v = u16::from_be_bytes([self.buf[self.position], self.buf[self.position + 1]]);
        self.position += 2;
        Ok(v)
    }

    pub fn load32(&mut self) -> Result<u32> {
        self.check(4)?;
        let v = u32::from_be_bytes([
            self.buf[self.position],
            self.buf[self.position + 1],
            self.buf[self.position + 2],
            self.buf[self.position + 3],
        ]);
        self.position += 4;
        Ok(v)
    }

    /// Read raw bytes at the cursor.
    pub fn load_slice(&mut self, len: usize) -> Result<&[u8]> {
        self.check(len)?;
        let start = self.position;
        self.position += len;
        Ok(&self.buf[start..start + len])
    }

    /// Read a length-prefixed UTF-8 string (inverse of [`Frame::store_vle`]).
    pub fn load_vle(&mut self) -> Result<String> {
        let prefix = self.load8()?;
        let len = if prefix == VLE_ESCAPE {
            self.load16()? as usize
        } else {
            prefix as usize
        };
        let bytes = self.load_slice(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TunnelError::Protocol(format!("invalid UTF-8 in VLE string: {}", e)))
    }

    /// Read a byte at an absolute offset, cursor unmoved.
    pub fn get8_at(&self, at: usize) -> Result<u8> {
        if at >= self.capacity() {
            return Err(TunnelError::Bounds {
                requested: at + 1,
                available: self.capacity(),
            });
        }
        Ok(self.buf[at])
    }

    // Convenience constructors for complete wire frames.

    /// Build a complete SPD3 PING frame carrying `ping_id`.
    pub fn build_spd3_ping(&mut self, ping_id: u32) -> Result<()> {
        self.clear();
        let header = ControlHeader::new(codec::version::SPD3, codec::frame_type::PING, 0, 4);
        self.store_slice(&header.encode())?;
        self.store32(ping_id)?;
        self.flip();
        Ok(())
    }

    /// Build a complete SPD3 RST_STREAM frame.
    pub fn build_spd3_rst_stream(&mut self, stream_id: u32, status: u32) -> Result<()> {
        self.clear();
        let header = ControlHeader::new(codec::version::SPD3, codec::frame_type::RST_STREAM, 0, 8);
        self.store_slice(&header.encode())?;
        self.store32(stream_id & STREAM_ID_MASK)?;
        self.store32(status)?;
        self.flip();
        Ok(())
    }

    /// Build a complete ALX1 SYN_STREAM frame opening `stream_id` for the
    /// given request.
    pub fn build_alx1_syn_stream(
        &mut self,
        request: &SynStreamRequest,
        stream_id: u32,
        fin_flag: bool,
        priority: u8,
    ) -> Result<()> {
        self.clear();
        self.advance(HEADER_SIZE)?;
        self.store32(stream_id & STREAM_ID_MASK)?;
        self.store8(priority)?;
        self.store_vle(&request.host)?;
        self.store_vle(&request.method)?;
        self.store_vle(&request.path)?;
        self.store16(request.headers.len() as u16)?;
        for (key, value) in &request.headers {
            self.store_vle(key)?;
            self.store_vle(value)?;
        }

        let payload_len = (self.position - HEADER_SIZE) as u32;
        let header_flags = if fin_flag { codec::flags::FIN } else { 0 };
        let header = ControlHeader::new(
            codec::version::ALX1,
            codec::frame_type::SYN_STREAM,
            header_flags,
            payload_len,
        );
        self.store_header_at(0, &header.encode())?;
        self.flip();
        Ok(())
    }

    /// Build a complete data frame for `stream_id` carrying `payload`.
    pub fn build_data_frame(
        &mut self,
        stream_id: u32,
        frame_flags: u8,
        payload: &[u8],
    ) -> Result<()> {
        self.clear();
        let header = DataHeader::new(stream_id, frame_flags, payload.len() as u32);
        self.store_slice(&header.encode())?;
        self.store_slice(payload)?;
        self.flip();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::{flags, frame_type, version};

    #[test]
    fn test_store_load_roundtrip_all_widths() {
        let mut frame = Frame::with_capacity(64);
        frame.store8(0xAB).unwrap();
        frame.store16(0x1234).unwrap();
        frame.store24(0x00AB_CDEF).unwrap();
        frame.store32(0xDEAD_BEEF).unwrap();
        frame.flip();

        assert_eq!(frame.load8().unwrap(), 0xAB);
        assert_eq!(frame.load16().unwrap(), 0x1234);
        // 24-bit value reads back as a byte plus a u16 to cover the layout.
        assert_eq!(frame.load8().unwrap(), 0xAB);
        assert_eq!(frame.load16().unwrap(), 0xCDEF);
        assert_eq!(frame.load32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(frame.remaining(), 0);
    }

    #[test]
    fn test_vle_roundtrip() {
        let mut frame = Frame::with_capacity(1024);
        frame.store_vle("").unwrap();
        frame.store_vle("hello").unwrap();
        frame.store_vle("řeřicha útočí").unwrap();
        let long = "x".repeat(500);
        frame.store_vle(&long).unwrap();
        frame.flip();

        assert_eq!(frame.load_vle().unwrap(), "");
        assert_eq!(frame.load_vle().unwrap(), "hello");
        assert_eq!(frame.load_vle().unwrap(), "řeřicha útočí");
        assert_eq!(frame.load_vle().unwrap(), long);
    }

    #[test]
    fn test_vle_long_uses_escape_prefix() {
        let mut frame = Frame::with_capacity(1024);
        frame.store_vle(&"y".repeat(300)).unwrap();
        frame.flip();
        assert_eq!(frame.get8_at(0).unwrap(), 0xFF);
        assert_eq!(frame.length(), 1 + 2 + 300);
    }

    #[test]
    fn test_flip_then_clear_resets_to_write_mode() {
        let mut frame = Frame::with_capacity(32);
        frame.store32(42).unwrap();
        frame.flip();
        assert_eq!(frame.length(), 4);

        frame.clear();
        assert_eq!(frame.position(), 0);
        assert_eq!(frame.length(), frame.capacity());
    }

    #[test]
    fn test_flip_to_explicit_length() {
        let mut frame = Frame::with_capacity(32);
        frame.flip_to(10).unwrap();
        assert_eq!(frame.length(), 10);
        assert_eq!(frame.position(), 0);

        assert!(frame.flip_to(33).is_err());
    }

    #[test]
    fn test_store_past_capacity_fails() {
        let mut frame = Frame::with_capacity(3);
        frame.store16(1).unwrap();
        let err = frame.store16(2).unwrap_err();
        assert!(matches!(
            err,
            TunnelError::Bounds {
                requested: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn test_load_past_length_fails() {
        let mut frame = Frame::with_capacity(16);
        frame.store8(1).unwrap();
        frame.flip();
        frame.load8().unwrap();
        assert!(frame.load8().is_err());
    }

    #[test]
    fn test_store_at_patches_without_moving_cursor() {
        let mut frame = Frame::with_capacity(16);
        frame.advance(4).unwrap();
        frame.store32(0x0102_0304).unwrap();
        let pos = frame.position();
        frame.store32_at(0, 0xAABB_CCDD).unwrap();
        frame.store24_at(1, 0x11_2233).unwrap();
        assert_eq!(frame.position(), pos);
        assert_eq!(frame.get8_at(0).unwrap(), 0xAA);
        assert_eq!(frame.get8_at(1).unwrap(), 0x11);
        assert_eq!(frame.get8_at(3).unwrap(), 0x33);
    }

    #[test]
    fn test_build_spd3_ping_layout() {
        let mut frame = Frame::with_capacity(64);
        frame.build_spd3_ping(0x0000_0007).unwrap();

        assert_eq!(
            frame.readable(),
            &[0x80, 0x03, 0x00, 0x06, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x07]
        );
    }

    #[test]
    fn test_build_spd3_rst_stream_layout() {
        let mut frame = Frame::with_capacity(64);
        frame.build_spd3_rst_stream(5, 2).unwrap();

        let header = ControlHeader::parse(frame.readable()).unwrap();
        assert_eq!(header.version, version::SPD3);
        assert_eq!(header.frame_type, frame_type::RST_STREAM);
        assert_eq!(header.length, 8);

        frame.advance(HEADER_SIZE).unwrap();
        assert_eq!(frame.load32().unwrap(), 5);
        assert_eq!(frame.load32().unwrap(), 2);
    }

    #[test]
    fn test_build_alx1_syn_stream_roundtrip() {
        let request = SynStreamRequest {
            host: "device.gw".to_string(),
            method: "GET".to_string(),
            path: "/v1/status".to_string(),
            headers: vec![("accept".to_string(), "application/json".to_string())],
        };

        let mut frame = Frame::with_capacity(1024);
        frame.build_alx1_syn_stream(&request, 11, true, 3).unwrap();

        let header = ControlHeader::parse(frame.readable()).unwrap();
        assert_eq!(header.version, version::ALX1);
        assert_eq!(header.frame_type, frame_type::SYN_STREAM);
        assert!(header.is_fin());
        assert_eq!(header.length as usize, frame.length() - HEADER_SIZE);

        frame.advance(HEADER_SIZE).unwrap();
        assert_eq!(frame.load32().unwrap(), 11);
        assert_eq!(frame.load8().unwrap(), 3);
        assert_eq!(frame.load_vle().unwrap(), "device.gw");
        assert_eq!(frame.load_vle().unwrap(), "GET");
        assert_eq!(frame.load_vle().unwrap(), "/v1/status");
        assert_eq!(frame.load16().unwrap(), 1);
        assert_eq!(frame.load_vle().unwrap(), "accept");
        assert_eq!(frame.load_vle().unwrap(), "application/json");
        assert_eq!(frame.remaining(), 0);
    }

    #[test]
    fn test_build_data_frame() {
        let mut frame = Frame::with_capacity(64);
        frame.build_data_frame(9, flags::FIN, b"chunk").unwrap();

        let header = DataHeader::parse(frame.readable()).unwrap();
        assert_eq!(header.stream_id, 9);
        assert!(header.is_fin());
        assert_eq!(header.length, 5);
        assert_eq!(&frame.readable()[HEADER_SIZE..], b"chunk");
    }
}
