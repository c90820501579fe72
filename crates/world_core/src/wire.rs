//! Binary wire framing shared with the game client.
//!
//! Every packet on the socket has the shape
//!
//! ```text
//! AA 55 | len (2) | opcode (1) | payload ... | 55 AA
//! ```
//!
//! where `len` counts the opcode and payload bytes. Numeric fields do not
//! share one byte order: each call site picks big or little endian through
//! the `reverse` flag of [`int_to_bytes`], and that choice is part of the
//! client contract.

use crate::error::WorldError;

/// Frame header magic.
pub const HEADER: [u8; 2] = [0xAA, 0x55];
/// Frame trailer magic.
pub const TRAILER: [u8; 2] = [0x55, 0xAA];
/// Header + length + trailer.
pub const FRAME_OVERHEAD: usize = 6;

/// Encodes `value` into `width` bytes.
///
/// Bytes are produced big endian; `reverse` flips them, giving little endian.
/// Values wider than `width` are truncated to their low-order bytes.
pub fn int_to_bytes(value: u64, width: usize, reverse: bool) -> Vec<u8> {
    let full = value.to_be_bytes();
    let width = width.min(full.len());
    let mut out = full[full.len() - width..].to_vec();
    if reverse {
        out.reverse();
    }
    out
}

/// Inverse of [`int_to_bytes`].
pub fn bytes_to_int(bytes: &[u8], reverse: bool) -> u64 {
    let mut value = 0u64;
    if reverse {
        for b in bytes.iter().rev() {
            value = (value << 8) | *b as u64;
        }
    } else {
        for b in bytes {
            value = (value << 8) | *b as u64;
        }
    }
    value
}

/// Incrementally builds one framed packet.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    opcode: u8,
    payload: Vec<u8>,
    length_reverse: bool,
}

impl PacketBuilder {
    /// Starts a packet with a little-endian length field.
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            payload: Vec::with_capacity(32),
            length_reverse: true,
        }
    }

    /// Writes the length field big endian instead.
    pub fn big_endian_length(mut self) -> Self {
        self.length_reverse = false;
        self
    }

    pub fn put_int(&mut self, value: u64, width: usize, reverse: bool) -> &mut Self {
        self.payload.extend_from_slice(&int_to_bytes(value, width, reverse));
        self
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.payload.push(value);
        self
    }

    /// Writes an `f32`, little endian.
    pub fn put_f32(&mut self, value: f32) -> &mut Self {
        self.payload.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Writes a one-byte length prefix followed by UTF-8 bytes (at most 255).
    pub fn put_str(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let len = bytes.len().min(u8::MAX as usize);
        self.payload.push(len as u8);
        self.payload.extend_from_slice(&bytes[..len]);
        self
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    /// Produces the framed packet.
    pub fn finish(&self) -> Vec<u8> {
        let length = (self.payload.len() + 1) as u64;
        let mut out = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD + 1);
        out.extend_from_slice(&HEADER);
        out.extend_from_slice(&int_to_bytes(length, 2, self.length_reverse));
        out.push(self.opcode);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&TRAILER);
        out
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// Attempts to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, and the number of bytes
/// consumed alongside the frame otherwise. Inbound length fields are little
/// endian.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, WorldError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    if buf[..2] != HEADER {
        return Err(WorldError::Malformed(format!(
            "bad header {:02X} {:02X}",
            buf[0], buf[1]
        )));
    }
    let length = bytes_to_int(&buf[2..4], true) as usize;
    if length == 0 {
        return Err(WorldError::Malformed("zero length frame".to_string()));
    }
    let total = length + FRAME_OVERHEAD;
    if buf.len() < total {
        return Ok(None);
    }
    if buf[total - 2..total] != TRAILER {
        return Err(WorldError::Malformed("bad trailer".to_string()));
    }
    let frame = Frame {
        opcode: buf[4],
        payload: buf[5..4 + length].to_vec(),
    };
    Ok(Some((frame, total)))
}

/// Cursor over a frame payload.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WorldError> {
        if self.pos + n > self.data.len() {
            return Err(WorldError::Malformed(format!(
                "wanted {} bytes at offset {}, payload is {}",
                n,
                self.pos,
                self.data.len()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_int(&mut self, width: usize, reverse: bool) -> Result<u64, WorldError> {
        Ok(bytes_to_int(self.take(width)?, reverse))
    }

    pub fn read_u8(&mut self) -> Result<u8, WorldError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_f32(&mut self) -> Result<f32, WorldError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a one-byte length prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<String, WorldError> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| WorldError::Malformed(format!("string field: {}", e)))
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_to_bytes_respects_reverse_flag() {
        assert_eq!(int_to_bytes(0x1234, 2, false), vec![0x12, 0x34]);
        assert_eq!(int_to_bytes(0x1234, 2, true), vec![0x34, 0x12]);
        assert_eq!(int_to_bytes(0x0102_0304, 4, true), vec![4, 3, 2, 1]);
        assert_eq!(int_to_bytes(0x1_0000_00FF, 1, false), vec![0xFF]);
    }

    #[test]
    fn builder_frames_packet() {
        let mut builder = PacketBuilder::new(0x31);
        builder.put_int(7, 2, true).put_u8(9);
        let bytes = builder.finish();
        assert_eq!(bytes, vec![0xAA, 0x55, 0x04, 0x00, 0x31, 0x07, 0x00, 0x09, 0x55, 0xAA]);

        let (frame, used) = decode_frame(&bytes).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(frame.opcode, 0x31);
        assert_eq!(frame.payload, vec![0x07, 0x00, 0x09]);
    }

    #[test]
    fn big_endian_length_flips_only_the_length() {
        let mut builder = PacketBuilder::new(0x40).big_endian_length();
        builder.put_int(1, 2, true);
        assert_eq!(builder.finish()[2..5], [0x00, 0x03, 0x40]);
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let bytes = PacketBuilder::new(0x02).finish();
        assert!(decode_frame(&bytes[..3]).unwrap().is_none());
        assert!(decode_frame(&bytes[..bytes.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_bad_magic() {
        assert!(decode_frame(&[0x00, 0x55, 0x01, 0x00, 0x01, 0x55, 0xAA]).is_err());
        assert!(decode_frame(&[0xAA, 0x55, 0x01, 0x00, 0x01, 0x00, 0x00]).is_err());
    }

    #[test]
    fn reader_reports_short_payload() {
        let mut reader = PacketReader::new(&[1, 2]);
        assert_eq!(reader.read_int(2, true).unwrap(), 0x0201);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn reader_reads_strings() {
        let mut builder = PacketBuilder::new(0x01);
        builder.put_str("Mira").put_u8(3);
        let bytes = builder.finish();
        let (frame, _) = decode_frame(&bytes).unwrap().unwrap();
        let mut reader = PacketReader::new(&frame.payload);
        assert_eq!(reader.read_str().unwrap(), "Mira");
        assert_eq!(reader.read_u8().unwrap(), 3);
        assert_eq!(reader.remaining(), 0);
    }
}
