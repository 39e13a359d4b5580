//! Frame header and decoded frame types
//!
//! The header is little-endian while most payload fields are big-endian;
//! that split is what the firmware does and is preserved here verbatim.

use bytes::{BufMut, Bytes, BytesMut};

use crate::command::Command;
use crate::error::CodecError;

/// Fixed header size, included in the header's declared `length`.
pub const HEADER_LEN: usize = 24;

/// Magic at the start of every frame.
pub const MAGIC: u16 = 0xBBBB;

/// The fields of a frame header.
///
/// `length` counts the header plus payload. `response` carries extra data on
/// some inbound frames (e.g. the pairing flag); it is zero on requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub command: Command,
    pub timestamp: u64,
    pub seqno: u32,
    pub length: u16,
    pub response: u32,
    pub crc: u16,
}

impl Header {
    /// Parse a header from the first [`HEADER_LEN`] bytes of `buf`.
    ///
    /// Validates the magic only; checksum validation needs the whole frame
    /// and lives in [`crate::codec::FrameCodec::decode`].
    pub fn parse(buf: &[u8]) -> Result<Header, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                declared: HEADER_LEN,
                got: buf.len(),
            });
        }

        let magic = u16::from_le_bytes([buf[0], buf[1]]);
        if magic != MAGIC {
            return Err(CodecError::InvalidMagic { found: magic });
        }

        Ok(Header {
            command: Command(u16::from_le_bytes([buf[2], buf[3]])),
            timestamp: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            seqno: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            length: u16::from_le_bytes(buf[16..18].try_into().unwrap()),
            response: u32::from_le_bytes(buf[18..22].try_into().unwrap()),
            crc: u16::from_le_bytes(buf[22..24].try_into().unwrap()),
        })
    }

    /// Serialize the header into `buf` with the stored `crc` value.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16_le(MAGIC);
        buf.put_u16_le(self.command.0);
        buf.put_u64_le(self.timestamp);
        buf.put_u32_le(self.seqno);
        buf.put_u16_le(self.length);
        buf.put_u32_le(self.response);
        buf.put_u16_le(self.crc);
    }
}

/// One structurally valid protocol unit, as recovered from the wire or
/// about to be placed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub payload: Bytes,
}

impl Frame {
    pub fn command(&self) -> Command {
        self.header.command
    }

    pub fn seqno(&self) -> u32 {
        self.header.seqno
    }

    /// Total encoded size of this frame.
    pub fn len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_bad_magic() {
        let buf = hex::decode("badb2a000000000000000000000000001800000000006444").unwrap();
        assert_eq!(
            Header::parse(&buf),
            Err(CodecError::InvalidMagic { found: 0xDBBA })
        );
    }

    #[test]
    fn parse_reads_all_fields() {
        // Captured identity request: command 0x2A, seqno 0, 24-byte frame.
        let buf = hex::decode("bbbb2a000000000000000000000000001800000000006444").unwrap();
        let header = Header::parse(&buf).unwrap();
        assert_eq!(header.command, Command::IS_DEVICE_PAIRED);
        assert_eq!(header.timestamp, 0);
        assert_eq!(header.seqno, 0);
        assert_eq!(header.length, 0x18);
        assert_eq!(header.response, 0);
        assert_eq!(header.crc, 0x4464);
    }

    #[test]
    fn parse_requires_full_header() {
        let buf = hex::decode("bbbb2a0000").unwrap();
        assert!(matches!(
            Header::parse(&buf),
            Err(CodecError::Truncated { got: 5, .. })
        ));
    }
}
