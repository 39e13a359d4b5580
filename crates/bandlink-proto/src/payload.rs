//! Typed payload codecs
//!
//! Payload integer fields are big-endian, unlike the little-endian header.
//! The one exception is the log-fetch range, which the firmware reads
//! little-endian; that quirk is preserved as captured.

use bytes::{BufMut, Bytes, BytesMut};

use crate::command::Command;
use crate::error::CodecError;

/// ACK/NAK payload: the command being acknowledged, a status byte
/// (zero on success) and a reserved word that is always zero in captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub orig_command: Command,
    pub status: u8,
}

impl Ack {
    pub fn new(orig_command: Command, status: u8) -> Self {
        Self {
            orig_command,
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u16(self.orig_command.0);
        buf.put_u8(self.status);
        buf.put_u16(0);
        buf.freeze()
    }

    pub fn parse(payload: &[u8]) -> Result<Ack, CodecError> {
        if payload.len() < 3 {
            return Err(CodecError::Malformed("ack"));
        }
        Ok(Ack {
            orig_command: Command(u16::from_be_bytes([payload[0], payload[1]])),
            status: payload[2],
        })
    }
}

/// Session-start payload: host identifier, session mode (0 for normal
/// operation, 2 for diagnostics) and a NUL-terminated host version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub host_id: u32,
    pub mode: u8,
    pub version: String,
}

impl SessionStart {
    pub fn new(host_id: u32, mode: u8, version: impl Into<String>) -> Self {
        Self {
            host_id,
            mode,
            version: version.into(),
        }
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6 + self.version.len());
        buf.put_u32(self.host_id);
        buf.put_u8(self.mode);
        // Latin-1 style: every char in 0..=255 is one byte on the wire.
        buf.extend(self.version.chars().map(|c| c as u8));
        buf.put_u8(0);
        buf.freeze()
    }

    pub fn parse(payload: &[u8]) -> Result<SessionStart, CodecError> {
        if payload.len() < 6 {
            return Err(CodecError::Malformed("session start"));
        }
        let host_id = u32::from_be_bytes(payload[..4].try_into().unwrap());
        let mode = payload[4];
        let version = payload[5..payload.len() - 1]
            .iter()
            .map(|&b| b as char)
            .collect();
        Ok(SessionStart {
            host_id,
            mode,
            version,
        })
    }
}

/// Byte range of a log-fetch request. Little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRange {
    pub offset: u32,
    pub length: u32,
}

impl LogRange {
    pub fn new(offset: u32, length: u32) -> Self {
        Self { offset, length }
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u32_le(self.offset);
        buf.put_u32_le(self.length);
        buf.freeze()
    }

    pub fn parse(payload: &[u8]) -> Result<LogRange, CodecError> {
        if payload.len() < 8 {
            return Err(CodecError::Malformed("log range"));
        }
        Ok(LogRange {
            offset: u32::from_le_bytes(payload[..4].try_into().unwrap()),
            length: u32::from_le_bytes(payload[4..8].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use pretty_assertions::assert_eq;

    #[test]
    fn nak_frame_matches_capture() {
        let codec = FrameCodec::new(4096);
        let ack = Ack::new(Command(0xF00F), 0xCD);
        let frame = codec
            .encode(Command::ACK, 0xFFFF_FFAB, &ack.to_payload())
            .unwrap();
        assert_eq!(
            hex::encode(&frame),
            "bbbb00000000000000000000abffffff1d00000000004165f00fcd0000"
        );
        assert!(!ack.is_success());
    }

    #[test]
    fn success_ack_frame_matches_capture() {
        let codec = FrameCodec::new(4096);
        let ack = Ack::new(Command::IS_DEVICE_PAIRED, 0);
        let frame = codec.encode(Command::ACK, 0x11, &ack.to_payload()).unwrap();
        assert_eq!(
            hex::encode(&frame),
            "bbbb00000000000000000000110000001d0000000000fb17002a000000"
        );
        assert!(ack.is_success());
    }

    #[test]
    fn ack_round_trip() {
        let ack = Ack::new(Command::SESSION_START, 7);
        let parsed = Ack::parse(&ack.to_payload()).unwrap();
        assert_eq!(parsed, ack);
    }

    #[test]
    fn session_start_frame_matches_capture() {
        let codec = FrameCodec::new(4096);
        let start = SessionStart::new(0x1928_3746, 1, "4.2.0.69\0\0\0\0\0\0");
        let frame = codec
            .encode_at(Command::SESSION_START, 0x1234, 0x9ABC, &start.to_payload())
            .unwrap();
        assert_eq!(
            hex::encode(&frame),
            "bbbb0100bc9a000000000000341200002c0000000000ecd01928374601342e322e302e363900000000000000"
        );
    }

    #[test]
    fn session_start_round_trip() {
        let start = SessionStart::new(0xDEAD_BEEF, 2, "9\0\0\0\0\0\0\0\0\0\0\0\0\0");
        let parsed = SessionStart::parse(&start.to_payload()).unwrap();
        assert_eq!(parsed, start);
    }

    #[test]
    fn log_fetch_frame_matches_capture() {
        let codec = FrameCodec::new(4096);
        let range = LogRange::new(99, 2048);
        let frame = codec
            .encode(Command::GET_LOG_FILE, 0x1234, &range.to_payload())
            .unwrap();
        assert_eq!(
            hex::encode(&frame),
            "bbbb440000000000000000003412000020000000000014ce6300000000080000"
        );
    }

    #[test]
    fn short_payloads_are_malformed() {
        assert_eq!(Ack::parse(&[0x00]), Err(CodecError::Malformed("ack")));
        assert_eq!(
            SessionStart::parse(&[1, 2, 3]),
            Err(CodecError::Malformed("session start"))
        );
        assert_eq!(
            LogRange::parse(&[0; 7]),
            Err(CodecError::Malformed("log range"))
        );
    }
}
