//! Frame encode/decode
//!
//! Both directions are pure: encoding never touches a transport and decoding
//! never interprets command codes. Retry policy and command dispatch live one
//! layer up, in the engine.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::checksum::{Crc16, FrameChecksum};
use crate::command::Command;
use crate::error::CodecError;
use crate::frame::{Frame, Header, HEADER_LEN};

/// Encodes requests into wire frames and validates arriving frames.
#[derive(Clone)]
pub struct FrameCodec {
    mtu: usize,
    checksum: Arc<dyn FrameChecksum>,
}

impl FrameCodec {
    /// Codec bounded by the transport's negotiated MTU, with the default
    /// CRC-16 checksum.
    pub fn new(mtu: usize) -> Self {
        Self::with_checksum(mtu, Arc::new(Crc16))
    }

    /// Codec with a custom checksum algorithm.
    pub fn with_checksum(mtu: usize, checksum: Arc<dyn FrameChecksum>) -> Self {
        Self { mtu, checksum }
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Largest payload a single frame can carry. The `length` header field
    /// is 16 bits, so the bound is the MTU or the field's range, whichever
    /// is tighter.
    pub fn max_payload(&self) -> usize {
        self.mtu
            .min(u16::MAX as usize)
            .saturating_sub(HEADER_LEN)
    }

    /// Encode a request frame with a zero timestamp.
    pub fn encode(
        &self,
        command: Command,
        seqno: u32,
        payload: &[u8],
    ) -> Result<Bytes, CodecError> {
        self.encode_full(command, seqno, 0, 0, payload)
    }

    /// Encode a frame with an explicit header timestamp.
    pub fn encode_at(
        &self,
        command: Command,
        seqno: u32,
        timestamp: u64,
        payload: &[u8],
    ) -> Result<Bytes, CodecError> {
        self.encode_full(command, seqno, timestamp, 0, payload)
    }

    /// Encode a response frame carrying data in the header `response` word,
    /// the way the band reports e.g. its pairing flag.
    pub fn encode_response(
        &self,
        command: Command,
        seqno: u32,
        response: u32,
        payload: &[u8],
    ) -> Result<Bytes, CodecError> {
        self.encode_full(command, seqno, 0, response, payload)
    }

    fn encode_full(
        &self,
        command: Command,
        seqno: u32,
        timestamp: u64,
        response: u32,
        payload: &[u8],
    ) -> Result<Bytes, CodecError> {
        let max = self.max_payload();
        if payload.len() > max {
            return Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }

        let header = Header {
            command,
            timestamp,
            seqno,
            length: (HEADER_LEN + payload.len()) as u16,
            response,
            crc: 0,
        };

        let mut buf = BytesMut::with_capacity(header.length as usize);
        header.write_to(&mut buf);
        buf.extend_from_slice(payload);

        // Checksum covers the whole frame with the CRC field zeroed.
        let crc = self.checksum.compute(&buf);
        buf[22..24].copy_from_slice(&crc.to_le_bytes());

        Ok(buf.freeze())
    }

    /// Peek the declared frame length from a buffer holding at least a full
    /// header. Does not validate the checksum; the frame may still be
    /// arriving.
    pub fn peek_len(buf: &[u8]) -> Result<usize, CodecError> {
        let header = Header::parse(buf)?;
        Ok(header.length as usize)
    }

    /// Decode and validate one complete frame.
    pub fn decode(&self, buf: &[u8]) -> Result<Frame, CodecError> {
        let header = Header::parse(buf)?;
        let declared = header.length as usize;

        if declared > buf.len() {
            return Err(CodecError::Truncated {
                declared,
                got: buf.len(),
            });
        }

        // A declared length below the header size cannot be valid; checksum
        // the header span so the corruption surfaces as a CRC fault.
        let span = declared.max(HEADER_LEN);

        let mut scratch = buf[..span].to_vec();
        scratch[22..24].fill(0);
        let computed = self.checksum.compute(&scratch);

        if computed != header.crc {
            return Err(CodecError::ChecksumMismatch {
                declared: header.crc,
                computed,
            });
        }

        let payload = Bytes::copy_from_slice(&buf[HEADER_LEN..span]);
        Ok(Frame { header, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn codec() -> FrameCodec {
        FrameCodec::new(4096)
    }

    #[test]
    fn encode_matches_captured_identity_request() {
        let frame = codec().encode(Command::IS_DEVICE_PAIRED, 0, &[]).unwrap();
        assert_eq!(
            hex::encode(&frame),
            "bbbb2a000000000000000000000000001800000000006444"
        );
    }

    #[test]
    fn encode_matches_captured_config_request() {
        let frame = codec().encode(Command::GET_CONFIG, 0x1234, &[]).unwrap();
        assert_eq!(
            hex::encode(&frame),
            "bbbb030000000000000000003412000018000000000018bc"
        );
    }

    #[test]
    fn encode_matches_captured_stored_data_request() {
        let frame = codec()
            .encode(Command::SEND_STORED_DATA, 0x1234, &[])
            .unwrap();
        assert_eq!(
            hex::encode(&frame),
            "bbbb100000000000000000003412000018000000000036b7"
        );
    }

    #[test]
    fn round_trip_preserves_command_seqno_payload() {
        let codec = codec();
        let payload = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x7F];
        let encoded = codec
            .encode_at(Command::LEDS_CONTROL, 0x1234_5678, 42, &payload)
            .unwrap();
        let frame = codec.decode(&encoded).unwrap();

        assert_eq!(frame.command(), Command::LEDS_CONTROL);
        assert_eq!(frame.seqno(), 0x1234_5678);
        assert_eq!(frame.header.timestamp, 42);
        assert_eq!(&frame.payload[..], &payload);
        assert_eq!(frame.len(), encoded.len());
    }

    #[test]
    fn round_trip_empty_and_max_payloads() {
        let codec = FrameCodec::new(64);

        let empty = codec.encode(Command::GET_CONFIG, 1, &[]).unwrap();
        assert!(codec.decode(&empty).unwrap().payload.is_empty());

        let max = vec![0xA5; codec.max_payload()];
        let encoded = codec.encode(Command::GET_CONFIG, 2, &max).unwrap();
        assert_eq!(&codec.decode(&encoded).unwrap().payload[..], &max[..]);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let codec = FrameCodec::new(64);
        let payload = vec![0u8; codec.max_payload() + 1];
        assert_eq!(
            codec.encode(Command::GET_CONFIG, 1, &payload),
            Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                max: codec.max_payload(),
            })
        );
    }

    #[test]
    fn every_strict_prefix_is_truncated() {
        let codec = codec();
        let encoded = codec
            .encode(Command::GET_TECHNICAL_STATUS, 7, &[1, 2, 3, 4])
            .unwrap();

        for cut in 0..encoded.len() {
            let err = codec.decode(&encoded[..cut]).unwrap_err();
            assert!(
                matches!(err, CodecError::Truncated { .. }),
                "prefix of {cut} bytes gave {err:?}"
            );
        }
    }

    #[test]
    fn single_byte_corruption_is_detected() {
        let codec = codec();
        let encoded = codec
            .encode(Command::GET_CONFIG, 9, &[0x10, 0x20, 0x30])
            .unwrap();

        for i in 0..encoded.len() {
            let mut corrupt = encoded.to_vec();
            corrupt[i] ^= 0x40;

            let err = codec.decode(&corrupt).unwrap_err();
            match i {
                // Magic bytes fail structurally before the checksum runs.
                0 | 1 => assert!(matches!(err, CodecError::InvalidMagic { .. })),
                // An upward flip of the length field reads as a frame that
                // has not fully arrived; anything else is a CRC fault.
                16 | 17 => assert!(matches!(
                    err,
                    CodecError::ChecksumMismatch { .. } | CodecError::Truncated { .. }
                )),
                _ => assert!(
                    matches!(err, CodecError::ChecksumMismatch { .. }),
                    "byte {i} gave {err:?}"
                ),
            }
        }
    }

    #[test]
    fn checksum_algorithm_is_swappable() {
        // A stand-in for a firmware revision with a different checksum.
        struct XorSum;

        impl crate::checksum::FrameChecksum for XorSum {
            fn compute(&self, buf: &[u8]) -> u16 {
                buf.iter().fold(0u16, |acc, &b| acc ^ (u16::from(b) << (b & 1)))
            }
        }

        let xor_codec = FrameCodec::with_checksum(4096, Arc::new(XorSum));
        let encoded = xor_codec
            .encode(Command::GET_CONFIG, 4, &[0xAA, 0xBB])
            .unwrap();
        assert_eq!(xor_codec.decode(&encoded).unwrap().seqno(), 4);

        // The same bytes do not validate under the default CRC.
        assert!(matches!(
            codec().decode(&encoded),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn peek_len_ignores_checksum() {
        let codec = codec();
        let mut encoded = codec.encode(Command::GET_CONFIG, 3, &[0xAA]).unwrap().to_vec();
        encoded[22] ^= 0xFF; // clobber the CRC
        assert_eq!(FrameCodec::peek_len(&encoded).unwrap(), encoded.len());
    }
}
