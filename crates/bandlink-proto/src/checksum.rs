//! Pluggable frame checksum
//!
//! The band's firmware checksums every frame over the full header+payload
//! with the checksum field zeroed. Captured traffic matches CRC-16/CCITT-FALSE
//! exactly, but the algorithm is kept behind a trait so a different device
//! revision can swap it without touching the codec.

use crc::{Crc, CRC_16_IBM_3740};

/// Checksum over a complete frame buffer (checksum field zeroed).
pub trait FrameChecksum: Send + Sync {
    fn compute(&self, buf: &[u8]) -> u16;
}

/// CRC-16/CCITT-FALSE, the algorithm observed on the wire.
///
/// `CRC_16_IBM_3740` is the crc crate's name for the same parameters
/// (poly 0x1021, init 0xFFFF, no reflection, xorout 0).
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc16;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

impl FrameChecksum for Crc16 {
    fn compute(&self, buf: &[u8]) -> u16 {
        CRC16.checksum(buf)
    }
}
