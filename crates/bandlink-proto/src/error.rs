//! Frame codec errors

use thiserror::Error;

/// Structural framing faults.
///
/// These are always local to a single buffer and are never retried at this
/// layer; the request engine retries a whole exchange if anything at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid frame magic 0x{found:04X}")]
    InvalidMagic { found: u16 },

    #[error("truncated frame: declared {declared} bytes, got {got}")]
    Truncated { declared: usize, got: usize },

    #[error("checksum mismatch: frame says 0x{declared:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch { declared: u16, computed: u16 },

    #[error("payload of {len} bytes exceeds {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("malformed {0} payload")]
    Malformed(&'static str),
}
