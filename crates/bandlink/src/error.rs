//! Protocol engine errors

use thiserror::Error;

use bandlink_proto::{CodecError, Command};

use crate::session::SessionState;
use crate::transport::TransportError;

/// Terminal failures surfaced to callers of the engine.
///
/// Structural framing faults ([`CodecError`]) are never retried at the codec
/// level; the engine retries the whole exchange instead. A device-reported
/// rejection ([`ProtocolError::Device`]) is never retried at all; repeating
/// an explicit refusal is unlikely to change the answer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("{command} not permitted in {state} state")]
    InvalidState {
        state: SessionState,
        command: Command,
    },

    #[error("no response after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("device rejected request with status 0x{code:02X}")]
    Device { code: u8 },

    #[error("connection lost")]
    ConnectionLost,

    #[error("transfer aborted after {received} bytes")]
    TransferAborted { received: u64 },
}
