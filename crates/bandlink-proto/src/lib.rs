//! bandlink-proto - wire framing for the band protocol
//!
//! This crate contains the pure wire layer: the 24-byte frame header, the
//! pluggable frame checksum, the command table, typed payload codecs and a
//! streaming reassembler that recovers whole frames from the fragment-sized
//! buffers the transport delivers.
//!
//! Nothing in here is async and nothing talks to a device; the engine crate
//! (`bandlink`) builds the session, retry and transfer machinery on top of
//! this seam.

pub mod checksum;
pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod payload;
pub mod reassembly;

pub use checksum::{Crc16, FrameChecksum};
pub use codec::FrameCodec;
pub use command::Command;
pub use error::CodecError;
pub use frame::{Frame, Header, HEADER_LEN, MAGIC};
pub use payload::{Ack, LogRange, SessionStart};
pub use reassembly::Reassembler;
