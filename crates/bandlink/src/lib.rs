//! bandlink - protocol engine for a wearable sleep-monitor band
//!
//! The band speaks a framed request/response protocol over a short-range
//! radio link. This crate is the host-side engine for that protocol; the
//! radio itself stays behind the [`Transport`] trait as a connected byte
//! pipe.
//!
//! # Architecture
//!
//! ```text
//! caller ──> Device ──> RequestEngine ──> FrameCodec ──> Transport
//!              │             │                              │
//!              │        SessionTracker          inbound buffers
//!              │             │                              │
//!              └─ Transfer <─┴───────── receive pump <──────┘
//!                        (TrafficLog tees both directions)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bandlink::{Device, EngineConfig, MockBand};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bandlink::ProtocolError> {
//!     let band = Arc::new(MockBand::new());
//!     let device = Device::open(band, EngineConfig::default()).await?;
//!     device.handshake().await?;
//!
//!     let status = device.technical_status().await?;
//!     println!("status: {:02x?}", &status.payload[..]);
//!
//!     let mut transfer = device.download_log(0, Some(4096))?;
//!     while let Some(chunk) = transfer.next_chunk().await {
//!         let chunk = chunk?;
//!         // append to storage
//!     }
//!     device.close().await
//! }
//! ```

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod logger;
pub mod session;
pub mod transfer;
pub mod transport;

pub use config::EngineConfig;
pub use device::Device;
pub use engine::{Request, Response};
pub use error::ProtocolError;
pub use logger::{TrafficLog, TrafficSink};
pub use session::SessionState;
pub use transfer::{CompletionSignal, Transfer, TransferPlan};
pub use transport::{MockBand, Transport, TransportError};

// Re-export the wire layer for callers that work with raw frames.
pub use bandlink_proto as proto;
pub use bandlink_proto::{CodecError, Command};
