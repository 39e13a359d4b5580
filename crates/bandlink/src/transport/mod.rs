//! Transport boundary
//!
//! The radio stack (discovery, pairing, GATT plumbing, MTU negotiation) is a
//! platform concern. The engine only ever sees a connected byte pipe: send a
//! buffer, subscribe to arriving buffers, and a known MTU. Any fragmentation
//! the physical link needs happens below this seam.

mod error;
pub mod mock;

pub use error::TransportError;
pub use mock::MockBand;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

/// A connected byte pipe to one device.
///
/// Inbound buffers are distributed over a broadcast channel; the channel
/// closing is the transport's signal that the link is gone.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one buffer to the device.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to buffers arriving from the device.
    fn subscribe(&self) -> broadcast::Receiver<Bytes>;

    /// Largest single buffer the pipe will carry.
    fn mtu(&self) -> usize;

    async fn is_connected(&self) -> bool;

    /// Tear the link down; subscribers observe the channel closing.
    async fn disconnect(&self) -> Result<(), TransportError>;
}
