//! Engine configuration
//!
//! Engine-wide defaults for timeouts, retries and the handshake identity.
//! Everything is overridable per request; these are the values used when a
//! request does not say otherwise.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one device session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-request response timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retries after the first attempt before an exchange fails with
    /// `Timeout`. Retransmissions reuse the original sequence number.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Bytes requested per bulk-transfer chunk.
    #[serde(default = "default_chunk_len")]
    pub chunk_len: u32,

    /// Chunks buffered between the transfer driver and a slow consumer.
    #[serde(default = "default_transfer_buffer")]
    pub transfer_buffer: usize,

    /// Acknowledge inbound response frames with a success ACK, as the
    /// vendor application does. Off by default: the band answers without
    /// them and they double the outbound traffic.
    #[serde(default)]
    pub auto_ack: bool,

    /// Stamp outgoing headers with wall-clock centiseconds instead of zero.
    #[serde(default)]
    pub use_timestamp: bool,

    /// Host identifier sent in the session-start handshake.
    #[serde(default = "default_host_id")]
    pub host_id: u32,

    /// Host version string sent in the session-start handshake. The band
    /// expects a fixed-width field, NUL-padded.
    #[serde(default = "default_host_version")]
    pub host_version: String,

    /// Session mode: 0 for normal operation, 2 for diagnostics.
    #[serde(default)]
    pub session_mode: u8,
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_retry_budget() -> u32 {
    2
}

fn default_chunk_len() -> u32 {
    1024
}

fn default_transfer_buffer() -> usize {
    8
}

fn default_host_id() -> u32 {
    0x1234
}

fn default_host_version() -> String {
    let mut version = String::from("9");
    version.extend(std::iter::repeat('\0').take(13));
    version
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            retry_budget: default_retry_budget(),
            chunk_len: default_chunk_len(),
            transfer_buffer: default_transfer_buffer(),
            auto_ack: false,
            use_timestamp: false,
            host_id: default_host_id(),
            host_version: default_host_version(),
            session_mode: 0,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML; missing fields take their defaults.
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_millis(5000));
        assert_eq!(config.retry_budget, 2);
        assert!(!config.auto_ack);
        assert_eq!(config.host_version.len(), 14);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            request_timeout_ms = 250
            host_id = 0xCAFE
            "#,
        )
        .unwrap();
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.host_id, 0xCAFE);
        assert_eq!(config.retry_budget, 2);
        assert_eq!(config.chunk_len, 1024);
    }
}
