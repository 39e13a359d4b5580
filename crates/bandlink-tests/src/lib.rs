//! Integration tests for the band protocol engine
//!
//! These tests drive the full stack (device facade, request engine, frame
//! codec) against the in-process [`MockBand`](bandlink::MockBand), which
//! plays the device side of the protocol and can be scripted to drop
//! responses, reject commands, go silent or lose the link.
//!
//! # Test structure
//!
//! - `session_test.rs` - handshake, state enforcement, link loss
//! - `engine_test.rs` - exchanges, retries, ordering, cancellation
//! - `transfer_test.rs` - chunked downloads and partial failures
//! - `traffic_log_test.rs` - hex traffic mirror fidelity

use std::io;
use std::sync::{Arc, Once};

use parking_lot::Mutex;

/// Install a `RUST_LOG`-driven subscriber once per test process, so a
/// failing scenario can be rerun with engine tracing visible.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A cloneable in-memory sink for traffic-log assertions.
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().clone()).expect("traffic log is ASCII")
    }

    /// Non-empty lines captured so far.
    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl io::Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
