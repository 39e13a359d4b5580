//! Traffic logger
//!
//! Optional hex mirror of every buffer crossing the transport, for offline
//! protocol analysis. Purely observational: a logging failure is reported
//! through tracing and the exchange proceeds untouched.

use std::io::Write;

use parking_lot::Mutex;
use tracing::warn;

/// Sink for the traffic mirror. The caller keeps responsibility for the
/// sink's lifetime; `detach` hands it back for flushing/closing.
pub type TrafficSink = Box<dyn Write + Send>;

/// Mirrors transmitted (`>>`) and received (`<<`) bytes as one hex line per
/// buffer. The internal lock keeps lines whole and in send/receive order.
#[derive(Default)]
pub struct TrafficLog {
    sink: Mutex<Option<TrafficSink>>,
}

impl TrafficLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a sink, returning the previously attached one, if any.
    pub fn attach(&self, sink: TrafficSink) -> Option<TrafficSink> {
        self.sink.lock().replace(sink)
    }

    /// Remove and return the attached sink.
    pub fn detach(&self) -> Option<TrafficSink> {
        self.sink.lock().take()
    }

    pub fn is_attached(&self) -> bool {
        self.sink.lock().is_some()
    }

    pub(crate) fn log_tx(&self, bytes: &[u8]) {
        self.write_line(">>", bytes);
    }

    pub(crate) fn log_rx(&self, bytes: &[u8]) {
        self.write_line("<<", bytes);
    }

    fn write_line(&self, direction: &str, bytes: &[u8]) {
        let mut guard = self.sink.lock();
        if let Some(sink) = guard.as_mut() {
            if let Err(err) = writeln!(sink, "{} {}", direction, hex::encode(bytes)) {
                warn!(%err, direction, "traffic log write failed");
            }
        }
    }
}
