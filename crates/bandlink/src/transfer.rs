//! Bulk transfer manager
//!
//! Drives a chunked download as a loop of ordinary request/response
//! exchanges: ask for the next range, stream the returned chunk to the
//! consumer, stop on the configured completion signal. Chunks are delivered
//! through a bounded channel so a caller can write to storage while the
//! tail of the recording is still on the air.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use bandlink_proto::{Command, LogRange};

use crate::engine::{Request, RequestEngine};
use crate::error::ProtocolError;

/// How a transfer recognizes the end of the stream. Device-specific, so it
/// is part of the plan rather than hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// The total size is known up front; no request is issued past it.
    TotalSize(u64),
    /// Unbounded until the device answers a range with an empty chunk.
    Terminator,
}

/// Description of one chunked download.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    /// Chunk request command; its payload is the requested byte range.
    pub command: Command,
    /// Command of the chunk-carrying response.
    pub response: Command,
    /// Device-side offset to start from.
    pub offset: u32,
    /// Bytes per chunk request; engine default when `None`.
    pub chunk_len: Option<u32>,
    pub completion: CompletionSignal,
    /// Per-chunk overrides of the engine's timeout/retry defaults.
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl TransferPlan {
    /// Ranged read of the device log file.
    pub fn log_file(offset: u32, total: Option<u64>) -> Self {
        Self {
            command: Command::GET_LOG_FILE,
            response: Command::LOG_FILE_RESP,
            offset,
            chunk_len: None,
            completion: match total {
                Some(total) => CompletionSignal::TotalSize(total),
                None => CompletionSignal::Terminator,
            },
            timeout: None,
            retries: None,
        }
    }

    pub fn chunk_len(mut self, chunk_len: u32) -> Self {
        self.chunk_len = Some(chunk_len);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

enum Outcome {
    Done,
    /// Consumer dropped the stream; nobody is left to notify.
    Abandoned,
    Failed,
}

/// Move the session into Transferring and start the chunk driver.
pub(crate) fn start(
    engine: Arc<RequestEngine>,
    plan: TransferPlan,
) -> Result<Transfer, ProtocolError> {
    engine.session.begin_transfer(plan.command)?;
    let (tx, rx) = mpsc::channel(engine.config().transfer_buffer.max(1));
    tokio::spawn(drive(engine, plan, tx));
    Ok(Transfer {
        rx,
        received: 0,
        chunks: 0,
        finished: false,
        failed: false,
    })
}

async fn drive(
    engine: Arc<RequestEngine>,
    plan: TransferPlan,
    tx: mpsc::Sender<Result<Bytes, ProtocolError>>,
) {
    let chunk_len = plan.chunk_len.unwrap_or(engine.config().chunk_len).max(1);
    let mut offset = plan.offset;
    let mut received: u64 = 0;
    let mut chunks: u64 = 0;

    let outcome = loop {
        if let CompletionSignal::TotalSize(total) = plan.completion {
            if received >= total {
                break Outcome::Done;
            }
        }

        let want = match plan.completion {
            CompletionSignal::TotalSize(total) => (total - received).min(u64::from(chunk_len)) as u32,
            CompletionSignal::Terminator => chunk_len,
        };

        let mut request = Request::new(plan.command)
            .payload(LogRange::new(offset, want).to_payload())
            .expect([plan.response]);
        if let Some(timeout) = plan.timeout {
            request = request.timeout(timeout);
        }
        if let Some(retries) = plan.retries {
            request = request.retries(retries);
        }

        // Each chunk rides the engine's normal retry policy; a chunk that
        // still fails takes the whole transfer down.
        let chunk = match engine.send(request).await {
            Ok(response) => response.payload,
            Err(err) => {
                warn!(%err, received, chunks, "chunk request failed, aborting transfer");
                break Outcome::Failed;
            }
        };

        if chunk.is_empty() {
            match plan.completion {
                CompletionSignal::Terminator => break Outcome::Done,
                CompletionSignal::TotalSize(total) => {
                    warn!(received, total, "device ran dry before the declared size");
                    break Outcome::Failed;
                }
            }
        }

        received += chunk.len() as u64;
        offset = offset.wrapping_add(chunk.len() as u32);
        chunks += 1;
        debug!(chunks, received, "chunk received");

        if tx.send(Ok(chunk)).await.is_err() {
            break Outcome::Abandoned;
        }
    };

    engine.session.end_transfer();

    match outcome {
        Outcome::Done => {
            debug!(received, chunks, "transfer complete");
        }
        Outcome::Abandoned => {
            debug!(received, chunks, "transfer abandoned by consumer");
        }
        Outcome::Failed => {
            // Chunks already delivered stay with the caller; the error
            // reports how far the transfer got.
            let _ = tx.send(Err(ProtocolError::TransferAborted { received })).await;
        }
    }
}

/// A download in progress: a finite, lazy sequence of chunks.
///
/// Consume it with [`Transfer::next_chunk`] or as a
/// [`Stream`](futures_core::Stream). Not restartable: resuming means
/// negotiating a fresh transfer from the device's reported offset.
#[derive(Debug)]
pub struct Transfer {
    rx: mpsc::Receiver<Result<Bytes, ProtocolError>>,
    received: u64,
    chunks: u64,
    finished: bool,
    failed: bool,
}

impl Transfer {
    /// Next chunk, `None` once the stream has ended. After an `Err` the
    /// stream is over; bytes already handed out remain valid.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, ProtocolError>> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(Ok(chunk)) => {
                self.received += chunk.len() as u64;
                self.chunks += 1;
                Some(Ok(chunk))
            }
            Some(Err(err)) => {
                self.finished = true;
                self.failed = true;
                Some(Err(err))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Bytes consumed so far.
    pub fn bytes_received(&self) -> u64 {
        self.received
    }

    /// Chunks consumed so far.
    pub fn chunks_received(&self) -> u64 {
        self.chunks
    }

    /// True once the stream ended without a failure.
    pub fn is_complete(&self) -> bool {
        self.finished && !self.failed
    }

    /// Best-effort local abandonment: the driver stops at the next chunk
    /// boundary. The device may still answer the in-flight chunk request;
    /// the engine discards that stray response.
    pub fn abort(&mut self) {
        self.rx.close();
        self.finished = true;
    }

    /// Drain the remaining chunks into one buffer.
    pub async fn collect(mut self) -> Result<Bytes, ProtocolError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }
}

impl Stream for Transfer {
    type Item = Result<Bytes, ProtocolError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Ok(chunk))) => {
                this.received += chunk.len() as u64;
                this.chunks += 1;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.finished = true;
                this.failed = true;
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}
