//! Request/response engine
//!
//! The wire protocol carries exactly one outstanding exchange per session:
//! concurrent callers queue FIFO on the exchange slot, a response is matched
//! to its request by sequence number, and a retransmission reuses the
//! original sequence number: the band treats a repeated seqno as the same
//! request, which is what makes retries idempotent.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use bandlink_proto::{Ack, Command, Frame, FrameCodec, Reassembler};

use crate::config::EngineConfig;
use crate::error::ProtocolError;
use crate::logger::TrafficLog;
use crate::session::{SessionState, SessionTracker};
use crate::transport::{Transport, TransportError};

/// A caller's intent: one command, its payload, and how to recognize and
/// bound the answer.
#[derive(Debug, Clone)]
pub struct Request {
    pub command: Command,
    pub payload: Bytes,
    /// Response commands that resolve this exchange. A success ACK that is
    /// not listed here is treated as transport-level and the wait continues.
    pub expect: Vec<Command>,
    /// Per-request override of the engine-wide response timeout.
    pub timeout: Option<Duration>,
    /// Per-request override of the engine-wide retry budget.
    pub retries: Option<u32>,
    fixed_seqno: Option<u32>,
}

impl Request {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            payload: Bytes::new(),
            expect: vec![Command::ACK],
            timeout: None,
            retries: None,
            fixed_seqno: None,
        }
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn expect(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.expect = commands.into_iter().collect();
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

    /// Pin the sequence number instead of drawing the next one. Seqno 0 is
    /// reserved for the identity exchange.
    pub(crate) fn with_seqno(mut self, seqno: u32) -> Self {
        self.fixed_seqno = Some(seqno);
        self
    }
}

/// The matched result of a request. Construction implies the exchange
/// succeeded; device rejections surface as [`ProtocolError::Device`].
#[derive(Debug, Clone)]
pub struct Response {
    pub command: Command,
    pub payload: Bytes,
    /// Header response word; some responses carry their data here rather
    /// than in the payload.
    pub response: u32,
    pub seqno: u32,
}

impl Response {
    pub fn is_ack(&self) -> bool {
        self.command == Command::ACK
    }
}

/// Sequence counter, guarded by the exchange lock so a number is never
/// handed out while an older request could still be retried under it.
struct ExchangeSlot {
    next_seqno: u32,
}

impl ExchangeSlot {
    fn take_seqno(&mut self) -> u32 {
        let seqno = self.next_seqno;
        self.next_seqno = self.next_seqno.wrapping_add(1);
        if self.next_seqno == 0 {
            self.next_seqno = 1;
        }
        seqno
    }
}

pub(crate) struct RequestEngine {
    transport: Arc<dyn Transport>,
    codec: FrameCodec,
    config: EngineConfig,
    pub(crate) session: SessionTracker,
    pub(crate) traffic: Arc<TrafficLog>,
    /// Decoded inbound frames, fanned out by the pump. Taken (dropped) when
    /// the link goes away so waiters observe the channel closing.
    frames: SyncMutex<Option<broadcast::Sender<Frame>>>,
    slot: Mutex<ExchangeSlot>,
}

impl RequestEngine {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        let codec = FrameCodec::new(transport.mtu());
        Self::with_codec(transport, config, codec)
    }

    pub(crate) fn with_codec(
        transport: Arc<dyn Transport>,
        config: EngineConfig,
        codec: FrameCodec,
    ) -> Self {
        Self {
            transport,
            codec,
            config,
            session: SessionTracker::new(),
            traffic: Arc::new(TrafficLog::new()),
            frames: SyncMutex::new(None),
            slot: Mutex::new(ExchangeSlot { next_seqno: 1 }),
        }
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Spawn the receive pump. Called once, at session open.
    pub(crate) fn spawn_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let rx = self.transport.subscribe();
        let (tx, _) = broadcast::channel(64);
        *self.frames.lock() = Some(tx);
        let engine = Arc::clone(self);
        tokio::spawn(engine.pump(rx))
    }

    async fn pump(self: Arc<Self>, mut rx: broadcast::Receiver<Bytes>) {
        let mut reassembler = Reassembler::new(self.codec.clone());
        loop {
            match rx.recv().await {
                Ok(buf) => {
                    // Mirror the raw buffer before any protocol processing.
                    self.traffic.log_rx(&buf);
                    for frame in reassembler.push(&buf) {
                        debug!(command = %frame.command(), seqno = frame.seqno(), "frame received");
                        if self.config.auto_ack && frame.command() != Command::ACK {
                            self.acknowledge(&frame).await;
                        }
                        if let Some(tx) = self.frames.lock().as_ref() {
                            // No subscriber just means nobody is waiting.
                            let _ = tx.send(frame);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "inbound buffers lagged, frames may be lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        let orderly = matches!(
            self.session.current(),
            SessionState::Closing | SessionState::Disconnected
        );
        self.session.disconnected(!orderly);
        if !orderly {
            warn!("transport link lost");
        }
        // Dropping the sender wakes any in-flight waiter with ConnectionLost.
        self.frames.lock().take();
    }

    /// Send a success ACK for an inbound frame. Best effort.
    async fn acknowledge(&self, frame: &Frame) {
        let payload = Ack::new(frame.command(), 0).to_payload();
        match self.codec.encode(Command::ACK, frame.seqno(), &payload) {
            Ok(bytes) => {
                self.traffic.log_tx(&bytes);
                if let Err(err) = self.transport.send(&bytes).await {
                    debug!(%err, "ack send failed");
                }
            }
            Err(err) => debug!(%err, "ack encode failed"),
        }
    }

    /// Run one exchange: queue for the slot, send, await the matching
    /// response, retrying on timeout with the same sequence number.
    pub(crate) async fn send(&self, request: Request) -> Result<Response, ProtocolError> {
        // Tokio's mutex queues waiters fairly, which is exactly the FIFO
        // ordering guarantee callers get.
        let mut slot = self.slot.lock().await;
        self.session.ensure_allows(request.command)?;

        let seqno = match request.fixed_seqno {
            Some(seqno) => seqno,
            None => slot.take_seqno(),
        };
        let frame = self
            .codec
            .encode_at(request.command, seqno, self.timestamp(), &request.payload)?;

        let timeout = request.timeout.unwrap_or_else(|| self.config.request_timeout());
        let attempts = request
            .retries
            .unwrap_or(self.config.retry_budget)
            .saturating_add(1);

        let mut rx = match self.frames.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => return Err(ProtocolError::ConnectionLost),
        };

        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!(
                    command = %request.command,
                    seqno,
                    attempt,
                    "retransmitting with unchanged seqno"
                );
            }

            self.traffic.log_tx(&frame);
            match self.transport.send(&frame).await {
                Ok(()) => {}
                Err(TransportError::ConnectionClosed) => {
                    self.session.disconnected(true);
                    return Err(ProtocolError::ConnectionLost);
                }
                Err(err) => return Err(err.into()),
            }

            match self
                .await_response(&mut rx, seqno, &request.expect, timeout)
                .await?
            {
                Some(response) => return Ok(response),
                None => continue,
            }
        }

        warn!(command = %request.command, seqno, attempts, "request timed out");
        Err(ProtocolError::Timeout { attempts })
    }

    /// Wait for the frame resolving `seqno`. `Ok(None)` means this attempt
    /// timed out and the caller may retry.
    async fn await_response(
        &self,
        rx: &mut broadcast::Receiver<Frame>,
        seqno: u32,
        expect: &[Command],
        timeout: Duration,
    ) -> Result<Option<Response>, ProtocolError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => return Ok(None),
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(ProtocolError::ConnectionLost)
                }
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    warn!(missed, "response stream lagged");
                    continue;
                }
                Ok(Ok(frame)) => frame,
            };

            if frame.seqno() != seqno {
                // A stale answer to an abandoned exchange, or unsolicited
                // traffic; either way it is not ours to consume.
                debug!(
                    got = frame.seqno(),
                    want = seqno,
                    command = %frame.command(),
                    "discarding stray frame"
                );
                continue;
            }

            if frame.command() == Command::ACK {
                let ack = Ack::parse(&frame.payload)?;
                if !ack.is_success() {
                    return Err(ProtocolError::Device { code: ack.status });
                }
                if !expect.contains(&Command::ACK) {
                    debug!(seqno, "transport-level ack, still waiting for the response");
                    continue;
                }
            } else if !expect.contains(&frame.command()) {
                debug!(
                    command = %frame.command(),
                    seqno,
                    "response command not expected, discarding"
                );
                continue;
            }

            return Ok(Some(Response {
                command: frame.command(),
                response: frame.header.response,
                seqno: frame.seqno(),
                payload: frame.payload,
            }));
        }
    }

    /// Header timestamp: wall-clock centiseconds, or zero when disabled.
    fn timestamp(&self) -> u64 {
        if !self.config.use_timestamp {
            return 0;
        }
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| (d.as_millis() / 10) as u64)
            .unwrap_or(0)
    }
}
