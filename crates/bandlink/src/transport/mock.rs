//! Mock band transport for testing
//!
//! A scripted in-process device on the far side of the [`Transport`] seam.
//! It decodes whatever the engine sends, answers the way the real band does
//! (identity response, session-start blob, ranged log reads, ACKs for
//! everything else), and can be told to misbehave: drop responses, reject a
//! command, go silent, add latency, fragment its replies or drop the link.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use bandlink_proto::{Ack, Command, Frame, FrameCodec, LogRange, Reassembler};

use super::{Transport, TransportError};

const DEFAULT_MTU: usize = 4096;

struct BandState {
    /// Nonzero pairing flag means "already claimed by another host".
    paired_elsewhere: bool,
    /// Configuration blob returned in the session-start response.
    session_config: Vec<u8>,
    parameters_file: Vec<u8>,
    /// Backing store served through ranged log reads.
    log_data: Vec<u8>,
    /// Stop answering ranged reads at or past this offset, like a flash
    /// region that no longer reads back.
    log_fail_from: Option<u32>,
    /// Swallow this many responses before answering again.
    drop_responses: u32,
    /// Commands answered with a NAK of the given status.
    nak: HashMap<u16, u8>,
    /// Commands that never get any answer.
    silent: HashSet<u16>,
    latency: Option<Duration>,
    /// Split outgoing buffers into fragments of this size, like a radio
    /// with a small notification MTU would.
    fragment: Option<usize>,
}

impl Default for BandState {
    fn default() -> Self {
        Self {
            paired_elsewhere: false,
            session_config: vec![0; 512],
            parameters_file: Vec::new(),
            log_data: Vec::new(),
            log_fail_from: None,
            drop_responses: 0,
            nak: HashMap::new(),
            silent: HashSet::new(),
            latency: None,
            fragment: None,
        }
    }
}

pub struct MockBand {
    mtu: usize,
    connected: AtomicBool,
    incoming_tx: Mutex<Option<broadcast::Sender<Bytes>>>,
    codec: FrameCodec,
    reassembler: Mutex<Reassembler>,
    state: Mutex<BandState>,
    /// Raw buffers observed on each side of the pipe.
    wire_from_host: Mutex<Vec<Vec<u8>>>,
    wire_to_host: Mutex<Vec<Vec<u8>>>,
    /// Every decoded frame the host sent, in arrival order.
    requests: Mutex<Vec<Frame>>,
}

impl Default for MockBand {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBand {
    pub fn new() -> Self {
        Self::with_mtu(DEFAULT_MTU)
    }

    pub fn with_mtu(mtu: usize) -> Self {
        let (incoming_tx, _) = broadcast::channel(256);
        let codec = FrameCodec::new(mtu);
        Self {
            mtu,
            connected: AtomicBool::new(true),
            incoming_tx: Mutex::new(Some(incoming_tx)),
            codec: codec.clone(),
            reassembler: Mutex::new(Reassembler::new(codec)),
            state: Mutex::new(BandState::default()),
            wire_from_host: Mutex::new(Vec::new()),
            wire_to_host: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    // -- scripting ----------------------------------------------------------

    pub fn set_log_data(&self, data: Vec<u8>) {
        self.state.lock().log_data = data;
    }

    pub fn set_parameters_file(&self, data: Vec<u8>) {
        self.state.lock().parameters_file = data;
    }

    pub fn set_session_config(&self, blob: Vec<u8>) {
        self.state.lock().session_config = blob;
    }

    pub fn set_paired_elsewhere(&self, paired: bool) {
        self.state.lock().paired_elsewhere = paired;
    }

    /// Swallow the next `n` responses, as if the radio lost them.
    pub fn drop_next_responses(&self, n: u32) {
        self.state.lock().drop_responses = n;
    }

    /// Never answer ranged reads at or past `offset`.
    pub fn fail_log_reads_from(&self, offset: u32) {
        self.state.lock().log_fail_from = Some(offset);
    }

    /// Answer `command` with a NAK carrying `status`.
    pub fn nak_command(&self, command: Command, status: u8) {
        self.state.lock().nak.insert(command.0, status);
    }

    /// Never answer `command`.
    pub fn silence_command(&self, command: Command) {
        self.state.lock().silent.insert(command.0);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Deliver responses in fragments of `size` bytes.
    pub fn set_fragment_size(&self, size: usize) {
        self.state.lock().fragment = Some(size);
    }

    // -- observation --------------------------------------------------------

    /// Every frame the host has sent, in arrival order.
    pub fn requests(&self) -> Vec<Frame> {
        self.requests.lock().clone()
    }

    /// Sequence numbers observed for a given command, in arrival order.
    pub fn seqnos_for(&self, command: Command) -> Vec<u32> {
        self.requests
            .lock()
            .iter()
            .filter(|f| f.command() == command)
            .map(|f| f.seqno())
            .collect()
    }

    /// Raw buffers received from the host.
    pub fn wire_from_host(&self) -> Vec<Vec<u8>> {
        self.wire_from_host.lock().clone()
    }

    /// Raw buffers emitted towards the host.
    pub fn wire_to_host(&self) -> Vec<Vec<u8>> {
        self.wire_to_host.lock().clone()
    }

    /// Push arbitrary bytes at the host, bypassing the scripted responder.
    pub fn inject(&self, data: &[u8]) {
        self.emit(Bytes::copy_from_slice(data));
    }

    /// Drop the link without warning; subscribers see the channel close.
    pub fn kill_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.incoming_tx.lock().take();
    }

    // -- internals ----------------------------------------------------------

    fn emit(&self, buf: Bytes) {
        let fragment = self.state.lock().fragment;
        let guard = self.incoming_tx.lock();
        let Some(tx) = guard.as_ref() else { return };

        self.wire_to_host.lock().push(buf.to_vec());
        match fragment {
            Some(size) if size > 0 => {
                let mut rest = buf;
                while !rest.is_empty() {
                    let take = size.min(rest.len());
                    let _ = tx.send(rest.split_to(take));
                }
            }
            _ => {
                let _ = tx.send(buf);
            }
        }
    }

    fn respond_to(&self, frame: &Frame) -> Vec<Bytes> {
        let command = frame.command();
        let seqno = frame.seqno();
        let mut state = self.state.lock();

        if state.silent.contains(&command.0) {
            return Vec::new();
        }
        if state.drop_responses > 0 {
            state.drop_responses -= 1;
            debug!(%command, seqno, "mock band: dropping response");
            return Vec::new();
        }
        if let Some(&status) = state.nak.get(&command.0) {
            return vec![self.ack_frame(command, seqno, status)];
        }

        match command {
            Command::ACK => Vec::new(),
            Command::IS_DEVICE_PAIRED => {
                let flag = u32::from(state.paired_elsewhere);
                // Payload shape as captured: orig command, flag, pad byte.
                let mut payload = BytesMut::with_capacity(5);
                payload.put_u16(Command::IS_DEVICE_PAIRED.0);
                payload.put_u16(flag as u16);
                payload.put_u8(0);
                vec![self
                    .codec
                    .encode_response(Command::IS_DEVICE_PAIRED_RESP, seqno, flag, &payload)
                    .expect("mock response frame")]
            }
            Command::SESSION_START => {
                let blob = state.session_config.clone();
                vec![
                    self.ack_frame(command, seqno, 0),
                    self.codec
                        .encode(Command::SESSION_START_RESP, seqno, &blob)
                        .expect("mock response frame"),
                ]
            }
            Command::GET_PARAMETERS_FILE => {
                let file = state.parameters_file.clone();
                vec![self
                    .codec
                    .encode(Command::PARAMETERS_FILE, seqno, &file)
                    .expect("mock response frame")]
            }
            Command::SET_PARAMETERS_FILE => {
                state.parameters_file = frame.payload.to_vec();
                vec![self.ack_frame(command, seqno, 0)]
            }
            Command::GET_LOG_FILE => match LogRange::parse(&frame.payload) {
                Ok(range) => {
                    if matches!(state.log_fail_from, Some(from) if range.offset >= from) {
                        debug!(offset = range.offset, "mock band: ranged read failure");
                        return Vec::new();
                    }
                    // Never build a chunk the pipe could not carry back.
                    let want = (range.length as usize).min(self.codec.max_payload());
                    let start = (range.offset as usize).min(state.log_data.len());
                    let end = (start + want).min(state.log_data.len());
                    let chunk = state.log_data[start..end].to_vec();
                    vec![self
                        .codec
                        .encode(Command::LOG_FILE_RESP, seqno, &chunk)
                        .expect("mock response frame")]
                }
                Err(_) => vec![self.ack_frame(command, seqno, 0x01)],
            },
            // Everything else is a plain command the band just acknowledges.
            _ => vec![self.ack_frame(command, seqno, 0)],
        }
    }

    fn ack_frame(&self, orig: Command, seqno: u32, status: u8) -> Bytes {
        self.codec
            .encode(Command::ACK, seqno, &Ack::new(orig, status).to_payload())
            .expect("mock ack frame")
    }
}

#[async_trait]
impl Transport for MockBand {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        self.wire_from_host.lock().push(data.to_vec());

        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let frames = self.reassembler.lock().push(data);
        for frame in frames {
            debug!(command = %frame.command(), seqno = frame.seqno(), "mock band: request");
            let responses = self.respond_to(&frame);
            self.requests.lock().push(frame);
            for response in responses {
                self.emit(response);
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        match self.incoming_tx.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            // Link already gone: hand back a receiver that reports closed.
            None => broadcast::channel(1).0.subscribe(),
        }
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.kill_link();
        Ok(())
    }
}
