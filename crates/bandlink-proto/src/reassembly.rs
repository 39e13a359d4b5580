//! Streaming frame reassembly
//!
//! The transport delivers whatever buffer sizes the radio produced, so a
//! frame may arrive split across several notifications, or two small frames
//! may share one buffer. The reassembler accumulates bytes, resynchronizes
//! on the frame magic after noise, and yields whole validated frames.

use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::codec::FrameCodec;
use crate::frame::{Frame, Header, HEADER_LEN};

pub struct Reassembler {
    codec: FrameCodec,
    buf: BytesMut,
    /// Frames dropped for failing validation.
    corrupt: u64,
    /// Noise bytes discarded while hunting for magic.
    skipped: u64,
}

impl Reassembler {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            buf: BytesMut::new(),
            corrupt: 0,
            skipped: 0,
        }
    }

    pub fn corrupt_frames(&self) -> u64 {
        self.corrupt
    }

    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Feed one received buffer; returns every frame completed by it.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            self.resync();

            if self.buf.len() < HEADER_LEN {
                return frames;
            }

            // Magic was just verified, so the only parse outcome is a header.
            let header = match Header::parse(&self.buf) {
                Ok(header) => header,
                Err(err) => {
                    warn!(%err, "header parse failed after resync, dropping a byte");
                    self.buf.advance(1);
                    self.skipped += 1;
                    continue;
                }
            };

            // A declared length below the header size is corruption; consume
            // at least a header's worth so the cursor always moves.
            let declared = (header.length as usize).max(HEADER_LEN);
            if self.buf.len() < declared {
                return frames;
            }

            match self.codec.decode(&self.buf[..declared]) {
                Ok(frame) => {
                    trace!(command = %frame.command(), seqno = frame.seqno(), "frame reassembled");
                    frames.push(frame);
                }
                Err(err) => {
                    self.corrupt += 1;
                    warn!(%err, command = %header.command, "dropping corrupt frame");
                }
            }
            self.buf.advance(declared);
        }
    }

    /// Discard leading bytes until the buffer starts with frame magic.
    fn resync(&mut self) {
        let mut dropped = 0u64;
        while self.buf.len() >= 2 && !(self.buf[0] == 0xBB && self.buf[1] == 0xBB) {
            self.buf.advance(1);
            dropped += 1;
        }
        if dropped > 0 {
            self.skipped += dropped;
            warn!(dropped, "skipped noise bytes while hunting for frame magic");
        }
    }
}
