//! Device facade
//!
//! The public surface of one band session: open it over a connected
//! transport, run the handshake, issue typed requests, stream a bulk
//! download, mirror traffic, close. Each `Device` is self-contained, so
//! several bands can be driven from one process.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use bandlink_proto::{Command, FrameChecksum, FrameCodec, SessionStart};

use crate::config::EngineConfig;
use crate::engine::{Request, RequestEngine, Response};
use crate::error::ProtocolError;
use crate::logger::TrafficSink;
use crate::session::SessionState;
use crate::transfer::{self, Transfer, TransferPlan};
use crate::transport::{Transport, TransportError};

pub struct Device {
    engine: Arc<RequestEngine>,
    pump: JoinHandle<()>,
}

impl Device {
    /// Open a session over an already-connected transport.
    ///
    /// The session starts in `Connected`; run [`Device::handshake`] to reach
    /// `Ready` before issuing ordinary requests.
    pub async fn open(
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Result<Self, ProtocolError> {
        let mtu = transport.mtu();
        Self::open_with_codec(transport, config, FrameCodec::new(mtu)).await
    }

    /// Open a session with a non-default frame checksum.
    pub async fn open_with_checksum(
        transport: Arc<dyn Transport>,
        config: EngineConfig,
        checksum: Arc<dyn FrameChecksum>,
    ) -> Result<Self, ProtocolError> {
        let codec = FrameCodec::with_checksum(transport.mtu(), checksum);
        Self::open_with_codec(transport, config, codec).await
    }

    async fn open_with_codec(
        transport: Arc<dyn Transport>,
        config: EngineConfig,
        codec: FrameCodec,
    ) -> Result<Self, ProtocolError> {
        if !transport.is_connected().await {
            return Err(ProtocolError::Transport(TransportError::ConnectionClosed));
        }

        let engine = Arc::new(RequestEngine::with_codec(transport, config, codec));
        let pump = engine.spawn_pump();
        info!("session open");
        Ok(Self { engine, pump })
    }

    pub fn state(&self) -> SessionState {
        self.engine.session.current()
    }

    /// Identity and session-start handshake:
    /// `Connected -> Identified -> Ready`.
    pub async fn handshake(&self) -> Result<(), ProtocolError> {
        // The identity exchange runs under the reserved sequence number 0.
        let identity = self
            .engine
            .send(
                Request::new(Command::IS_DEVICE_PAIRED)
                    .expect([Command::IS_DEVICE_PAIRED_RESP])
                    .with_seqno(0),
            )
            .await?;

        // A nonzero pairing flag means the band is claimed by another host
        // and will refuse a session until it is reset.
        if identity.response != 0 {
            debug!(flag = identity.response, "band already paired elsewhere");
            return Err(ProtocolError::Device {
                code: identity.response as u8,
            });
        }
        self.engine.session.identified();

        let config = self.engine.config();
        let start = SessionStart::new(config.host_id, config.session_mode, &*config.host_version);
        self.engine
            .send(
                Request::new(Command::SESSION_START)
                    .payload(start.to_payload())
                    .expect([Command::SESSION_START_RESP]),
            )
            .await?;
        self.engine.session.ready();

        info!("handshake complete, session ready");
        Ok(())
    }

    /// Issue a raw typed request. Most callers want the helpers below.
    pub async fn request(&self, request: Request) -> Result<Response, ProtocolError> {
        self.engine.send(request).await
    }

    // -- typed requests -----------------------------------------------------

    /// Query the band's configuration block.
    pub async fn get_config(&self) -> Result<Response, ProtocolError> {
        self.request(Request::new(Command::GET_CONFIG)).await
    }

    /// Query the technical status record.
    pub async fn technical_status(&self) -> Result<Response, ProtocolError> {
        self.request(Request::new(Command::GET_TECHNICAL_STATUS))
            .await
    }

    /// Set the LED state byte.
    pub async fn set_leds(&self, value: u8) -> Result<(), ProtocolError> {
        self.request(Request::new(Command::LEDS_CONTROL).payload(vec![value]))
            .await
            .map(drop)
    }

    /// Ask the band to reset itself. `reason` is zero in normal use.
    pub async fn reset_device(&self, reason: u8) -> Result<(), ProtocolError> {
        self.request(Request::new(Command::DEVICE_RESET).payload(vec![reason]))
            .await
            .map(drop)
    }

    /// Fetch the parameters file stored on the band.
    pub async fn get_parameters_file(&self) -> Result<Bytes, ProtocolError> {
        self.request(
            Request::new(Command::GET_PARAMETERS_FILE).expect([Command::PARAMETERS_FILE]),
        )
        .await
        .map(|response| response.payload)
    }

    /// Replace the parameters file stored on the band.
    pub async fn set_parameters_file(&self, data: impl Into<Bytes>) -> Result<(), ProtocolError> {
        self.request(Request::new(Command::SET_PARAMETERS_FILE).payload(data))
            .await
            .map(drop)
    }

    /// Trigger the legacy stored-data dump. The band answers with an ACK and
    /// then pushes data frames on its own schedule; prefer a ranged
    /// [`Device::download`] where the firmware supports it.
    pub async fn request_stored_data(&self) -> Result<Response, ProtocolError> {
        self.request(Request::new(Command::SEND_STORED_DATA)).await
    }

    // -- bulk transfers -----------------------------------------------------

    /// Begin a chunked download. The session moves to `Transferring` until
    /// the returned [`Transfer`] completes, fails or is dropped.
    pub fn download(&self, plan: TransferPlan) -> Result<Transfer, ProtocolError> {
        transfer::start(Arc::clone(&self.engine), plan)
    }

    /// Download the device log file starting at `offset`. Pass the total
    /// size when known; otherwise the transfer runs until the band returns
    /// an empty chunk.
    pub fn download_log(&self, offset: u32, total: Option<u64>) -> Result<Transfer, ProtocolError> {
        self.download(TransferPlan::log_file(offset, total))
    }

    // -- traffic log --------------------------------------------------------

    /// Mirror all traffic to `sink`; returns the previously attached sink.
    pub fn attach_traffic_log(&self, sink: TrafficSink) -> Option<TrafficSink> {
        self.engine.traffic.attach(sink)
    }

    /// Stop mirroring and hand the sink back for flushing/closing.
    pub fn detach_traffic_log(&self) -> Option<TrafficSink> {
        self.engine.traffic.detach()
    }

    /// Close the session and tear the transport down. The session is not
    /// reusable afterwards.
    pub async fn close(self) -> Result<(), ProtocolError> {
        self.engine.session.closing();
        let result = self.engine.transport().disconnect().await;
        self.engine.session.disconnected(false);
        info!("session closed");
        result.map_err(Into::into)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
