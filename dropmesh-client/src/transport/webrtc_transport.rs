use crate::transport::fragment::{self, FrameAssembler, MAX_FRAME_SIZE, MAX_MESSAGE_SIZE};
use crate::transport::{PeerSignal, PeerTransport, TransportError, TransportEvent, TransportFactory};
use async_trait::async_trait;
use bytes::Bytes;
use dropmesh_core::{IceServerConfig, PeerId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OnceCell, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

const CHANNEL_LABEL: &str = "dropmesh";

/// Builds WebRTC data-channel transports sharing one API instance.
pub struct WebRtcFactory {
    api: API,
    ice_servers: Vec<IceServerConfig>,
}

impl WebRtcFactory {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Result<Self, TransportError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        // Peers on the same host can only reach each other over loopback.
        let mut settings = SettingEngine::default();
        settings.set_include_loopback_candidate(true);

        let api = APIBuilder::new()
            .with_setting_engine(settings)
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, ice_servers })
    }

    fn rtc_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TransportFactory for WebRtcFactory {
    async fn create(
        &self,
        peer_id: PeerId,
        initiator: bool,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>, TransportError> {
        let peer_connection = Arc::new(self.api.new_peer_connection(self.rtc_config()).await?);
        let transport = Arc::new(WebRtcTransport {
            peer_id,
            peer_connection,
            channel: Arc::new(OnceCell::new()),
            status: Arc::new(ChannelStatus::default()),
            remote: Mutex::new(RemoteDescription::default()),
            send_lock: Mutex::new(()),
            events,
        });

        transport.watch_connection();
        if initiator {
            let dc = transport
                .peer_connection
                .create_data_channel(CHANNEL_LABEL, None)
                .await?;
            transport.wire_channel(dc);
            transport.send_offer().await?;
        } else {
            transport.accept_channel();
        }

        Ok(transport)
    }
}

#[derive(Default)]
struct ChannelStatus {
    open: AtomicBool,
    closed: AtomicBool,
}

#[derive(Default)]
struct RemoteDescription {
    applied: bool,
    pending_candidates: Vec<RTCIceCandidateInit>,
}

/// One `RTCPeerConnection` carrying a single ordered data channel.
pub struct WebRtcTransport {
    peer_id: PeerId,
    peer_connection: Arc<RTCPeerConnection>,
    channel: Arc<OnceCell<Arc<RTCDataChannel>>>,
    status: Arc<ChannelStatus>,
    remote: Mutex<RemoteDescription>,
    /// Keeps the fragments of one frame contiguous on the channel.
    send_lock: Mutex<()>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

/// `Disconnected` is left out: ICE may still recover from it, and a link
/// that never does moves on to `Failed`.
fn is_terminal(state: RTCPeerConnectionState) -> bool {
    matches!(
        state,
        RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
    )
}

/// Emits `Closed` at most once per transport.
fn report_closed(
    status: &ChannelStatus,
    events: &mpsc::UnboundedSender<TransportEvent>,
    peer_id: &PeerId,
) {
    status.open.store(false, Ordering::SeqCst);
    if !status.closed.swap(true, Ordering::SeqCst) {
        let _ = events.send(TransportEvent::Closed(peer_id.clone()));
    }
}

impl WebRtcTransport {
    fn watch_connection(&self) {
        let status = self.status.clone();
        let events = self.events.clone();
        let peer_id = self.peer_id.clone();
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let status = status.clone();
                let events = events.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    info!("Peer connection state for {}: {:?}", peer_id, s);
                    if is_terminal(s) {
                        report_closed(&status, &events, &peer_id);
                    }
                })
            }));

        let events = self.events.clone();
        let peer_id = self.peer_id.clone();
        self.peer_connection
            .on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
                let events = events.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let Some(candidate) = c else { return };
                    let init = match candidate.to_json() {
                        Ok(init) => init,
                        Err(e) => {
                            warn!("Failed to serialize local candidate for {}: {}", peer_id, e);
                            return;
                        }
                    };
                    let signal = PeerSignal::Candidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index,
                    };
                    let _ = events.send(TransportEvent::Signal(peer_id, signal));
                })
            }));
    }

    /// Responder side: the channel arrives from the remote offer.
    fn accept_channel(self: &Arc<Self>) {
        let this = Arc::downgrade(self);
        self.peer_connection
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let this = this.clone();
                Box::pin(async move {
                    if let Some(this) = this.upgrade() {
                        this.wire_channel(dc);
                    }
                })
            }));
    }

    fn wire_channel(&self, dc: Arc<RTCDataChannel>) {
        debug!("DataChannel '{}' attached for {}", dc.label(), self.peer_id);
        if self.channel.set(dc.clone()).is_err() {
            warn!("Ignoring extra DataChannel from {}", self.peer_id);
            return;
        }

        let status = self.status.clone();
        let events = self.events.clone();
        let peer_id = self.peer_id.clone();
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                info!("DataChannel open for {}", peer_id);
                status.open.store(true, Ordering::SeqCst);
                let _ = events.send(TransportEvent::Open(peer_id));
            })
        }));

        let assembler = Arc::new(Mutex::new(FrameAssembler::new(MAX_FRAME_SIZE)));
        let partial = assembler.clone();
        let status = self.status.clone();
        let events = self.events.clone();
        let peer_id = self.peer_id.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let assembler = assembler.clone();
            let status = status.clone();
            let events = events.clone();
            let peer_id = peer_id.clone();
            Box::pin(async move {
                match assembler.lock().await.push(&msg.data) {
                    Ok(frames) => {
                        for frame in frames {
                            let _ = events.send(TransportEvent::Data(peer_id.clone(), frame));
                        }
                    }
                    Err(e) => {
                        warn!("Unframeable data from {}: {}", peer_id, e);
                        report_closed(&status, &events, &peer_id);
                    }
                }
            })
        }));

        let status = self.status.clone();
        let events = self.events.clone();
        let peer_id = self.peer_id.clone();
        dc.on_close(Box::new(move || {
            report_closed(&status, &events, &peer_id);
            let assembler = partial.clone();
            let peer_id = peer_id.clone();
            Box::pin(async move {
                let pending = assembler.lock().await.pending();
                if pending > 0 {
                    debug!("Dropping {} bytes of a partial frame from {}", pending, peer_id);
                }
            })
        }));
    }

    async fn send_offer(&self) -> Result<(), TransportError> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        self.emit_signal(PeerSignal::Offer { sdp: offer.sdp });
        Ok(())
    }

    async fn accept_offer(&self, sdp: String) -> Result<(), TransportError> {
        self.apply_remote(RTCSessionDescription::offer(sdp)?).await?;

        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        self.emit_signal(PeerSignal::Answer { sdp: answer.sdp });
        Ok(())
    }

    /// Set the remote description, then add candidates that arrived early.
    async fn apply_remote(&self, desc: RTCSessionDescription) -> Result<(), TransportError> {
        let mut remote = self.remote.lock().await;
        self.peer_connection.set_remote_description(desc).await?;
        remote.applied = true;

        for candidate in std::mem::take(&mut remote.pending_candidates) {
            if let Err(e) = self.peer_connection.add_ice_candidate(candidate).await {
                warn!("Dropping queued candidate from {}: {}", self.peer_id, e);
            }
        }
        Ok(())
    }

    async fn add_candidate(&self, candidate: RTCIceCandidateInit) -> Result<(), TransportError> {
        let mut remote = self.remote.lock().await;
        if remote.applied {
            drop(remote);
            self.peer_connection.add_ice_candidate(candidate).await?;
        } else {
            remote.pending_candidates.push(candidate);
        }
        Ok(())
    }

    fn emit_signal(&self, signal: PeerSignal) {
        let _ = self
            .events
            .send(TransportEvent::Signal(self.peer_id.clone(), signal));
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn signal(&self, signal: PeerSignal) -> Result<(), TransportError> {
        match signal {
            PeerSignal::Offer { sdp } => self.accept_offer(sdp).await,
            PeerSignal::Answer { sdp } => {
                self.apply_remote(RTCSessionDescription::answer(sdp)?).await
            }
            PeerSignal::Candidate {
                candidate,
                sdp_mid,
                sdp_m_line_index,
            } => {
                self.add_candidate(RTCIceCandidateInit {
                    candidate,
                    sdp_mid,
                    sdp_mline_index: sdp_m_line_index,
                    username_fragment: None,
                })
                .await
            }
        }
    }

    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let dc = self.channel.get().ok_or(TransportError::NotOpen)?;

        let _guard = self.send_lock.lock().await;
        for message in fragment::split(&data, MAX_MESSAGE_SIZE) {
            dc.send(&message)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn buffered_amount(&self) -> usize {
        match self.channel.get() {
            Some(dc) => dc.buffered_amount().await,
            None => 0,
        }
    }

    fn is_open(&self) -> bool {
        self.status.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if let Err(e) = self.peer_connection.close().await {
            warn!("Error closing peer connection to {}: {}", self.peer_id, e);
        }
        report_closed(&self.status, &self.events, &self.peer_id);
    }
}
