use crate::config::ClientConfig;
use crate::peer::{PeerEvent, PeerManager};
use crate::relay::{RelayClient, RelayError, RelaySession};
use crate::transfer::{
    FileSink, OutgoingFile, Progress, ReceptionAssembler, ReceptionEvent, SendError, SendReport,
    TransferEngine, TransferSettings,
};
use crate::transport::{PeerSignal, TransportError, TransportFactory, WebRtcFactory};
use dropmesh_core::{PeerId, RoomId, RoomState, ServerMessage};
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("not in a room")]
    NotInRoom,

    #[error("client stopped")]
    Stopped,
}

/// Everything the application hears about.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    RoomUpdated(RoomState),
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    /// The relay connection ended. Open links and transfers carry on, but
    /// no new peer can be reached.
    RelayLost,
    Reception(ReceptionEvent),
}

/// One relay connection plus the mesh of peer links built through it.
pub struct DropClient {
    relay: RelayClient,
    peers: PeerManager,
    engine: TransferEngine,
    room: Arc<watch::Sender<Option<RoomState>>>,
    open_peers: watch::Receiver<usize>,
}

impl DropClient {
    /// Connect to the relay in `config` using WebRTC transports.
    pub async fn connect(
        config: ClientConfig,
        sink: Arc<dyn FileSink>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        let session = RelayClient::connect(&config.server_url).await?;
        let ice_servers = if config.ice_servers.is_empty() {
            session.ice_servers.clone()
        } else {
            config.ice_servers.clone()
        };
        let factory = Arc::new(WebRtcFactory::new(ice_servers)?);
        Ok(Self::start(&config, session, factory, sink))
    }

    /// Wire up a client over an established relay session.
    pub fn start(
        config: &ClientConfig,
        session: RelaySession,
        factory: Arc<dyn TransportFactory>,
        sink: Arc<dyn FileSink>,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let relay = session.client;
        let local_id = relay.peer_id().clone();

        let (peers, peer_events) =
            PeerManager::spawn(local_id.clone(), factory, Arc::new(relay.clone()));
        let engine = TransferEngine::new(
            local_id.clone(),
            peers.channels().clone(),
            Arc::new(relay.clone()),
            TransferSettings::from(config),
        );

        let room = Arc::new(watch::channel(None).0);
        let (open_tx, open_peers) = watch::channel(0);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let driver = ClientDriver {
            local_id,
            peers: peers.clone(),
            room: room.clone(),
            open_peers: open_tx,
            assembler: ReceptionAssembler::new(sink),
            events: event_tx,
        };
        tokio::spawn(driver.run(session.events, peer_events));

        let client = Self {
            relay,
            peers,
            engine,
            room,
            open_peers,
        };
        (client, event_rx)
    }

    pub fn local_id(&self) -> &PeerId {
        self.relay.peer_id()
    }

    pub fn room_state(&self) -> Option<RoomState> {
        self.room.borrow().clone()
    }

    pub fn open_peers(&self) -> Vec<PeerId> {
        self.peers.channels().list_peers()
    }

    pub fn peers(&self) -> &PeerManager {
        &self.peers
    }

    pub fn join(&self, room_id: RoomId) -> Result<(), ClientError> {
        info!("Joining room {}", room_id);
        self.relay.join_room(room_id)?;
        Ok(())
    }

    /// Leave the current room and close every link. Links close even when
    /// the relay is already gone.
    pub async fn leave(&self) -> Result<(), ClientError> {
        let Some(state) = self.room.send_replace(None) else {
            return Err(ClientError::NotInRoom);
        };
        if let Err(e) = self.relay.leave_room(state.id) {
            warn!("Leave not sent: {}", e);
        }
        for peer_id in self.peers.link_states().await.into_keys() {
            self.peers.close(peer_id);
        }
        Ok(())
    }

    /// Wait for the first room state after `join`.
    pub async fn wait_for_room(&self) -> Result<RoomState, ClientError> {
        let mut rx = self.room.subscribe();
        let state = rx
            .wait_for(|state| state.is_some())
            .await
            .map_err(|_| ClientError::Stopped)?;
        state.clone().ok_or(ClientError::NotInRoom)
    }

    /// Wait until at least `count` links are open.
    pub async fn wait_for_peers(&self, count: usize) -> Result<usize, ClientError> {
        let mut rx = self.open_peers.clone();
        let open = rx
            .wait_for(|open| *open >= count)
            .await
            .map_err(|_| ClientError::Stopped)?;
        Ok(*open)
    }

    /// Host only: let `user_id` send files, or take that right away.
    pub fn set_permission(&self, user_id: PeerId, allowed: bool) -> Result<(), ClientError> {
        let room_id = self
            .room_state()
            .map(|state| state.id)
            .ok_or(ClientError::NotInRoom)?;
        self.relay.set_permission(room_id, user_id, allowed)?;
        Ok(())
    }

    /// Send a file from disk to every open peer.
    pub async fn send_file<F>(&self, path: &Path, on_progress: F) -> Result<SendReport, ClientError>
    where
        F: FnMut(Progress) + Send,
    {
        let state = self.room_state().ok_or(ClientError::NotInRoom)?;
        let file = OutgoingFile::open(path).await?;
        let targets = self.open_peers();
        let report = self
            .engine
            .send_file(&state, &targets, file, on_progress)
            .await?;
        Ok(report)
    }

    pub async fn send_clipboard(&self, text: impl Into<String>) -> Result<usize, ClientError> {
        Ok(self.engine.send_clipboard(text).await?)
    }

    pub fn shutdown(&self) {
        self.peers.shutdown();
    }
}

struct ClientDriver {
    local_id: PeerId,
    peers: PeerManager,
    room: Arc<watch::Sender<Option<RoomState>>>,
    open_peers: watch::Sender<usize>,
    assembler: ReceptionAssembler,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl ClientDriver {
    async fn run(
        mut self,
        mut relay_events: mpsc::UnboundedReceiver<ServerMessage>,
        mut peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        let mut relay_open = true;
        loop {
            tokio::select! {
                msg = relay_events.recv(), if relay_open => match msg {
                    Some(msg) => self.on_server_message(msg),
                    None => {
                        warn!(
                            "Relay connection lost, keeping {} open link(s)",
                            self.peers.channels().len()
                        );
                        relay_open = false;
                        self.emit(ClientEvent::RelayLost);
                    }
                },
                event = peer_events.recv() => match event {
                    Some(event) => self.on_peer_event(event).await,
                    None => break,
                },
            }
        }
        self.peers.shutdown();
    }

    fn on_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::RoomMembers(members) => {
                debug!("{} peer(s) already in the room", members.len());
            }
            ServerMessage::UserJoined(peer_id) => self.peers.connect(peer_id),
            ServerMessage::UserLeft(peer_id) => self.peers.close(peer_id),
            ServerMessage::RoomStateUpdate(state) => {
                if !state.is_member(&self.local_id) {
                    debug!("Ignoring state of room {} we are not in", state.id);
                    return;
                }
                self.room.send_replace(Some(state.clone()));
                self.emit(ClientEvent::RoomUpdated(state));
            }
            ServerMessage::Signal { sender, signal } => match PeerSignal::from_value(signal) {
                Ok(signal) => self.peers.handle_signal(sender, signal),
                Err(e) => warn!("Unreadable signal from {}: {}", sender, e),
            },
            ServerMessage::Welcome { .. } | ServerMessage::IceConfig { .. } => {
                debug!("Ignoring repeated handshake message");
            }
        }
    }

    async fn on_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Connected(peer_id) => {
                self.open_peers.send_replace(self.peers.channels().len());
                self.emit(ClientEvent::PeerConnected(peer_id));
            }
            PeerEvent::Disconnected(peer_id) => {
                self.open_peers.send_replace(self.peers.channels().len());
                if let Some(aborted) = self.assembler.peer_closed(&peer_id) {
                    self.emit(ClientEvent::Reception(aborted));
                }
                self.emit(ClientEvent::PeerDisconnected(peer_id));
            }
            PeerEvent::Frame(peer_id, frame) => {
                if let Some(event) = self.assembler.handle_frame(peer_id, frame).await {
                    self.emit(ClientEvent::Reception(event));
                }
            }
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}
