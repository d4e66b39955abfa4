use crate::peer::SignalSink;
use crate::transfer::RoomControl;
use crate::transport::PeerSignal;
use async_trait::async_trait;
use dropmesh_core::{ClientMessage, IceServerConfig, PeerId, RoomId, ServerMessage};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to connect to relay: {0}")]
    Connect(#[from] tungstenite::Error),

    #[error("Relay handshake failed: {0}")]
    Handshake(String),

    #[error("Relay connection closed")]
    Closed,
}

/// Sending half of a relay connection. Cheap to clone.
#[derive(Clone)]
pub struct RelayClient {
    peer_id: PeerId,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

/// A relay connection that finished its handshake.
pub struct RelaySession {
    pub client: RelayClient,
    /// Servers announced by the relay in `ice-config`.
    pub ice_servers: Vec<IceServerConfig>,
    /// Every server event after the handshake, in arrival order.
    pub events: mpsc::UnboundedReceiver<ServerMessage>,
}

impl RelayClient {
    /// Connect to the relay and wait for `welcome` and `ice-config`.
    pub async fn connect(url: &str) -> Result<RelaySession, RelayError> {
        let (stream, _) = connect_async(url).await?;
        info!("Connected to relay at {}", url);
        let (mut sink, mut source) = stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<ClientMessage>();
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Dropping unencodable relay message: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let (event_tx, mut events) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Relay connection error: {}", e);
                        break;
                    }
                };
                match serde_json::from_str::<ServerMessage>(text.as_str()) {
                    Ok(event) => {
                        if event_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Invalid ServerMessage from relay: {}", e),
                }
            }
            debug!("Relay reader finished");
        });

        let peer_id = match next_event(&mut events).await? {
            ServerMessage::Welcome { peer_id } => peer_id,
            other => {
                return Err(RelayError::Handshake(format!(
                    "expected welcome, got {other:?}"
                )));
            }
        };
        let ice_servers = match next_event(&mut events).await? {
            ServerMessage::IceConfig { ice_servers } => ice_servers,
            other => {
                return Err(RelayError::Handshake(format!(
                    "expected ice-config, got {other:?}"
                )));
            }
        };
        info!("Relay assigned peer id {}", peer_id);

        Ok(RelaySession {
            client: RelayClient { peer_id, outgoing },
            ice_servers,
            events,
        })
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn send(&self, msg: ClientMessage) -> Result<(), RelayError> {
        self.outgoing.send(msg).map_err(|_| RelayError::Closed)
    }

    pub fn join_room(&self, room_id: RoomId) -> Result<(), RelayError> {
        self.send(ClientMessage::JoinRoom(room_id))
    }

    pub fn leave_room(&self, room_id: RoomId) -> Result<(), RelayError> {
        self.send(ClientMessage::LeaveRoom(room_id))
    }

    pub fn set_permission(
        &self,
        room_id: RoomId,
        user_id: PeerId,
        allowed: bool,
    ) -> Result<(), RelayError> {
        self.send(ClientMessage::SetPermission {
            room_id,
            user_id,
            allowed,
        })
    }
}

async fn next_event(
    events: &mut mpsc::UnboundedReceiver<ServerMessage>,
) -> Result<ServerMessage, RelayError> {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, events.recv()).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(RelayError::Closed),
        Err(_) => Err(RelayError::Handshake("timed out".to_owned())),
    }
}

#[async_trait]
impl SignalSink for RelayClient {
    async fn send_signal(&self, target: PeerId, signal: PeerSignal) {
        let signal = match signal.to_value() {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode signal for {}: {}", target, e);
                return;
            }
        };
        if let Err(e) = self.send(ClientMessage::Signal { target, signal }) {
            warn!("Signal not sent: {}", e);
        }
    }
}

#[async_trait]
impl RoomControl for RelayClient {
    async fn set_busy(&self, room_id: &RoomId, busy: bool) {
        let msg = ClientMessage::TransferStatus {
            room_id: room_id.clone(),
            is_busy: busy,
        };
        if let Err(e) = self.send(msg) {
            warn!("Transfer status not sent: {}", e);
        }
    }
}
