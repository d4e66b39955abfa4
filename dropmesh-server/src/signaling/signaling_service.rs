use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use dropmesh_core::{IceServerConfig, PeerId, ServerMessage, SignalEnvelope};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

struct SignalingInner {
    peers: DashMap<PeerId, mpsc::UnboundedSender<Message>>,
    ice_servers: Vec<IceServerConfig>,
}

/// Connected clients keyed by their relay-assigned id.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                peers: DashMap::new(),
                ice_servers,
            }),
        }
    }

    pub fn get_ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    pub fn add_peer(&self, peer_id: PeerId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.peers.insert(peer_id, tx);
    }

    pub fn remove_peer(&self, peer_id: &PeerId) {
        self.inner.peers.remove(peer_id);
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.inner.peers.contains_key(peer_id)
    }

    pub fn connected_count(&self) -> usize {
        self.inner.peers.len()
    }

    /// Forward a signaling payload to its target only. Payloads for targets
    /// that are not connected are dropped; retrying is the client's job.
    pub fn relay(&self, envelope: SignalEnvelope) {
        if !self.is_connected(&envelope.target_id) {
            debug!(
                "Dropping signal from {} to disconnected peer {}",
                envelope.sender_id, envelope.target_id
            );
            return;
        }
        let (target, msg) = envelope.into_delivery();
        self.send_message(&target, msg);
    }

    pub fn send_message(&self, peer_id: &PeerId, msg: ServerMessage) {
        if let Some(peer) = self.inner.peers.get(peer_id) {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if let Err(e) = peer.send(Message::Text(json.into())) {
                        error!("Failed to send WS message to {:?}: {:?}", peer_id, e);
                    }
                }
                Err(e) => error!("Failed to serialize server message: {}", e),
            }
        } else {
            warn!("Attempted to send to disconnected peer {:?}", peer_id);
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn send(&self, peer_id: PeerId, msg: ServerMessage) {
        self.send_message(&peer_id, msg);
    }
}
