use crate::transport::{PeerTransport, TransportError};
use bytes::Bytes;
use dashmap::DashMap;
use dropmesh_core::PeerId;
use std::sync::Arc;
use tracing::error;

/// Links that reached the open state, keyed by remote peer.
///
/// Cheap to clone; the peer manager inserts and removes entries, everyone
/// else only reads and sends.
#[derive(Clone, Default)]
pub struct OpenChannels {
    peers: Arc<DashMap<PeerId, Arc<dyn PeerTransport>>>,
}

impl OpenChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, peer_id: PeerId, transport: Arc<dyn PeerTransport>) {
        self.peers.insert(peer_id, transport);
    }

    pub(crate) fn remove(&self, peer_id: &PeerId) -> Option<Arc<dyn PeerTransport>> {
        self.peers.remove(peer_id).map(|(_, transport)| transport)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<Arc<dyn PeerTransport>> {
        self.peers.get(peer_id).map(|entry| entry.value().clone())
    }

    /// Send one message to a single peer.
    pub async fn send(&self, peer_id: &PeerId, data: Bytes) -> Result<(), TransportError> {
        let transport = self.get(peer_id).ok_or(TransportError::NotOpen)?;
        transport.send(data).await
    }

    /// Send one message to every open peer; returns how many accepted it.
    pub async fn broadcast(&self, data: Bytes) -> usize {
        // Collect first so no map guard is held across an await.
        let targets: Vec<_> = self
            .peers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        for (peer_id, transport) in targets {
            match transport.send(data.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => error!("Broadcast to {} failed: {}", peer_id, e),
            }
        }
        delivered
    }

    pub fn list_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<_> = self.peers.iter().map(|entry| entry.key().clone()).collect();
        peers.sort();
        peers
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
