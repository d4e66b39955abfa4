use crate::transport::PeerSignal;
use async_trait::async_trait;
use dropmesh_core::PeerId;

/// Outgoing half of the relay, as seen by the peer manager.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn send_signal(&self, target: PeerId, signal: PeerSignal);
}
