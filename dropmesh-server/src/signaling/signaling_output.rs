use async_trait::async_trait;
use dropmesh_core::{PeerId, ServerMessage};

/// Outbound side of the relay: how rooms reach connected clients.
///
/// Delivery is best effort. A message for a client that is no longer
/// connected is dropped.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send(&self, peer_id: PeerId, msg: ServerMessage);
}
