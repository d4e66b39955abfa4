use crate::transport::{PeerSignal, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use dropmesh_core::PeerId;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection setup failed: {0}")]
    Setup(String),

    #[error("Signal could not be applied: {0}")]
    Signal(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Channel is not open")]
    NotOpen,

    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),
}

/// A point-to-point, ordered, reliable byte channel to one remote peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Apply a signaling payload received from the remote peer.
    async fn signal(&self, signal: PeerSignal) -> Result<(), TransportError>;

    /// Queue one whole message for delivery.
    async fn send(&self, data: Bytes) -> Result<(), TransportError>;

    /// Bytes queued locally but not yet handed to the network.
    async fn buffered_amount(&self) -> usize;

    fn is_open(&self) -> bool;

    async fn close(&self);
}

/// Builds transports for the peer manager.
///
/// The initiator side starts negotiation on its own and reports its offer
/// through `events`; the responder waits for the first remote signal.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        peer_id: PeerId,
        initiator: bool,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>, TransportError>;
}
