use crate::transport::PeerSignal;
use bytes::Bytes;
use dropmesh_core::PeerId;

/// Events a transport reports back to the peer manager.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local signaling payload that must reach the remote peer.
    Signal(PeerId, PeerSignal),

    /// The channel is usable for sending.
    Open(PeerId),

    /// One whole channel message from the remote peer.
    Data(PeerId, Bytes),

    /// The connection ended or failed beyond recovery.
    Closed(PeerId),
}
