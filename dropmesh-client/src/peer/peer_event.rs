use dropmesh_core::{Frame, PeerId};

/// What the peer manager reports to the rest of the client.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// The link is open and listed in [`OpenChannels`](crate::OpenChannels).
    Connected(PeerId),
    /// An open link went away; sessions on it must be aborted.
    Disconnected(PeerId),
    Frame(PeerId, Frame),
}
