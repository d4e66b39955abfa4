use dropmesh_core::{PeerId, RoomState};
use tokio::sync::oneshot;

/// Commands a room actor accepts. Everything that mutates a room goes
/// through here, so mutations of one room are applied one at a time.
#[derive(Debug)]
pub enum RoomCommand {
    /// A client asked to enter the room.
    Join { peer_id: PeerId },

    /// A client left the room or its connection dropped.
    Leave { peer_id: PeerId },

    /// Grant or revoke send permission. Only honoured for the host.
    SetPermission {
        requester: PeerId,
        target: PeerId,
        allowed: bool,
    },

    /// Raise or clear the advisory transfer lock.
    SetBusy { peer_id: PeerId, is_busy: bool },

    /// Read the current state without changing it.
    Snapshot {
        reply: oneshot::Sender<Option<RoomState>>,
    },
}
