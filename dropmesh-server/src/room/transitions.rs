use dropmesh_core::{PeerId, RoomState};

/// What happened to a room when a member walked out.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Departure {
    NotMember,
    /// The last member left; the room should be destroyed.
    Emptied,
    /// Others remain. `new_host` is set when the host was the one leaving.
    Left { new_host: Option<PeerId> },
}

/// Returns `true` if the peer was not already a member.
pub(crate) fn admit(state: &mut RoomState, peer_id: &PeerId) -> bool {
    state.members.insert(peer_id.clone())
}

pub(crate) fn depart(state: &mut RoomState, peer_id: &PeerId) -> Departure {
    if !state.members.remove(peer_id) {
        return Departure::NotMember;
    }
    state.allowed_senders.remove(peer_id);

    if !state.is_host(peer_id) {
        return Departure::Left { new_host: None };
    }

    // Lowest remaining id takes over.
    let Some(successor) = state.members.first().cloned() else {
        return Departure::Emptied;
    };
    state.host = successor.clone();
    state.allowed_senders.insert(successor.clone());

    Departure::Left {
        new_host: Some(successor),
    }
}

/// Returns `true` if the change was authorized and applied.
pub(crate) fn grant(
    state: &mut RoomState,
    requester: &PeerId,
    target: &PeerId,
    allowed: bool,
) -> bool {
    if !state.is_host(requester) || !state.is_member(target) {
        return false;
    }

    if allowed {
        state.allowed_senders.insert(target.clone());
    } else {
        state.allowed_senders.remove(target);
    }
    true
}

/// Returns `true` if the requester is a member and the flag was written.
pub(crate) fn mark_busy(state: &mut RoomState, requester: &PeerId, is_busy: bool) -> bool {
    if !state.is_member(requester) {
        return false;
    }
    state.is_busy = is_busy;
    true
}
