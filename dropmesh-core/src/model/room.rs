use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

const GENERATED_ROOM_ID_LEN: usize = 7;

/// Human-shareable room name. Any non-empty string is a valid id.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RoomId(pub String);

impl RoomId {
    /// Short random lowercase id suitable for reading out loud.
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(raw[..GENERATED_ROOM_ID_LEN].to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a room as broadcast in `room-state-update`.
///
/// Invariants upheld by the server: `host` is a member whenever `members` is
/// non-empty, and `allowed_senders` is a subset of `members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub id: RoomId,
    pub host: PeerId,
    pub members: BTreeSet<PeerId>,
    pub allowed_senders: BTreeSet<PeerId>,
    pub is_busy: bool,
}

impl RoomState {
    /// A fresh room owned by `creator`, who is its host and only sender.
    pub fn new(id: RoomId, creator: PeerId) -> Self {
        Self {
            id,
            host: creator.clone(),
            members: BTreeSet::from([creator.clone()]),
            allowed_senders: BTreeSet::from([creator]),
            is_busy: false,
        }
    }

    pub fn is_member(&self, peer_id: &PeerId) -> bool {
        self.members.contains(peer_id)
    }

    pub fn is_host(&self, peer_id: &PeerId) -> bool {
        &self.host == peer_id
    }

    pub fn can_send(&self, peer_id: &PeerId) -> bool {
        self.allowed_senders.contains(peer_id)
    }

    pub fn is_consistent(&self) -> bool {
        let host_ok = self.members.is_empty() || self.members.contains(&self.host);
        host_ok && self.allowed_senders.is_subset(&self.members)
    }
}
