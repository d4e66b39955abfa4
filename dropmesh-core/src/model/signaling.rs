use crate::model::peer::PeerId;
use crate::model::room::{RoomId, RoomState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom(RoomId),
    LeaveRoom(RoomId),
    /// Opaque connection-setup payload for one other client.
    Signal {
        target: PeerId,
        signal: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    SetPermission {
        room_id: RoomId,
        user_id: PeerId,
        allowed: bool,
    },
    #[serde(rename_all = "camelCase")]
    TransferStatus { room_id: RoomId, is_busy: bool },
}

/// Events the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Welcome { peer_id: PeerId },
    #[serde(rename_all = "camelCase")]
    IceConfig { ice_servers: Vec<IceServerConfig> },
    RoomMembers(Vec<PeerId>),
    RoomStateUpdate(RoomState),
    UserJoined(PeerId),
    UserLeft(PeerId),
    Signal {
        sender: PeerId,
        signal: serde_json::Value,
    },
}

/// A signaling payload in transit between two clients. The relay routes it
/// by `target_id` and never looks inside `payload`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    pub sender_id: PeerId,
    pub target_id: PeerId,
    pub payload: serde_json::Value,
}

impl SignalEnvelope {
    pub fn into_delivery(self) -> (PeerId, ServerMessage) {
        let msg = ServerMessage::Signal {
            sender: self.sender_id,
            signal: self.payload,
        };
        (self.target_id, msg)
    }
}
