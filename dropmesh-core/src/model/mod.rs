mod peer;
mod room;
mod signaling;

pub use peer::{PeerId, PeerIdError};
pub use room::{RoomId, RoomState};
pub use signaling::{ClientMessage, IceServerConfig, ServerMessage, SignalEnvelope};
