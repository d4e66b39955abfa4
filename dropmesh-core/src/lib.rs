//! Wire model shared by the dropmesh relay server and its clients.
//!
//! Two protocols live here: the JSON relay protocol spoken over the
//! WebSocket connection to the server ([`ClientMessage`] / [`ServerMessage`]),
//! and the framed protocol spoken directly between peers over a data
//! channel ([`Frame`] / [`ControlFrame`]).

pub mod frame;
pub mod model;

pub use frame::{ControlFrame, FRAME_HEADER_LEN, Frame, FrameError};
pub use model::*;
