//! Relay server: the room registry and the signaling relay behind one
//! WebSocket endpoint.

mod config;
mod room;
mod server;
mod signaling;

pub use config::{DEFAULT_PORT, DEFAULT_STUN_SERVER, ServerConfig};
pub use room::*;
pub use server::{RelayState, router, serve, serve_with_listener};
pub use signaling::*;
