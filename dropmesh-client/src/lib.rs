//! Client side of dropmesh: relay connection, peer links and file
//! transfer over them.

mod client;
mod config;
pub mod peer;
pub mod relay;
pub mod transfer;
pub mod transport;

pub use client::{ClientError, ClientEvent, DropClient};
pub use config::{
    ClientConfig, DEFAULT_BACKPRESSURE_POLL, DEFAULT_CHUNK_SIZE, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_HIGH_WATER_MARK, DEFAULT_SERVER_URL,
};
pub use peer::{LinkState, OpenChannels, PeerEvent, PeerLink, PeerManager, SignalSink};
pub use relay::{RelayClient, RelayError, RelaySession};
pub use transfer::*;
pub use transport::*;
