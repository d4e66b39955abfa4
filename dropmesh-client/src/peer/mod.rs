mod open_channels;
mod peer_event;
mod peer_link;
mod peer_manager;
mod signal_sink;

pub use open_channels::OpenChannels;
pub use peer_event::PeerEvent;
pub use peer_link::{LinkState, PeerLink};
pub use peer_manager::PeerManager;
pub use signal_sink::SignalSink;
