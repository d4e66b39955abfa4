mod fragment;
mod peer_signal;
mod peer_transport;
mod transport_event;
mod webrtc_transport;

pub use peer_signal::PeerSignal;
pub use peer_transport::{PeerTransport, TransportError, TransportFactory};
pub use transport_event::TransportEvent;
pub use webrtc_transport::{WebRtcFactory, WebRtcTransport};
