use crate::transport::{PeerSignal, PeerTransport};
use dropmesh_core::PeerId;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Registered, transport still being built.
    Pending,
    /// Transport exists, negotiation in progress.
    Signaling,
    Open,
    Closed,
}

/// The manager's record of one remote peer.
pub struct PeerLink {
    pub peer_id: PeerId,
    pub state: LinkState,
    pub initiator: bool,
    /// Distinguishes this link from an earlier one to the same peer.
    pub(crate) epoch: u64,
    signal_queue: VecDeque<PeerSignal>,
    transport: Option<Arc<dyn PeerTransport>>,
}

impl PeerLink {
    pub(crate) fn pending(peer_id: PeerId, initiator: bool, epoch: u64) -> Self {
        Self {
            peer_id,
            state: LinkState::Pending,
            initiator,
            epoch,
            signal_queue: VecDeque::new(),
            transport: None,
        }
    }

    pub fn transport(&self) -> Option<&Arc<dyn PeerTransport>> {
        self.transport.as_ref()
    }

    pub fn queued_signals(&self) -> usize {
        self.signal_queue.len()
    }

    /// Hold a signal until the transport exists. Returns false once it does.
    pub(crate) fn enqueue(&mut self, signal: PeerSignal) -> bool {
        if self.transport.is_some() {
            return false;
        }
        self.signal_queue.push_back(signal);
        true
    }

    /// Install the transport and hand back everything queued so far, oldest
    /// first.
    pub(crate) fn attach(&mut self, transport: Arc<dyn PeerTransport>) -> Vec<PeerSignal> {
        self.transport = Some(transport);
        self.state = LinkState::Signaling;
        self.signal_queue.drain(..).collect()
    }

    pub(crate) fn take_transport(&mut self) -> Option<Arc<dyn PeerTransport>> {
        self.state = LinkState::Closed;
        self.transport.take()
    }
}
