use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dropmesh_client::{PeerSignal, PeerTransport, TransportError, TransportEvent, TransportFactory};
use dropmesh_core::PeerId;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, watch};

/// In-memory network of paired transports.
///
/// An initiator announces a fake offer, the responder answers, and once the
/// initiator applies that answer both ends open and deliver to each other.
#[derive(Clone)]
pub struct MockNetwork {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    /// Latest transport per (local, remote) pair.
    endpoints: DashMap<(PeerId, PeerId), Arc<MockTransport>>,
    gate: watch::Sender<bool>,
    created: AtomicUsize,
    frames_sent: AtomicUsize,
    buffered: AtomicUsize,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                endpoints: DashMap::new(),
                gate: watch::channel(true).0,
                created: AtomicUsize::new(0),
                frames_sent: AtomicUsize::new(0),
                buffered: AtomicUsize::new(0),
            }),
        }
    }

    pub fn factory(&self, local: PeerId) -> Arc<dyn TransportFactory> {
        Arc::new(MockFactory {
            local,
            net: self.inner.clone(),
        })
    }

    /// Make every `create` wait until `release_construction`.
    pub fn hold_construction(&self) {
        self.inner.gate.send_replace(false);
    }

    pub fn release_construction(&self) {
        self.inner.gate.send_replace(true);
    }

    /// Buffered amount every transport reports from now on.
    pub fn set_buffered_amount(&self, bytes: usize) {
        self.inner.buffered.store(bytes, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    /// Frames accepted by any transport since the network was made.
    pub fn frames_sent(&self) -> usize {
        self.inner.frames_sent.load(Ordering::SeqCst)
    }

    pub fn transport(&self, local: &PeerId, remote: &PeerId) -> Option<Arc<MockTransport>> {
        self.inner
            .endpoints
            .get(&(local.clone(), remote.clone()))
            .map(|entry| entry.value().clone())
    }
}

struct MockFactory {
    local: PeerId,
    net: Arc<NetworkInner>,
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create(
        &self,
        peer_id: PeerId,
        initiator: bool,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>, TransportError> {
        let mut gate = self.net.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(TransportError::Setup("network dropped".into()));
        }

        self.net.created.fetch_add(1, Ordering::SeqCst);
        let transport = Arc::new(MockTransport {
            local: self.local.clone(),
            remote: peer_id.clone(),
            net: Arc::downgrade(&self.net),
            events,
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            partner: Mutex::new(Weak::new()),
            applied: Mutex::new(Vec::new()),
        });
        self.net
            .endpoints
            .insert((self.local.clone(), peer_id), transport.clone());

        if initiator {
            transport.emit_signal(PeerSignal::Offer {
                sdp: format!("offer from {}", self.local),
            });
        }
        Ok(transport)
    }
}

pub struct MockTransport {
    local: PeerId,
    remote: PeerId,
    net: Weak<NetworkInner>,
    events: mpsc::UnboundedSender<TransportEvent>,
    open: AtomicBool,
    closed: AtomicBool,
    partner: Mutex<Weak<MockTransport>>,
    applied: Mutex<Vec<PeerSignal>>,
}

impl MockTransport {
    /// Every signal applied so far, in order.
    pub fn applied_signals(&self) -> Vec<PeerSignal> {
        self.applied.lock().unwrap().clone()
    }

    /// Push raw bytes to the partner, bypassing framing.
    pub fn inject_raw(&self, data: Bytes) -> bool {
        match self.partner() {
            Some(partner) => partner
                .events
                .send(TransportEvent::Data(self.local.clone(), data))
                .is_ok(),
            None => false,
        }
    }

    fn partner(&self) -> Option<Arc<MockTransport>> {
        self.partner.lock().unwrap().upgrade()
    }

    fn emit_signal(&self, signal: PeerSignal) {
        let _ = self
            .events
            .send(TransportEvent::Signal(self.remote.clone(), signal));
    }

    /// The answer came back: connect to whatever the remote side holds now.
    fn pair(&self) {
        let Some(net) = self.net.upgrade() else { return };
        let me = net
            .endpoints
            .get(&(self.local.clone(), self.remote.clone()))
            .map(|e| e.value().clone());
        let partner = net
            .endpoints
            .get(&(self.remote.clone(), self.local.clone()))
            .map(|e| e.value().clone());
        let (Some(me), Some(partner)) = (me, partner) else {
            return;
        };
        if me.closed.load(Ordering::SeqCst) || partner.closed.load(Ordering::SeqCst) {
            return;
        }

        *me.partner.lock().unwrap() = Arc::downgrade(&partner);
        *partner.partner.lock().unwrap() = Arc::downgrade(&me);
        for end in [&me, &partner] {
            end.open.store(true, Ordering::SeqCst);
            let _ = end.events.send(TransportEvent::Open(end.remote.clone()));
        }
    }

    fn remote_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open.store(false, Ordering::SeqCst);
            let _ = self.events.send(TransportEvent::Closed(self.remote.clone()));
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn signal(&self, signal: PeerSignal) -> Result<(), TransportError> {
        self.applied.lock().unwrap().push(signal.clone());
        match signal {
            PeerSignal::Offer { .. } => self.emit_signal(PeerSignal::Answer {
                sdp: format!("answer from {}", self.local),
            }),
            PeerSignal::Answer { .. } => self.pair(),
            PeerSignal::Candidate { .. } => {}
        }
        Ok(())
    }

    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let partner = self
            .partner()
            .ok_or_else(|| TransportError::SendFailed("partner gone".into()))?;
        partner
            .events
            .send(TransportEvent::Data(self.local.clone(), data))
            .map_err(|_| TransportError::SendFailed("partner stopped".into()))?;

        if let Some(net) = self.net.upgrade() {
            net.frames_sent.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn buffered_amount(&self) -> usize {
        self.net
            .upgrade()
            .map(|net| net.buffered.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.open.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Closed(self.remote.clone()));
        if let Some(partner) = self.partner() {
            partner.remote_closed();
        }
    }
}
