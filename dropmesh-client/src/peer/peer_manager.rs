use crate::peer::{LinkState, OpenChannels, PeerEvent, PeerLink, SignalSink};
use crate::transport::{PeerSignal, PeerTransport, TransportError, TransportEvent, TransportFactory};
use dropmesh_core::{Frame, PeerId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

enum PeerCommand {
    Connect(PeerId),
    Signal(PeerId, PeerSignal),
    Close(PeerId),
    Constructed {
        peer_id: PeerId,
        epoch: u64,
        result: Result<Arc<dyn PeerTransport>, TransportError>,
    },
    Transport {
        epoch: u64,
        event: TransportEvent,
    },
    Links(oneshot::Sender<BTreeMap<PeerId, LinkState>>),
    Shutdown,
}

/// Handle to the task that owns every [`PeerLink`] of this client.
///
/// Requests are queued and applied one at a time, so a link is always
/// registered before any later request for the same peer is looked at.
#[derive(Clone)]
pub struct PeerManager {
    local_id: PeerId,
    tx: mpsc::UnboundedSender<PeerCommand>,
    channels: OpenChannels,
}

impl PeerManager {
    pub fn spawn(
        local_id: PeerId,
        factory: Arc<dyn TransportFactory>,
        signals: Arc<dyn SignalSink>,
    ) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let channels = OpenChannels::new();

        let actor = LinkActor {
            local_id: local_id.clone(),
            factory,
            signals,
            channels: channels.clone(),
            links: HashMap::new(),
            next_epoch: 0,
            commands: tx.downgrade(),
            events: event_tx,
        };
        tokio::spawn(actor.run(rx));

        let manager = Self {
            local_id,
            tx,
            channels,
        };
        (manager, event_rx)
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn channels(&self) -> &OpenChannels {
        &self.channels
    }

    /// Open a link to `peer_id` as the initiating side. No-op if one exists.
    pub fn connect(&self, peer_id: PeerId) {
        self.submit(PeerCommand::Connect(peer_id));
    }

    /// Route a signaling payload from `from` to its link, creating a
    /// responder link if there is none.
    pub fn handle_signal(&self, from: PeerId, signal: PeerSignal) {
        self.submit(PeerCommand::Signal(from, signal));
    }

    pub fn close(&self, peer_id: PeerId) {
        self.submit(PeerCommand::Close(peer_id));
    }

    /// Current state of every link.
    pub async fn link_states(&self) -> BTreeMap<PeerId, LinkState> {
        let (reply, rx) = oneshot::channel();
        self.submit(PeerCommand::Links(reply));
        rx.await.unwrap_or_default()
    }

    /// Close every link and stop the manager task.
    pub fn shutdown(&self) {
        self.submit(PeerCommand::Shutdown);
    }

    fn submit(&self, cmd: PeerCommand) {
        if self.tx.send(cmd).is_err() {
            debug!("Peer manager for {} is stopped", self.local_id);
        }
    }
}

struct LinkActor {
    local_id: PeerId,
    factory: Arc<dyn TransportFactory>,
    signals: Arc<dyn SignalSink>,
    channels: OpenChannels,
    links: HashMap<PeerId, PeerLink>,
    next_epoch: u64,
    commands: mpsc::WeakUnboundedSender<PeerCommand>,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl LinkActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PeerCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                PeerCommand::Connect(peer_id) => self.connect(peer_id),
                PeerCommand::Signal(from, signal) => self.on_signal(from, signal).await,
                PeerCommand::Close(peer_id) => self.teardown(&peer_id, "closed locally").await,
                PeerCommand::Constructed {
                    peer_id,
                    epoch,
                    result,
                } => self.on_constructed(peer_id, epoch, result).await,
                PeerCommand::Transport { epoch, event } => {
                    self.on_transport_event(epoch, event).await
                }
                PeerCommand::Links(reply) => {
                    let states = self
                        .links
                        .iter()
                        .map(|(id, link)| (id.clone(), link.state))
                        .collect();
                    let _ = reply.send(states);
                }
                PeerCommand::Shutdown => break,
            }
        }

        let peers: Vec<_> = self.links.keys().cloned().collect();
        for peer_id in peers {
            self.teardown(&peer_id, "shutting down").await;
        }
        info!("Peer manager for {} stopped", self.local_id);
    }

    fn connect(&mut self, peer_id: PeerId) {
        if peer_id == self.local_id {
            return;
        }
        if self.links.contains_key(&peer_id) {
            debug!("Link to {} already exists", peer_id);
            return;
        }
        self.register(peer_id, true, None);
    }

    /// Record the link first, then build its transport in the background.
    fn register(&mut self, peer_id: PeerId, initiator: bool, first_signal: Option<PeerSignal>) {
        self.next_epoch += 1;
        let epoch = self.next_epoch;

        let mut link = PeerLink::pending(peer_id.clone(), initiator, epoch);
        if let Some(signal) = first_signal {
            link.enqueue(signal);
        }
        self.links.insert(peer_id.clone(), link);
        info!(
            "Opening link to {} as {}",
            peer_id,
            if initiator { "initiator" } else { "responder" }
        );

        let factory = self.factory.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let (event_tx, mut event_rx) = mpsc::unbounded_channel();
            let result = factory.create(peer_id.clone(), initiator, event_tx).await;

            let Some(tx) = commands.upgrade() else {
                if let Ok(transport) = result {
                    transport.close().await;
                }
                return;
            };
            let built = result.is_ok();
            let constructed = PeerCommand::Constructed {
                peer_id,
                epoch,
                result,
            };
            if tx.send(constructed).is_err() || !built {
                return;
            }
            drop(tx);

            while let Some(event) = event_rx.recv().await {
                let Some(tx) = commands.upgrade() else { break };
                if tx.send(PeerCommand::Transport { epoch, event }).is_err() {
                    break;
                }
            }
        });
    }

    async fn on_signal(&mut self, from: PeerId, signal: PeerSignal) {
        if from == self.local_id {
            warn!("Ignoring signal addressed from ourselves");
            return;
        }

        let collision = match self.links.get(&from) {
            None => {
                debug!("Signal from unknown peer {}, answering as responder", from);
                self.register(from, false, Some(signal));
                return;
            }
            Some(link) => signal.is_offer() && link.initiator,
        };
        if collision {
            self.resolve_collision(from, signal).await;
            return;
        }

        let Some(link) = self.links.get_mut(&from) else {
            return;
        };
        match link.transport().cloned() {
            Some(transport) => {
                if let Err(e) = transport.signal(signal).await {
                    warn!("Failed to apply signal from {}: {}", from, e);
                }
            }
            None => {
                link.enqueue(signal);
                debug!("Queued signal for {} ({} waiting)", from, link.queued_signals());
            }
        }
    }

    /// Both sides sent an offer. The higher id drops its own attempt and
    /// answers; the lower id keeps its offer and ignores theirs.
    async fn resolve_collision(&mut self, from: PeerId, offer: PeerSignal) {
        if self.local_id > from {
            info!("Offer collision with {}: answering theirs", from);
            self.teardown(&from, "offer collision").await;
            self.register(from, false, Some(offer));
        } else {
            debug!("Offer collision with {}: keeping ours", from);
        }
    }

    async fn on_constructed(
        &mut self,
        peer_id: PeerId,
        epoch: u64,
        result: Result<Arc<dyn PeerTransport>, TransportError>,
    ) {
        let Some(link) = self
            .links
            .get_mut(&peer_id)
            .filter(|link| link.epoch == epoch)
        else {
            if let Ok(transport) = result {
                debug!("Discarding transport for a replaced link to {}", peer_id);
                transport.close().await;
            }
            return;
        };

        match result {
            Ok(transport) => {
                let queued = link.attach(transport.clone());
                debug!(
                    "Transport to {} ready, applying {} queued signal(s)",
                    peer_id,
                    queued.len()
                );
                for signal in queued {
                    if let Err(e) = transport.signal(signal).await {
                        warn!("Failed to apply queued signal from {}: {}", peer_id, e);
                    }
                }
            }
            Err(e) => {
                warn!("Failed to build transport to {}: {}", peer_id, e);
                self.teardown(&peer_id, "setup failed").await;
            }
        }
    }

    async fn on_transport_event(&mut self, epoch: u64, event: TransportEvent) {
        let peer_id = match &event {
            TransportEvent::Signal(peer_id, _)
            | TransportEvent::Open(peer_id)
            | TransportEvent::Data(peer_id, _)
            | TransportEvent::Closed(peer_id) => peer_id.clone(),
        };
        let current = self
            .links
            .get(&peer_id)
            .is_some_and(|link| link.epoch == epoch);
        if !current {
            debug!("Ignoring event from a replaced transport to {}", peer_id);
            return;
        }

        match event {
            TransportEvent::Signal(target, signal) => {
                self.signals.send_signal(target, signal).await;
            }
            TransportEvent::Open(peer_id) => {
                let Some(link) = self.links.get_mut(&peer_id) else {
                    return;
                };
                let Some(transport) = link.transport().cloned() else {
                    return;
                };
                link.state = LinkState::Open;
                self.channels.insert(peer_id.clone(), transport);
                info!("Link to {} is open", peer_id);
                let _ = self.events.send(PeerEvent::Connected(peer_id));
            }
            TransportEvent::Data(peer_id, bytes) => match Frame::decode(bytes) {
                Ok(frame) => {
                    let _ = self.events.send(PeerEvent::Frame(peer_id, frame));
                }
                Err(e) => warn!("Discarding malformed frame from {}: {}", peer_id, e),
            },
            TransportEvent::Closed(peer_id) => {
                self.teardown(&peer_id, "transport closed").await;
            }
        }
    }

    async fn teardown(&mut self, peer_id: &PeerId, reason: &str) {
        let Some(mut link) = self.links.remove(peer_id) else {
            return;
        };
        info!("Link to {} closed: {}", peer_id, reason);

        // Out of the target set before the transport is torn down.
        let was_open = self.channels.remove(peer_id).is_some();
        if let Some(transport) = link.take_transport() {
            transport.close().await;
        }
        if was_open {
            let _ = self.events.send(PeerEvent::Disconnected(peer_id.clone()));
        }
    }
}
