use async_trait::async_trait;
use dashmap::DashMap;
use dropmesh_client::{PeerManager, PeerSignal, SignalSink};
use dropmesh_core::PeerId;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A signal as it crossed the relay.
#[derive(Debug, Clone)]
pub struct RelayedSignal {
    pub from: PeerId,
    pub to: PeerId,
    pub signal: PeerSignal,
}

/// In-memory stand-in for the signaling relay: forwards straight into the
/// target's peer manager.
#[derive(Clone, Default)]
pub struct MockRelay {
    managers: Arc<DashMap<PeerId, PeerManager>>,
    log: Arc<Mutex<Vec<RelayedSignal>>>,
}

impl MockRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, manager: PeerManager) {
        self.managers.insert(manager.local_id().clone(), manager);
    }

    pub fn sink_for(&self, local: PeerId) -> Arc<dyn SignalSink> {
        Arc::new(RelayEndpoint {
            local,
            relay: self.clone(),
        })
    }

    pub async fn signals_from(&self, from: &PeerId) -> Vec<PeerSignal> {
        self.log
            .lock()
            .await
            .iter()
            .filter(|s| &s.from == from)
            .map(|s| s.signal.clone())
            .collect()
    }
}

struct RelayEndpoint {
    local: PeerId,
    relay: MockRelay,
}

#[async_trait]
impl SignalSink for RelayEndpoint {
    async fn send_signal(&self, target: PeerId, signal: PeerSignal) {
        tracing::debug!("[MockRelay] {} -> {}: {:?}", self.local, target, signal);
        self.relay.log.lock().await.push(RelayedSignal {
            from: self.local.clone(),
            to: target.clone(),
            signal: signal.clone(),
        });

        // Clone out of the map so no shard lock is held while forwarding.
        let manager = self.relay.managers.get(&target).map(|m| m.value().clone());
        if let Some(manager) = manager {
            manager.handle_signal(self.local.clone(), signal);
        }
    }
}
