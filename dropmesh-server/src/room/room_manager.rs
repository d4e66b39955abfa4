use crate::room::{Room, RoomCommand};
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use dropmesh_core::{PeerId, RoomId, RoomState};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

struct RoomHandle {
    tx: mpsc::Sender<RoomCommand>,
    generation: u64,
}

/// Registry of live rooms. Each room runs as its own actor; the registry
/// only routes commands and never touches room state itself.
#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    next_generation: Arc<AtomicU64>,
    signaling: Arc<dyn SignalingOutput>,
    queue_capacity: usize,
}

impl RoomManager {
    pub fn new(signaling: Arc<dyn SignalingOutput>, queue_capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            next_generation: Arc::new(AtomicU64::new(0)),
            signaling,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Adds `peer_id` to the room, creating the room if it does not exist.
    pub async fn join(&self, room_id: RoomId, peer_id: PeerId) {
        self.deliver(&room_id, RoomCommand::Join { peer_id }, true)
            .await;
    }

    pub async fn leave(&self, room_id: &RoomId, peer_id: PeerId) {
        self.dispatch(room_id, RoomCommand::Leave { peer_id }).await;
    }

    pub async fn set_permission(
        &self,
        room_id: &RoomId,
        requester: PeerId,
        target: PeerId,
        allowed: bool,
    ) {
        let cmd = RoomCommand::SetPermission {
            requester,
            target,
            allowed,
        };
        self.dispatch(room_id, cmd).await;
    }

    pub async fn set_busy(&self, room_id: &RoomId, peer_id: PeerId, is_busy: bool) {
        self.dispatch(room_id, RoomCommand::SetBusy { peer_id, is_busy })
            .await;
    }

    /// Current state of a room, after every command queued before this call.
    pub async fn snapshot(&self, room_id: &RoomId) -> Option<RoomState> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(room_id, RoomCommand::Snapshot { reply }).await;
        rx.await.ok().flatten()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Remove a room whose state is gone, but only if nothing is queued for
    /// it. Runs under the map's write lock, and every command is enqueued
    /// under its read lock, so no command can land in a retired actor.
    pub(crate) fn retire_if_idle(
        &self,
        room_id: &RoomId,
        generation: u64,
        queue: &mpsc::Receiver<RoomCommand>,
    ) -> bool {
        self.rooms
            .remove_if(room_id, |_, handle| {
                handle.generation == generation && queue.is_empty()
            })
            .is_some()
    }

    /// Missing rooms are not created: commands other than join are no-ops
    /// for rooms that do not exist.
    async fn dispatch(&self, room_id: &RoomId, cmd: RoomCommand) {
        self.deliver(room_id, cmd, false).await;
    }

    async fn deliver(&self, room_id: &RoomId, mut cmd: RoomCommand, create: bool) {
        loop {
            let attempt = if create {
                let handle = self.get_or_create(room_id);
                try_enqueue(&handle, cmd)
            } else {
                match self.rooms.get(room_id) {
                    Some(handle) => try_enqueue(&handle, cmd),
                    None => {
                        debug!("No room {}, dropping {:?}", room_id, cmd);
                        return;
                    }
                }
            };
            let (returned, tx, generation) = match attempt {
                Ok(()) => return,
                Err(pending) => pending,
            };
            cmd = returned;

            // Queue full: wait for capacity outside the lock, then enqueue
            // under it if the room is still the same actor.
            let Ok(permit) = tx.reserve().await else {
                self.rooms
                    .remove_if(room_id, |_, handle| handle.generation == generation);
                continue;
            };
            let current = self.rooms.get(room_id);
            if current.as_ref().map(|handle| handle.generation) == Some(generation) {
                permit.send(cmd);
                return;
            }
        }
    }

    fn get_or_create(&self, room_id: &RoomId) -> RefMut<'_, RoomId, RoomHandle> {
        self.rooms.entry(room_id.clone()).or_insert_with(|| {
            info!("Spawning actor for room {}", room_id);
            let (tx, rx) = mpsc::channel(self.queue_capacity);
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

            let room = Room::new(
                room_id.clone(),
                generation,
                rx,
                self.signaling.clone(),
                self.clone(),
            );
            tokio::spawn(room.run());

            RoomHandle { tx, generation }
        })
    }
}

/// Enqueue without waiting. Called with the map guard held.
fn try_enqueue(
    handle: &RoomHandle,
    cmd: RoomCommand,
) -> Result<(), (RoomCommand, mpsc::Sender<RoomCommand>, u64)> {
    match handle.tx.try_send(cmd) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(cmd)) | Err(TrySendError::Closed(cmd)) => {
            Err((cmd, handle.tx.clone(), handle.generation))
        }
    }
}
