use crate::room::room_command::RoomCommand;
use crate::room::room_manager::RoomManager;
use crate::room::transitions::{self, Departure};
use crate::signaling::SignalingOutput;
use dropmesh_core::{PeerId, RoomId, RoomState, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Actor owning one room's state.
///
/// Commands are processed strictly in arrival order. Once the last member
/// leaves the actor keeps draining its queue, so a join queued behind that
/// leave recreates the room here, and it exits only when the manager can
/// retire it with nothing left to process.
pub struct Room {
    id: RoomId,
    generation: u64,
    state: Option<RoomState>,
    /// Member whose `SetBusy(true)` raised the lock, cleared if they leave.
    busy_holder: Option<PeerId>,
    command_rx: mpsc::Receiver<RoomCommand>,
    signaling: Arc<dyn SignalingOutput>,
    manager: RoomManager,
}

impl Room {
    pub(crate) fn new(
        id: RoomId,
        generation: u64,
        command_rx: mpsc::Receiver<RoomCommand>,
        signaling: Arc<dyn SignalingOutput>,
        manager: RoomManager,
    ) -> Self {
        Self {
            id,
            generation,
            state: None,
            busy_holder: None,
            command_rx,
            signaling,
            manager,
        }
    }

    pub async fn run(mut self) {
        info!("Room {} event loop started", self.id);

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;

            if self.state.is_none()
                && self
                    .manager
                    .retire_if_idle(&self.id, self.generation, &self.command_rx)
            {
                break;
            }
        }

        info!("Room {} destroyed", self.id);
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { peer_id } => self.on_join(peer_id).await,

            RoomCommand::Leave { peer_id } => self.on_leave(peer_id).await,

            RoomCommand::SetPermission {
                requester,
                target,
                allowed,
            } => {
                let Some(state) = self.state.as_mut() else {
                    return;
                };
                if !transitions::grant(state, &requester, &target, allowed) {
                    debug!(
                        "Ignoring permission change from {} in room {}",
                        requester, self.id
                    );
                    return;
                }
                info!(
                    "Host {} set send permission of {} to {} in room {}",
                    requester, target, allowed, self.id
                );
                self.broadcast_state().await;
            }

            RoomCommand::SetBusy { peer_id, is_busy } => {
                let Some(state) = self.state.as_mut() else {
                    return;
                };
                if !transitions::mark_busy(state, &peer_id, is_busy) {
                    debug!("Ignoring busy flag from non-member {}", peer_id);
                    return;
                }
                self.busy_holder = is_busy.then_some(peer_id);
                self.broadcast_state().await;
            }

            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.clone());
            }
        }
    }

    async fn on_join(&mut self, peer_id: PeerId) {
        let state = self.state.get_or_insert_with(|| {
            info!("Creating room {} with host {}", self.id, peer_id);
            RoomState::new(self.id.clone(), peer_id.clone())
        });
        let newcomer = transitions::admit(state, &peer_id);
        let members: Vec<PeerId> = state.members.iter().cloned().collect();

        info!("Peer {} joined room {} ({} members)", peer_id, self.id, members.len());

        self.signaling
            .send(peer_id.clone(), ServerMessage::RoomMembers(members.clone()))
            .await;

        if newcomer {
            for member in members.iter().filter(|m| **m != peer_id) {
                self.signaling
                    .send(member.clone(), ServerMessage::UserJoined(peer_id.clone()))
                    .await;
            }
        }

        self.broadcast_state().await;
    }

    async fn on_leave(&mut self, peer_id: PeerId) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        match transitions::depart(state, &peer_id) {
            Departure::NotMember => return,
            Departure::Emptied => {
                info!("Last peer {} left room {}", peer_id, self.id);
                self.state = None;
                self.busy_holder = None;
                return;
            }
            Departure::Left { new_host } => {
                info!("Peer {} left room {}", peer_id, self.id);
                if let Some(host) = new_host {
                    info!("Host of room {} passed to {}", self.id, host);
                }
            }
        }

        if self.busy_holder.as_ref() == Some(&peer_id) {
            self.busy_holder = None;
            if let Some(state) = self.state.as_mut() {
                state.is_busy = false;
            }
        }

        for member in self.members() {
            self.signaling
                .send(member, ServerMessage::UserLeft(peer_id.clone()))
                .await;
        }
        self.broadcast_state().await;
    }

    async fn broadcast_state(&self) {
        let Some(state) = &self.state else {
            return;
        };
        for member in &state.members {
            self.signaling
                .send(
                    member.clone(),
                    ServerMessage::RoomStateUpdate(state.clone()),
                )
                .await;
        }
    }

    fn members(&self) -> Vec<PeerId> {
        self.state
            .as_ref()
            .map(|s| s.members.iter().cloned().collect())
            .unwrap_or_default()
    }
}
