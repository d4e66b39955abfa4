use crate::server::RelayState;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use dropmesh_core::{ClientMessage, PeerId, RoomId, ServerMessage, SignalEnvelope};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    let peer_id = PeerId::new();

    ws.on_upgrade(move |socket| handle_socket(socket, peer_id, state))
}

async fn handle_socket(socket: WebSocket, peer_id: PeerId, state: RelayState) {
    info!("New WebSocket connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.signaling.add_peer(peer_id.clone(), tx);
    state.signaling.send_message(
        &peer_id,
        ServerMessage::Welcome {
            peer_id: peer_id.clone(),
        },
    );
    state.signaling.send_message(
        &peer_id,
        ServerMessage::IceConfig {
            ice_servers: state.signaling.get_ice_servers(),
        },
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut joined = HashSet::new();

    tokio::select! {
        _ = (&mut send_task) => {},
        _ = receive_loop(&mut receiver, &peer_id, &state, &mut joined) => {},
    };
    send_task.abort();

    state.signaling.remove_peer(&peer_id);
    for room_id in joined {
        state.rooms.leave(&room_id, peer_id.clone()).await;
    }

    info!("WebSocket disconnected: {}", peer_id);
}

async fn receive_loop(
    receiver: &mut SplitStream<WebSocket>,
    peer_id: &PeerId,
    state: &RelayState,
    joined: &mut HashSet<RoomId>,
) {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(client_msg, peer_id, state, joined).await,
                Err(e) => warn!("Invalid ClientMessage from {}: {:?}", peer_id, e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
}

async fn handle_client_message(
    msg: ClientMessage,
    peer_id: &PeerId,
    state: &RelayState,
    joined: &mut HashSet<RoomId>,
) {
    match msg {
        ClientMessage::JoinRoom(room_id) => {
            if room_id.is_empty() {
                warn!("Peer {} tried to join a room with an empty id", peer_id);
                return;
            }
            joined.insert(room_id.clone());
            state.rooms.join(room_id, peer_id.clone()).await;
        }

        ClientMessage::LeaveRoom(room_id) => {
            if joined.remove(&room_id) {
                state.rooms.leave(&room_id, peer_id.clone()).await;
            }
        }

        ClientMessage::Signal { target, signal } => {
            debug!("Relaying signal {} -> {}", peer_id, target);
            state.signaling.relay(SignalEnvelope {
                sender_id: peer_id.clone(),
                target_id: target,
                payload: signal,
            });
        }

        ClientMessage::SetPermission {
            room_id,
            user_id,
            allowed,
        } => {
            state
                .rooms
                .set_permission(&room_id, peer_id.clone(), user_id, allowed)
                .await;
        }

        ClientMessage::TransferStatus { room_id, is_busy } => {
            state.rooms.set_busy(&room_id, peer_id.clone(), is_busy).await;
        }
    }
}
