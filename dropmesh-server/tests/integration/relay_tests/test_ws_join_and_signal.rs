use dropmesh_core::{ClientMessage, RoomId, ServerMessage};
use dropmesh_server::DEFAULT_STUN_SERVER;
use serde_json::json;

use crate::integration::init_tracing;
use crate::utils::{TestClient, expect_state, has_members, is_user_joined, spawn_relay};

#[tokio::test]
async fn test_connect_receives_ice_config() {
    init_tracing();

    let addr = spawn_relay().await.expect("relay should start");
    let mut client = TestClient::connect(addr).await.expect("connect");

    let msg = client
        .recv_until(|m| matches!(m, ServerMessage::IceConfig { .. }))
        .await
        .expect("ice-config");
    let ServerMessage::IceConfig { ice_servers } = msg else {
        unreachable!()
    };
    assert_eq!(ice_servers.len(), 1);
    assert_eq!(ice_servers[0].urls, vec![DEFAULT_STUN_SERVER.to_string()]);
}

#[tokio::test]
async fn test_join_and_relay_signal() {
    init_tracing();

    let addr = spawn_relay().await.expect("relay should start");
    let room_id = RoomId::from("AB12345");

    let mut p1 = TestClient::connect(addr).await.expect("connect p1");
    p1.send(ClientMessage::JoinRoom(room_id.clone())).await.unwrap();
    let state = expect_state(p1.recv_until(has_members(1)).await.unwrap());
    assert_eq!(state.host, p1.peer_id);

    let mut p2 = TestClient::connect(addr).await.expect("connect p2");
    p2.send(ClientMessage::JoinRoom(room_id.clone())).await.unwrap();

    let members = p2
        .recv_until(|m| matches!(m, ServerMessage::RoomMembers(_)))
        .await
        .unwrap();
    assert_eq!(members, ServerMessage::RoomMembers(vec![p1.peer_id.clone()]));

    p1.recv_until(is_user_joined(&p2.peer_id)).await.unwrap();
    let state = expect_state(p1.recv_until(has_members(2)).await.unwrap());
    assert_eq!(state.host, p1.peer_id);
    assert!(state.can_send(&p1.peer_id));
    assert!(!state.can_send(&p2.peer_id));

    let payload = json!({ "type": "offer", "sdp": "v=0" });
    p1.send(ClientMessage::Signal {
        target: p2.peer_id.clone(),
        signal: payload.clone(),
    })
    .await
    .unwrap();

    let relayed = p2
        .recv_until(|m| matches!(m, ServerMessage::Signal { .. }))
        .await
        .unwrap();
    assert_eq!(
        relayed,
        ServerMessage::Signal {
            sender: p1.peer_id.clone(),
            signal: payload,
        }
    );
}

#[tokio::test]
async fn test_host_grants_permission_over_ws() {
    init_tracing();

    let addr = spawn_relay().await.expect("relay should start");
    let room_id = RoomId::from("perm-ws");

    let mut host = TestClient::connect(addr).await.unwrap();
    host.send(ClientMessage::JoinRoom(room_id.clone())).await.unwrap();
    host.recv_until(has_members(1)).await.unwrap();

    let mut guest = TestClient::connect(addr).await.unwrap();
    guest.send(ClientMessage::JoinRoom(room_id.clone())).await.unwrap();
    host.recv_until(has_members(2)).await.unwrap();

    host.send(ClientMessage::SetPermission {
        room_id: room_id.clone(),
        user_id: guest.peer_id.clone(),
        allowed: true,
    })
    .await
    .unwrap();

    let guest_id = guest.peer_id.clone();
    let state = expect_state(
        guest
            .recv_until(|m| {
                matches!(m, ServerMessage::RoomStateUpdate(s) if s.can_send(&guest_id))
            })
            .await
            .unwrap(),
    );
    assert_eq!(state.allowed_senders.len(), 2);
}
