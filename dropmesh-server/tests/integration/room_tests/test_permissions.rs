use dropmesh_core::{PeerId, RoomId};

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test]
async fn test_non_host_permission_change_is_ignored_silently() {
    init_tracing();

    let (rooms, signaling, _rx) = create_test_registry();
    let room_id = RoomId::from("AB12345");
    let p1 = PeerId::new();
    let p3 = PeerId::new();

    rooms.join(room_id.clone(), p1.clone()).await;
    rooms.join(room_id.clone(), p3.clone()).await;
    let before = rooms.snapshot(&room_id).await.expect("room should exist");
    let sent_before = signaling.total().await;

    rooms
        .set_permission(&room_id, p3.clone(), p3.clone(), true)
        .await;
    let after = rooms.snapshot(&room_id).await.expect("room should exist");

    assert_eq!(after, before);
    assert_eq!(signaling.total().await, sent_before, "no broadcast expected");
}

#[tokio::test]
async fn test_host_grants_and_revokes() {
    init_tracing();

    let (rooms, signaling, _rx) = create_test_registry();
    let room_id = RoomId::from("grant");
    let host = PeerId::new();
    let guest = PeerId::new();

    rooms.join(room_id.clone(), host.clone()).await;
    rooms.join(room_id.clone(), guest.clone()).await;

    rooms
        .set_permission(&room_id, host.clone(), guest.clone(), true)
        .await;
    let granted = rooms.snapshot(&room_id).await.expect("room should exist");
    assert!(granted.can_send(&guest));
    assert_eq!(signaling.last_state_for(&guest).await, Some(granted));

    rooms
        .set_permission(&room_id, host.clone(), guest.clone(), false)
        .await;
    let revoked = rooms.snapshot(&room_id).await.expect("room should exist");
    assert!(!revoked.can_send(&guest));
    assert_eq!(signaling.last_state_for(&host).await, Some(revoked));
}

#[tokio::test]
async fn test_former_host_loses_authority() {
    init_tracing();

    let (rooms, _signaling, _rx) = create_test_registry();
    let room_id = RoomId::from("stale");
    let mut peers = vec![PeerId::new(), PeerId::new(), PeerId::new()];
    peers.sort();
    let (low, mid, high) = (peers[0].clone(), peers[1].clone(), peers[2].clone());

    rooms.join(room_id.clone(), high.clone()).await;
    rooms.join(room_id.clone(), low.clone()).await;
    rooms.join(room_id.clone(), mid.clone()).await;

    // The host leaves and comes back as an ordinary member.
    rooms.leave(&room_id, high.clone()).await;
    rooms.join(room_id.clone(), high.clone()).await;
    rooms.set_permission(&room_id, high.clone(), mid.clone(), true).await;

    let state = rooms.snapshot(&room_id).await.expect("room should exist");
    assert_eq!(state.host, low);
    assert!(!state.can_send(&mid));
}

#[tokio::test]
async fn test_commands_for_unknown_rooms_are_noops() {
    init_tracing();

    let (rooms, signaling, _rx) = create_test_registry();
    let ghost = RoomId::from("nobody-here");
    let p1 = PeerId::new();

    rooms.set_permission(&ghost, p1.clone(), p1.clone(), true).await;
    rooms.set_busy(&ghost, p1.clone(), true).await;
    rooms.leave(&ghost, p1).await;

    assert_eq!(rooms.room_count(), 0);
    assert!(rooms.snapshot(&ghost).await.is_none());
    assert_eq!(signaling.total().await, 0);
}
