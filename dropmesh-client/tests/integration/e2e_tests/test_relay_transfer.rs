use dropmesh_client::{ClientConfig, ClientError, ClientEvent, ReceptionEvent, SendError, SendStatus};
use dropmesh_core::RoomId;

use super::{next_event, spawn_relay, start_client};
use crate::integration::init_tracing;
use crate::utils::{MockNetwork, TEST_ROOM, payload};

#[tokio::test]
async fn test_file_crosses_the_relay_and_lands_on_disk() {
    init_tracing();

    let addr = spawn_relay().await;
    let network = MockNetwork::new();
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        chunk_size: 1_000_000,
        ..ClientConfig::default()
    };

    let sender_dir = dir.path().join("p1");
    let receiver_dir = dir.path().join("p2");
    std::fs::create_dir_all(&sender_dir).unwrap();
    std::fs::create_dir_all(&receiver_dir).unwrap();

    let (p1, mut p1_events) = start_client(addr, &network, &config, &sender_dir).await;
    p1.join(RoomId::from(TEST_ROOM)).unwrap();
    let state = p1.wait_for_room().await.unwrap();
    assert!(state.is_host(p1.local_id()));

    let (p2, mut p2_events) = start_client(addr, &network, &config, &receiver_dir).await;
    p2.join(RoomId::from(TEST_ROOM)).unwrap();
    p2.wait_for_room().await.unwrap();

    p1.wait_for_peers(1).await.unwrap();
    p2.wait_for_peers(1).await.unwrap();
    assert_eq!(p1.open_peers(), vec![p2.local_id().clone()]);

    let source = dir.path().join("report.pdf");
    let bytes = payload(2_500_000);
    std::fs::write(&source, &bytes).unwrap();

    let report = p1.send_file(&source, |_| {}).await.unwrap();
    assert_eq!(report.status, SendStatus::Completed);
    assert_eq!(report.delivered, vec![p2.local_id().clone()]);

    let event = next_event(&mut p2_events, |e| {
        matches!(e, ClientEvent::Reception(ReceptionEvent::Completed { .. }))
    })
    .await;
    let ClientEvent::Reception(ReceptionEvent::Completed { name, size, path, .. }) = event else {
        unreachable!()
    };
    assert_eq!(name, "report.pdf");
    assert_eq!(size, 2_500_000);
    assert_eq!(path, receiver_dir.join("report.pdf"));
    assert_eq!(std::fs::read(&path).unwrap(), bytes);

    // The relay saw the busy flag go up and come back down.
    next_event(&mut p1_events, |e| {
        matches!(e, ClientEvent::RoomUpdated(state) if state.is_busy)
    })
    .await;
    next_event(&mut p1_events, |e| {
        matches!(e, ClientEvent::RoomUpdated(state) if !state.is_busy)
    })
    .await;
}

#[tokio::test]
async fn test_member_without_permission_cannot_send() {
    init_tracing();

    let addr = spawn_relay().await;
    let network = MockNetwork::new();
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::default();

    let (p1, _p1_events) = start_client(addr, &network, &config, dir.path()).await;
    p1.join(RoomId::from(TEST_ROOM)).unwrap();
    p1.wait_for_room().await.unwrap();

    let (p2, mut p2_events) = start_client(addr, &network, &config, dir.path()).await;
    p2.join(RoomId::from(TEST_ROOM)).unwrap();
    p2.wait_for_room().await.unwrap();
    p2.wait_for_peers(1).await.unwrap();

    let source = dir.path().join("notes.txt");
    std::fs::write(&source, b"hello").unwrap();

    let err = p2.send_file(&source, |_| {}).await;
    assert!(matches!(
        err,
        Err(ClientError::Send(SendError::NotPermitted(_)))
    ));

    // Once the host grants it, the same send goes through.
    p1.set_permission(p2.local_id().clone(), true).unwrap();
    let p2_id = p2.local_id().clone();
    next_event(&mut p2_events, |e| {
        matches!(e, ClientEvent::RoomUpdated(state) if state.can_send(&p2_id))
    })
    .await;

    let report = p2.send_file(&source, |_| {}).await.unwrap();
    assert_eq!(report.status, SendStatus::Completed);
}
