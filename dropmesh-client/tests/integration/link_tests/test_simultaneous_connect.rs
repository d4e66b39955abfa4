use bytes::Bytes;
use dropmesh_client::{LinkState, PeerEvent};
use dropmesh_core::Frame;

use crate::integration::{create_test_mesh, init_tracing};
use crate::utils::spawn_peer;

#[tokio::test]
async fn test_crossing_connects_leave_one_link_per_side() {
    init_tracing();

    let (network, relay) = create_test_mesh();
    let mut a = spawn_peer(&network, &relay);
    let mut b = spawn_peer(&network, &relay);

    a.manager.connect(b.id.clone());
    b.manager.connect(a.id.clone());

    a.wait_connected(&b.id).await;
    b.wait_connected(&a.id).await;

    let a_links = a.manager.link_states().await;
    let b_links = b.manager.link_states().await;
    assert_eq!(a_links.len(), 1);
    assert_eq!(b_links.len(), 1);
    assert_eq!(a_links.get(&b.id), Some(&LinkState::Open));
    assert_eq!(b_links.get(&a.id), Some(&LinkState::Open));
    assert_eq!(a.manager.channels().len(), 1);
    assert_eq!(b.manager.channels().len(), 1);

    // The surviving link carries data both ways.
    let ping = Frame::data(Bytes::from_static(b"ping")).encode().unwrap();
    let pong = Frame::data(Bytes::from_static(b"pong")).encode().unwrap();
    a.manager.channels().send(&b.id, ping).await.unwrap();
    b.manager.channels().send(&a.id, pong).await.unwrap();

    let got = b
        .wait_for(|e| matches!(e, PeerEvent::Frame(..)))
        .await;
    assert_eq!(
        got,
        PeerEvent::Frame(a.id.clone(), Frame::data(Bytes::from_static(b"ping")))
    );
    let got = a
        .wait_for(|e| matches!(e, PeerEvent::Frame(..)))
        .await;
    assert_eq!(
        got,
        PeerEvent::Frame(b.id.clone(), Frame::data(Bytes::from_static(b"pong")))
    );
}

#[tokio::test]
async fn test_only_higher_id_answers_on_collision() {
    init_tracing();

    let (network, relay) = create_test_mesh();
    let mut a = spawn_peer(&network, &relay);
    let mut b = spawn_peer(&network, &relay);

    a.manager.connect(b.id.clone());
    b.manager.connect(a.id.clone());
    a.wait_connected(&b.id).await;
    b.wait_connected(&a.id).await;

    let (low, high) = if a.id < b.id { (&a.id, &b.id) } else { (&b.id, &a.id) };
    let from_low = relay.signals_from(low).await;
    let from_high = relay.signals_from(high).await;

    assert!(!from_low.iter().any(|s| matches!(s, dropmesh_client::PeerSignal::Answer { .. })));
    assert!(from_high.iter().any(|s| matches!(s, dropmesh_client::PeerSignal::Answer { .. })));
}
