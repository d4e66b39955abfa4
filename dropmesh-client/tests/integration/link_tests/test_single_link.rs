use dropmesh_client::LinkState;

use crate::integration::{create_test_mesh, init_tracing};
use crate::utils::{connect_pair, spawn_peer};

#[tokio::test]
async fn test_initiator_and_responder_reach_open() {
    init_tracing();

    let (network, relay) = create_test_mesh();
    let mut a = spawn_peer(&network, &relay);
    let mut b = spawn_peer(&network, &relay);

    connect_pair(&mut a, &mut b).await;

    assert!(a.manager.channels().contains(&b.id));
    assert!(b.manager.channels().contains(&a.id));
    assert_eq!(a.manager.link_states().await.get(&b.id), Some(&LinkState::Open));
    assert_eq!(b.manager.link_states().await.get(&a.id), Some(&LinkState::Open));
    assert_eq!(network.created(), 2);

    let a_signals = relay.signals_from(&a.id).await;
    let b_signals = relay.signals_from(&b.id).await;
    assert!(a_signals[0].is_offer());
    assert!(!b_signals.iter().any(|s| s.is_offer()));
}

#[tokio::test]
async fn test_repeated_connect_is_a_no_op() {
    init_tracing();

    let (network, relay) = create_test_mesh();
    let mut a = spawn_peer(&network, &relay);
    let mut b = spawn_peer(&network, &relay);

    connect_pair(&mut a, &mut b).await;
    a.manager.connect(b.id.clone());
    a.manager.connect(b.id.clone());

    // Link states are answered in order, after both connects were handled.
    let states = a.manager.link_states().await;
    assert_eq!(states.len(), 1);
    assert_eq!(network.created(), 2);
}

#[tokio::test]
async fn test_connect_to_self_is_ignored() {
    init_tracing();

    let (network, relay) = create_test_mesh();
    let a = spawn_peer(&network, &relay);

    a.manager.connect(a.id.clone());

    assert!(a.manager.link_states().await.is_empty());
    assert_eq!(network.created(), 0);
}
