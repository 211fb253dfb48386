use super::*;
use crate::state::test_helpers::{add_client, test_app_state};

#[tokio::test]
async fn broadcast_skips_excluded_client() {
    let state = test_app_state();
    let (sender, mut sender_rx) = add_client(&state).await;
    let (_peer, mut peer_rx) = add_client(&state).await;

    let delivered = broadcast(&state, &Message::BlankViewer, Some(sender)).await;
    assert_eq!(delivered, 1);
    assert_eq!(peer_rx.recv().await, Some(Message::BlankViewer));
    assert!(sender_rx.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_drops_closed_clients() {
    let state = test_app_state();
    let (gone, gone_rx) = add_client(&state).await;
    let (_live, mut live_rx) = add_client(&state).await;
    drop(gone_rx);

    assert_eq!(broadcast(&state, &Message::RotateViewer, None).await, 1);
    assert_eq!(live_rx.recv().await, Some(Message::RotateViewer));
    assert!(!state.clients.read().await.contains_key(&gone));
}

#[tokio::test]
async fn broadcast_drops_clients_with_full_outbox() {
    let state = test_app_state();
    let slow = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(1);
    register(&state, slow, tx).await;

    assert_eq!(broadcast(&state, &Message::BlankViewer, None).await, 1);
    assert_eq!(broadcast(&state, &Message::UnblankViewer, None).await, 0);
    assert!(state.clients.read().await.is_empty());
}

#[tokio::test]
async fn register_and_unregister_report_counts() {
    let state = test_app_state();
    let (tx, _rx) = mpsc::channel(4);
    let id = Uuid::new_v4();
    assert_eq!(register(&state, id, tx).await, 1);
    assert_eq!(unregister(&state, id).await, 0);
    assert_eq!(unregister(&state, id).await, 0);
}
