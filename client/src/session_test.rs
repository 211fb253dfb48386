use super::*;
use crate::net::channel::{ChannelConfig, Connector, Link, TransportError};
use async_trait::async_trait;
use canvas::doc::{AoEMarker, GridSettings, MapEntry, MarkerShape};
use canvas::grid::GridCell;

// =============================================================================
// HELPERS
// =============================================================================

/// Never connects, so every send stays in the channel queue where the test
/// can count it.
struct Offline;

#[async_trait]
impl Connector for Offline {
    async fn connect(&self, _url: &str) -> Result<Link, TransportError> {
        Err(TransportError::Closed)
    }
}

fn offline_channel() -> Channel {
    Channel::new(ChannelConfig::default(), Arc::new(Offline))
}

fn admin_ui() -> UiState {
    UiState { is_admin: true, is_active: true }
}

fn scene_with_map(name: &str) -> Scene {
    let mut scene = Scene::new("s-1", "Session");
    scene.maps.push(MapEntry::new(name));
    scene.active_map_id = Some(name.to_owned());
    scene
}

fn scene_update(scene: &Scene) -> Message {
    Message::scene_update(scene.to_value())
}

// =============================================================================
// VIEWER STATE
// =============================================================================

#[test]
fn viewer_state_follows_controls() {
    let mut viewer = ViewerState::default();
    assert!(viewer.apply(&Message::BlankViewer));
    assert!(viewer.apply(&Message::RotateViewer));
    assert_eq!(viewer, ViewerState { blanked: true, rotated: true });
    assert!(viewer.apply(&Message::UnblankViewer));
    assert!(viewer.apply(&Message::UnrotateViewer));
    assert_eq!(viewer, ViewerState::default());
    assert!(!viewer.apply(&Message::RequestSceneUpdate));
}

// =============================================================================
// INBOUND
// =============================================================================

#[tokio::test(start_paused = true)]
async fn inbound_snapshot_replaces_scene() {
    let session = Session::new(offline_channel(), scene_with_map("X"), admin_ui());
    let mut remote = scene_with_map("X");
    remote.name = "Remote".into();
    remote.maps.push(MapEntry::new("Z"));
    session.shared.handle_inbound(&scene_update(&remote));
    assert_eq!(session.scene(), remote);
    assert_eq!(session.wait_for_scene(Duration::from_millis(1)).await, Some(remote));
}

#[tokio::test(start_paused = true)]
async fn stale_snapshot_after_rename_is_rejected() {
    let session = Session::new(offline_channel(), scene_with_map("X"), admin_ui());
    assert!(session.rename_map("X", "Y"));

    session.shared.handle_inbound(&scene_update(&scene_with_map("X")));
    let scene = session.scene();
    assert_eq!(scene.active_map_id.as_deref(), Some("Y"));
    assert!(scene.has_map("Y"));
    assert_eq!(session.wait_for_scene(Duration::from_millis(10)).await, None);
}

#[tokio::test(start_paused = true)]
async fn viewer_follows_an_admin_rename() {
    let viewer = Session::new(offline_channel(), scene_with_map("X"), UiState::default());

    viewer.shared.handle_inbound(&scene_update(&scene_with_map("Y")));
    assert_eq!(viewer.scene().active_map_id.as_deref(), Some("Y"));

    let mut later = scene_with_map("Y");
    later.name = "After rename".into();
    viewer.shared.handle_inbound(&scene_update(&later));
    assert_eq!(viewer.scene(), later);
    assert_eq!(viewer.wait_for_scene(Duration::from_millis(1)).await, Some(later));
}

#[tokio::test(start_paused = true)]
async fn reverted_rename_is_sent_again_after_delay() {
    let session = Session::new(offline_channel(), scene_with_map("X"), admin_ui());
    assert!(session.rename_map("X", "Y"));
    assert_eq!(session.channel().queued(), 1);

    // Passes the guard (the local name is present remotely) but points the
    // active map back at the old name.
    let mut reverted = scene_with_map("X");
    reverted.maps.push(MapEntry::new("Y"));
    session.shared.handle_inbound(&scene_update(&reverted));
    assert_eq!(session.scene().active_map_id.as_deref(), Some("X"));

    tokio::time::sleep(RENAME_RECHECK_DELAY + Duration::from_millis(50)).await;
    assert_eq!(session.scene().active_map_id.as_deref(), Some("Y"));
    assert_eq!(session.channel().queued(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_scene_payload_is_ignored() {
    let session = Session::new(offline_channel(), scene_with_map("X"), admin_ui());
    session.shared.handle_inbound(&Message::scene_update(serde_json::json!({"maps": "nope"})));
    assert_eq!(session.scene(), scene_with_map("X"));
}

#[tokio::test(start_paused = true)]
async fn highlight_and_viewer_messages_update_state() {
    let session = Session::new(offline_channel(), Scene::new("s", "n"), UiState::default());
    session.shared.handle_inbound(&Message::HighlightMarker { marker_id: "m-1".into() });
    session.shared.handle_inbound(&Message::BlankViewer);
    session.shared.handle_inbound(&Message::status(ConnectionStatus::Connecting));
    assert!(session.is_highlighted("m-1"));
    assert!(session.viewer().blanked);
    assert_eq!(session.status(), ConnectionStatus::Connecting);
}

// =============================================================================
// OUTBOUND
// =============================================================================

#[tokio::test(start_paused = true)]
async fn marker_drag_commits_snapped_cell_and_sends_it() {
    let mut scene = Scene::new("s", "n");
    scene.grid_settings =
        GridSettings { use_fixed_grid: true, grid_cells_x: 10, grid_cells_y: 10, ..GridSettings::default() };
    let marker = AoEMarker::new(MarkerShape::Circle, Point::new(2.0, 2.0), true, 10.0);
    let id = marker.id.clone();
    scene.aoe_markers.push(marker);

    let session = Session::new(offline_channel(), scene, admin_ui());
    session.set_viewport(1000.0, 1000.0);
    let down = session.pointer_down(Point::new(250.0, 250.0), Button::Primary, Modifiers::default(), None);
    assert!(down.contains(&Action::SetCursor("grabbing".into())));
    session.pointer_up(Point::new(550.0, 250.0));

    let moved = session.scene().marker(&id).expect("marker").position;
    assert_eq!(GridCell::from_point(moved), GridCell { x: 5, y: 2 });
    assert_eq!(session.channel().queued(), 1);
}

#[tokio::test(start_paused = true)]
async fn viewer_resize_requests_a_fresh_scene() {
    let session = Session::new(offline_channel(), Scene::new("s", "n"), UiState { is_admin: false, is_active: true });
    let presentation = session.set_viewport(800.0, 600.0);
    assert_eq!(presentation, vec![Action::RenderNeeded]);
    assert_eq!(session.channel().queued(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_clears_timers_and_listener() {
    let session = Session::new(offline_channel(), scene_with_map("X"), admin_ui());
    session.shared.handle_inbound(&Message::HighlightMarker { marker_id: "m-1".into() });
    assert!(session.rename_map("X", "Y"));
    session.shutdown();

    assert!(!session.is_highlighted("m-1"));
    assert!(lock(&session.timers).is_empty());
    assert_eq!(session.channel().status(), ConnectionStatus::Disconnected);
    tokio::time::sleep(RENAME_RECHECK_DELAY * 2).await;
    assert_eq!(session.channel().queued(), 1);
}
