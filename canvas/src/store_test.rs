#![allow(clippy::float_cmp)]

use std::sync::Mutex;

use super::*;
use crate::doc::MarkerShape;
use crate::grid::Point;

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<Message>>,
}

impl Recorder {
    fn scenes(&self) -> Vec<Scene> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Message::SceneUpdate { scene } => Some(Scene::from_value(scene.clone()).unwrap()),
                _ => None,
            })
            .collect()
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Outbound for Recorder {
    fn send(&self, message: Message) {
        self.sent.lock().unwrap().push(message);
    }
}

fn store_with(scene: Scene) -> (SceneStore, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    (SceneStore::new(scene, recorder.clone()), recorder)
}

fn scene_with_maps(names: &[&str], active: Option<&str>) -> Scene {
    let mut scene = Scene::new("s", "Session");
    scene.maps = names.iter().map(|n| MapEntry::new(*n)).collect();
    scene.active_map_id = active.map(str::to_owned);
    scene
}

// =============================================================
// apply_incoming / race guard
// =============================================================

#[test]
fn incoming_snapshot_replaces_local_state() {
    let (mut store, recorder) = store_with(scene_with_maps(&["a"], Some("a")));
    let remote = scene_with_maps(&["a", "b"], Some("b"));
    assert_eq!(store.apply_incoming(remote.clone()), ApplyOutcome::Applied);
    assert_eq!(store.scene(), &remote);
    assert_eq!(recorder.count(), 0);
}

#[test]
fn stale_snapshot_after_rename_is_rejected() {
    let (mut store, _recorder) = store_with(scene_with_maps(&["X"], Some("X")));
    assert!(store.rename_map("X", "Y"));

    let stale = scene_with_maps(&["X"], Some("X"));
    assert_eq!(store.apply_incoming(stale), ApplyOutcome::Rejected);
    assert_eq!(store.scene().active_map_id.as_deref(), Some("Y"));
    assert!(store.scene().has_map("Y"));
}

#[test]
fn store_that_never_renamed_follows_a_remote_rename() {
    let (mut store, _) = store_with(scene_with_maps(&["X"], Some("X")));

    let renamed = scene_with_maps(&["Y"], Some("Y"));
    assert_eq!(store.apply_incoming(renamed), ApplyOutcome::Applied);
    assert_eq!(store.scene().active_map_id.as_deref(), Some("Y"));

    let mut later = scene_with_maps(&["Y"], Some("Y"));
    later.name = "Later".to_owned();
    assert_eq!(store.apply_incoming(later), ApplyOutcome::Applied);
    assert_eq!(store.scene().name, "Later");
}

#[test]
fn guard_lifts_once_a_snapshot_knows_the_new_name() {
    let (mut store, _) = store_with(scene_with_maps(&["X"], Some("X")));
    assert!(store.rename_map("X", "Y"));

    assert_eq!(store.apply_incoming(scene_with_maps(&["Y"], Some("Y"))), ApplyOutcome::Applied);
    // A later remote switch back to a map called X is a real change now.
    assert_eq!(store.apply_incoming(scene_with_maps(&["X"], Some("X"))), ApplyOutcome::Applied);
    assert_eq!(store.scene().active_map_id.as_deref(), Some("X"));
}

#[test]
fn guard_only_rejects_snapshots_still_on_the_old_name() {
    let (mut store, _) = store_with(scene_with_maps(&["X", "Z"], Some("X")));
    assert!(store.rename_map("X", "Y"));

    assert_eq!(store.apply_incoming(scene_with_maps(&["X", "Z"], Some("X"))), ApplyOutcome::Rejected);
    assert_eq!(store.apply_incoming(scene_with_maps(&["X", "Z"], Some("Z"))), ApplyOutcome::Applied);
    assert_eq!(store.scene().active_map_id.as_deref(), Some("Z"));
}

#[test]
fn guard_lets_remote_switch_to_map_it_still_lists() {
    let (mut store, _) = store_with(scene_with_maps(&["a", "b"], Some("a")));
    let remote = scene_with_maps(&["a", "b"], Some("b"));
    assert_eq!(store.apply_incoming(remote), ApplyOutcome::Applied);
    assert_eq!(store.scene().active_map_id.as_deref(), Some("b"));
}

#[test]
fn guard_ignores_local_scene_without_active_map() {
    let (mut store, _) = store_with(scene_with_maps(&["a"], None));
    let remote = scene_with_maps(&["b"], Some("b"));
    assert_eq!(store.apply_incoming(remote), ApplyOutcome::Applied);
}

#[test]
fn guard_accepts_remote_that_cleared_active_map_we_do_not_have() {
    let (mut store, _) = store_with(scene_with_maps(&["b"], Some("gone")));
    let remote = scene_with_maps(&["b"], None);
    assert_eq!(store.apply_incoming(remote), ApplyOutcome::Applied);
}

#[test]
fn same_active_map_always_applies() {
    let (mut store, _) = store_with(scene_with_maps(&["a"], Some("a")));
    let mut remote = scene_with_maps(&["a"], Some("a"));
    remote.name = "Renamed session".to_owned();
    assert_eq!(store.apply_incoming(remote), ApplyOutcome::Applied);
    assert_eq!(store.scene().name, "Renamed session");
}

// =============================================================
// commit_local
// =============================================================

#[test]
fn commit_sends_whole_document_and_bumps_revision() {
    let (mut store, recorder) = store_with(Scene::new("s", "n"));
    let mut next = store.scene().clone();
    next.name = "changed".to_owned();
    store.commit_local(next);
    assert_eq!(store.revision(), 1);
    let sent = recorder.scenes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name, "changed");
}

#[test]
fn committed_documents_carry_their_revision() {
    let (mut store, recorder) = store_with(Scene::new("s", "n"));
    store.set_show_current_player(false);
    store.set_show_current_player(true);
    let revisions: Vec<_> = recorder.scenes().iter().map(|s| s.extra[REVISION_FIELD].as_u64()).collect();
    assert_eq!(revisions, vec![Some(1), Some(2)]);
}

#[test]
fn applied_revision_moves_the_clock_forward() {
    let (mut store, recorder) = store_with(Scene::new("s", "n"));
    let mut remote = Scene::new("s", "n");
    remote.extra.insert(REVISION_FIELD.to_owned(), 41.into());
    assert_eq!(store.apply_incoming(remote), ApplyOutcome::Applied);
    assert_eq!(store.revision(), 41);

    store.set_show_current_player(false);
    assert_eq!(recorder.scenes()[0].extra[REVISION_FIELD], 42);

    // An older remote revision never winds the clock back.
    let mut older = store.scene().clone();
    older.extra.insert(REVISION_FIELD.to_owned(), 3.into());
    store.apply_incoming(older);
    assert_eq!(store.revision(), 42);
}

#[test]
fn rejected_mutation_sends_nothing() {
    let (mut store, recorder) = store_with(scene_with_maps(&["a"], None));
    assert!(!store.add_map(MapEntry::new("a")));
    assert!(!store.remove_marker("nope"));
    assert!(!store.advance_turn());
    assert_eq!(recorder.count(), 0);
    assert_eq!(store.revision(), 0);
}

// =============================================================
// rename
// =============================================================

#[test]
fn rename_cascades_to_active_map() {
    let (mut store, recorder) = store_with(scene_with_maps(&["X", "Z"], Some("X")));
    assert!(store.rename_map("X", "Y"));
    assert!(store.scene().has_map("Y"));
    assert!(!store.scene().has_map("X"));
    assert_eq!(store.scene().active_map_id.as_deref(), Some("Y"));
    assert_eq!(recorder.scenes()[0].active_map_id.as_deref(), Some("Y"));
    assert!(store.has_pending_rename());
}

#[test]
fn rename_of_inactive_map_leaves_active_alone() {
    let (mut store, _) = store_with(scene_with_maps(&["X", "Z"], Some("Z")));
    assert!(store.rename_map("X", "Y"));
    assert_eq!(store.scene().active_map_id.as_deref(), Some("Z"));
}

#[test]
fn rename_refuses_collisions_and_unknown_sources() {
    let (mut store, recorder) = store_with(scene_with_maps(&["X", "Y"], None));
    assert!(!store.rename_map("X", "Y"));
    assert!(!store.rename_map("missing", "Q"));
    assert!(!store.rename_map("X", "X"));
    assert!(!store.rename_map("X", ""));
    assert_eq!(recorder.count(), 0);
}

#[test]
fn recheck_resends_when_state_reverted() {
    let (mut store, recorder) = store_with(scene_with_maps(&["X", "Z"], Some("Z")));
    store.rename_map("X", "Y");
    // The rename does not touch the active map, so the guard lets this through.
    let stale = scene_with_maps(&["X", "Z"], Some("Z"));
    assert_eq!(store.apply_incoming(stale), ApplyOutcome::Applied);

    assert!(store.recheck_pending_rename());
    assert!(store.scene().has_map("Y"));
    let sent = recorder.scenes();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].maps, sent[1].maps);
    assert_eq!(sent[0].active_map_id, sent[1].active_map_id);
    assert!(!store.has_pending_rename());
}

#[test]
fn recheck_is_quiet_when_rename_held() {
    let (mut store, recorder) = store_with(scene_with_maps(&["X"], Some("X")));
    store.rename_map("X", "Y");
    assert!(!store.recheck_pending_rename());
    assert_eq!(recorder.count(), 1);
    assert!(!store.recheck_pending_rename());
}

#[test]
fn revisions_increase_monotonically() {
    let (mut store, _) = store_with(scene_with_maps(&["X"], Some("X")));
    let mut last = store.revision();
    store.rename_map("X", "Y");
    assert!(store.revision() > last);
    last = store.revision();
    store.rename_map("Y", "Z");
    assert!(store.revision() > last);
}

// =============================================================
// maps
// =============================================================

#[test]
fn remove_active_map_clears_active() {
    let (mut store, _) = store_with(scene_with_maps(&["a", "b"], Some("a")));
    assert!(store.remove_map("a"));
    assert!(store.scene().active_map_id.is_none());
    assert!(!store.remove_map("a"));
}

#[test]
fn set_active_map_requires_known_name() {
    let (mut store, _) = store_with(scene_with_maps(&["a"], None));
    assert!(!store.set_active_map(Some("b")));
    assert!(store.set_active_map(Some("a")));
    assert!(store.set_active_map(None));
    assert!(store.scene().active_map_id.is_none());
}

#[test]
fn update_map_replaces_data() {
    let (mut store, _) = store_with(scene_with_maps(&["a"], None));
    let mut entry = MapEntry::new("a");
    entry.data.is_hidden = true;
    assert!(store.update_map(entry));
    assert!(store.scene().map("a").unwrap().data.is_hidden);
    assert!(!store.update_map(MapEntry::new("missing")));
}

// =============================================================
// markers / fog
// =============================================================

#[test]
fn marker_lifecycle() {
    let (mut store, _) = store_with(Scene::new("s", "n"));
    let mut marker = AoEMarker::new(MarkerShape::Cube, Point::new(2.0, 2.0), true, 10.0);
    assert!(store.add_marker(marker.clone()));
    assert!(!store.add_marker(marker.clone()));
    marker.size_in_feet = 30.0;
    assert!(store.update_marker(marker.clone()));
    assert_eq!(store.scene().marker(&marker.id).unwrap().size_in_feet, 30.0);
    assert!(store.remove_marker(&marker.id));
    assert!(store.scene().aoe_markers.is_empty());
}

#[test]
fn fog_polygon_needs_three_points() {
    let (mut store, _) = store_with(Scene::new("s", "n"));
    let two = FogPolygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)], true);
    assert!(!store.add_fog_polygon(two));
    let three = FogPolygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0)], true);
    let id = three.id.clone();
    assert!(store.add_fog_polygon(three));
    assert!(store.remove_fog_polygon(&id));
    assert!(!store.remove_fog_polygon(&id));
}

// =============================================================
// grid-mode switch
// =============================================================

fn pixel_scene() -> Scene {
    let mut scene = scene_with_maps(&["m"], Some("m"));
    scene.maps[0].data.position = Point::new(250.0, 130.0);
    scene.aoe_markers.push(AoEMarker::new(MarkerShape::Circle, Point::new(99.0, 401.0), false, 20.0));
    scene.fog_of_war.push(FogPolygon::new(
        vec![Point::new(0.0, 0.0), Point::new(149.0, 0.0), Point::new(149.0, 260.0)],
        false,
    ));
    scene
}

fn fixed_settings() -> GridSettings {
    GridSettings { use_fixed_grid: true, grid_cells_x: 10, grid_cells_y: 10, ..GridSettings::default() }
}

#[test]
fn entering_fixed_grid_converts_pixel_entities() {
    let (mut store, recorder) = store_with(pixel_scene());
    assert!(store.update_grid_settings(fixed_settings(), (1000.0, 1000.0)));
    let scene = store.scene();
    assert!(scene.grid_settings.use_fixed_grid);
    assert_eq!(scene.maps[0].data.position, Point::new(2.0, 1.0));
    assert!(scene.maps[0].data.use_grid_coordinates);
    assert_eq!(scene.aoe_markers[0].position, Point::new(0.0, 4.0));
    assert!(scene.aoe_markers[0].use_grid_coordinates);
    assert_eq!(
        scene.fog_of_war[0].points,
        vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 2.0)]
    );
    assert_eq!(recorder.count(), 1);
}

#[test]
fn grid_conversion_is_idempotent() {
    let (mut store, _) = store_with(pixel_scene());
    store.update_grid_settings(fixed_settings(), (1000.0, 1000.0));
    let once = store.scene().clone();
    let mut twice = once.clone();
    convert_to_grid(&mut twice, &GridTransform::new(1000.0, 1000.0, &fixed_settings()));
    assert_eq!(once, twice);
}

#[test]
fn grid_entities_are_not_reconverted() {
    let mut scene = pixel_scene();
    scene.aoe_markers[0].position = Point::new(7.0, 3.0);
    scene.aoe_markers[0].use_grid_coordinates = true;
    let (mut store, _) = store_with(scene);
    store.update_grid_settings(fixed_settings(), (1000.0, 1000.0));
    assert_eq!(store.scene().aoe_markers[0].position, Point::new(7.0, 3.0));
}

#[test]
fn other_grid_changes_do_not_convert() {
    let (mut store, _) = store_with(pixel_scene());
    let settings = GridSettings { grid_opacity: 0.9, ..GridSettings::default() };
    assert!(store.update_grid_settings(settings, (1000.0, 1000.0)));
    assert_eq!(store.scene().aoe_markers[0].position, Point::new(99.0, 401.0));
    let same = store.scene().grid_settings.clone();
    assert!(!store.update_grid_settings(same, (1000.0, 1000.0)));
}

// =============================================================
// initiative wrappers
// =============================================================

#[test]
fn initiative_mutations_commit_whole_documents() {
    let (mut store, recorder) = store_with(Scene::new("s", "n"));
    store.add_entry(InitiativeEntry::new("Aria", 18).with_hp(5));
    store.add_entry(InitiativeEntry::new("Goblin", 12).with_hp(7));
    assert!(store.advance_turn());
    let aria = store.scene().initiative_order[0].id.clone();
    assert!(store.adjust_hp(&aria, -10));

    let scene = store.scene();
    assert!(scene.initiative_order[0].is_killed);
    assert_eq!(scene.initiative_order[0].hp, Some(-5));
    assert!(scene.initiative_order[1].is_current_turn);

    let last = recorder.scenes().pop().unwrap();
    assert_eq!(&last, scene);
    assert!(store.clear_killed());
    assert_eq!(store.scene().initiative_order.len(), 1);
}

#[test]
fn repeated_kill_or_revive_is_not_a_commit() {
    let (mut store, recorder) = store_with(Scene::new("s", "n"));
    store.add_entry(InitiativeEntry::new("Aria", 18).with_hp(20));
    let aria = store.scene().initiative_order[0].id.clone();

    assert!(!store.revive(&aria));
    assert_eq!(store.scene().initiative_order[0].hp, Some(20));
    assert!(store.kill(&aria));
    assert!(!store.kill(&aria));
    assert_eq!(recorder.count(), 2);
}

#[test]
fn move_entry_to_same_slot_is_not_a_commit() {
    let (mut store, recorder) = store_with(Scene::new("s", "n"));
    store.add_entry(InitiativeEntry::new("a", 1));
    assert!(!store.move_entry(0, 0));
    assert_eq!(recorder.count(), 1);
}
