//! Scene state store: the single owner of the live scene document.
//!
//! Every change flows through one of two doors. `apply_incoming` takes a
//! remote snapshot and replaces local state unless the stale-snapshot guard
//! fires. `commit_local` replaces local state and hands the whole document to
//! the [`Outbound`] sink as a `scene_update`. There is no diff protocol; every
//! mutation helper below edits a copy of the scene and commits it whole.
//!
//! RACE GUARD
//! ==========
//!
//! Renaming a map changes its identity key. A broadcast produced before the
//! rename reached the relay still names the old key, and applying it would
//! undo the rename. The store remembers its last local rename until a
//! snapshot listing the new name is applied; meanwhile a snapshot whose
//! active map is still the old name and which lacks the new one is rejected.
//! A store that never renamed anything accepts every snapshot. Concurrent
//! renames by two writers are not resolved.
//!
//! A rename also leaves a pending re-check: if local state has reverted to the
//! old name by the time [`SceneStore::recheck_pending_rename`] runs, the
//! post-rename snapshot is committed a second time.
//!
//! REVISION
//! ========
//!
//! Every committed document carries a `revision` field, a Lamport-style
//! counter: a commit stamps one more than the highest revision this store has
//! committed or applied.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::sync::Arc;

use frames::Message;
use serde_json::Value;
use tracing::{debug, info};

use crate::consts::FOG_MIN_POINTS;
use crate::doc::{AoEMarker, FogPolygon, GridSettings, InitiativeEntry, MapEntry, MapId, Scene};
use crate::grid::GridTransform;
use crate::initiative;

/// Sink for outbound messages. Implemented by the transport channel; tests
/// use a recorder.
pub trait Outbound: Send + Sync {
    fn send(&self, message: Message);
}

/// Result of offering a remote snapshot to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The race guard kept local state.
    Rejected,
}

/// Document field holding the commit revision.
pub const REVISION_FIELD: &str = "revision";

/// The last local rename, kept until a snapshot that knows the new name
/// arrives.
#[derive(Debug, Clone)]
struct RenameGuard {
    from: MapId,
    to: MapId,
}

impl RenameGuard {
    fn rejects(&self, remote: &Scene) -> bool {
        remote.active_map_id.as_deref() == Some(self.from.as_str()) && !remote.has_map(&self.to)
    }
}

/// A rename that may still need a second commit.
#[derive(Debug, Clone)]
struct PendingRename {
    from: MapId,
    to: MapId,
    snapshot: Scene,
}

pub struct SceneStore {
    scene: Scene,
    revision: u64,
    pending_rename: Option<PendingRename>,
    rename_guard: Option<RenameGuard>,
    outbound: Arc<dyn Outbound>,
}

impl SceneStore {
    #[must_use]
    pub fn new(scene: Scene, outbound: Arc<dyn Outbound>) -> Self {
        let revision = revision_of(&scene).unwrap_or(0);
        Self { scene, revision, pending_rename: None, rename_guard: None, outbound }
    }

    /// Read-only view of the current document.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Logical clock: above every revision committed here or applied from a
    /// peer.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn has_pending_rename(&self) -> bool {
        self.pending_rename.is_some()
    }

    // =========================================================================
    // INCOMING / OUTGOING
    // =========================================================================

    /// Replace local state with a remote snapshot unless it looks older than
    /// a local rename.
    pub fn apply_incoming(&mut self, remote: Scene) -> ApplyOutcome {
        if let Some(guard) = &self.rename_guard {
            if guard.rejects(&remote) {
                info!(
                    from = %guard.from,
                    to = %guard.to,
                    remote_active = ?remote.active_map_id,
                    "rejected stale scene snapshot"
                );
                return ApplyOutcome::Rejected;
            }
            if remote.has_map(&guard.to) {
                self.rename_guard = None;
            }
        }
        if let Some(remote_revision) = revision_of(&remote) {
            self.revision = self.revision.max(remote_revision);
        }
        self.scene = remote;
        ApplyOutcome::Applied
    }

    /// Replace local state and send the full document.
    pub fn commit_local(&mut self, mut scene: Scene) {
        self.revision += 1;
        scene.extra.insert(REVISION_FIELD.to_owned(), Value::from(self.revision));
        self.scene = scene;
        debug!(revision = self.revision, "committing scene");
        self.outbound.send(Message::SceneUpdate { scene: self.scene.to_value() });
    }

    /// Apply `edit` to a copy of the scene and commit it if `edit` reports a
    /// change. Returns what `edit` returned.
    pub fn mutate(&mut self, edit: impl FnOnce(&mut Scene) -> bool) -> bool {
        let mut next = self.scene.clone();
        if !edit(&mut next) {
            return false;
        }
        self.commit_local(next);
        true
    }

    // =========================================================================
    // MAPS
    // =========================================================================

    /// Rename a map in place, carrying `activeMapId` along. Rejects unknown
    /// sources, taken targets, and no-op renames.
    pub fn rename_map(&mut self, from: &str, to: &str) -> bool {
        if from == to || to.is_empty() || !self.scene.has_map(from) || self.scene.has_map(to) {
            return false;
        }
        let mut next = self.scene.clone();
        if let Some(map) = next.map_mut(from) {
            map.name = to.to_owned();
        }
        if next.active_map_id.as_deref() == Some(from) {
            next.active_map_id = Some(to.to_owned());
        }
        self.commit_local(next);
        self.rename_guard = Some(RenameGuard { from: from.to_owned(), to: to.to_owned() });
        self.pending_rename =
            Some(PendingRename { from: from.to_owned(), to: to.to_owned(), snapshot: self.scene.clone() });
        true
    }

    /// Second half of a rename: if the old name has come back, commit the
    /// post-rename snapshot again. Clears the pending rename either way.
    pub fn recheck_pending_rename(&mut self) -> bool {
        let Some(pending) = self.pending_rename.take() else {
            return false;
        };
        let reverted = (self.scene.has_map(&pending.from) && !self.scene.has_map(&pending.to))
            || self.scene.active_map_id.as_deref() == Some(pending.from.as_str());
        if !reverted {
            return false;
        }
        info!(from = %pending.from, to = %pending.to, "rename reverted; re-sending snapshot");
        self.commit_local(pending.snapshot);
        true
    }

    /// Add a map. Names are identity keys, so duplicates are refused.
    pub fn add_map(&mut self, entry: MapEntry) -> bool {
        self.mutate(|scene| {
            if scene.has_map(&entry.name) {
                return false;
            }
            scene.maps.push(entry);
            true
        })
    }

    /// Remove a map, clearing `activeMapId` if it pointed there.
    pub fn remove_map(&mut self, name: &str) -> bool {
        self.mutate(|scene| {
            let before = scene.maps.len();
            scene.maps.retain(|m| m.name != name);
            if scene.maps.len() == before {
                return false;
            }
            if scene.active_map_id.as_deref() == Some(name) {
                scene.active_map_id = None;
            }
            true
        })
    }

    /// Display a map, or nothing with `None`. Unknown names are refused.
    pub fn set_active_map(&mut self, name: Option<&str>) -> bool {
        self.mutate(|scene| {
            if let Some(name) = name {
                if !scene.has_map(name) {
                    return false;
                }
            }
            scene.active_map_id = name.map(str::to_owned);
            true
        })
    }

    /// Replace a map's placement data.
    pub fn update_map(&mut self, entry: MapEntry) -> bool {
        self.mutate(|scene| {
            let Some(slot) = scene.map_mut(&entry.name) else {
                return false;
            };
            *slot = entry;
            true
        })
    }

    // =========================================================================
    // MARKERS / FOG
    // =========================================================================

    pub fn add_marker(&mut self, marker: AoEMarker) -> bool {
        self.mutate(|scene| {
            if scene.marker(&marker.id).is_some() {
                return false;
            }
            scene.aoe_markers.push(marker);
            true
        })
    }

    pub fn remove_marker(&mut self, id: &str) -> bool {
        self.mutate(|scene| {
            let before = scene.aoe_markers.len();
            scene.aoe_markers.retain(|m| m.id != id);
            scene.aoe_markers.len() != before
        })
    }

    pub fn update_marker(&mut self, marker: AoEMarker) -> bool {
        self.mutate(|scene| {
            let Some(slot) = scene.marker_mut(&marker.id) else {
                return false;
            };
            *slot = marker;
            true
        })
    }

    /// Add a fog polygon. Fewer than three points is not a polygon.
    pub fn add_fog_polygon(&mut self, polygon: FogPolygon) -> bool {
        self.mutate(|scene| {
            if polygon.points.len() < FOG_MIN_POINTS || scene.fog(&polygon.id).is_some() {
                return false;
            }
            scene.fog_of_war.push(polygon);
            true
        })
    }

    pub fn remove_fog_polygon(&mut self, id: &str) -> bool {
        self.mutate(|scene| {
            let before = scene.fog_of_war.len();
            scene.fog_of_war.retain(|f| f.id != id);
            scene.fog_of_war.len() != before
        })
    }

    // =========================================================================
    // GRID SETTINGS
    // =========================================================================

    /// Replace the grid settings. Turning fixed-grid mode on converts every
    /// pixel-addressed map, marker, and fog polygon to grid cells under the
    /// new settings and viewport.
    pub fn update_grid_settings(&mut self, settings: GridSettings, viewport: (f64, f64)) -> bool {
        if settings == self.scene.grid_settings {
            return false;
        }
        let entering_fixed = settings.use_fixed_grid && !self.scene.grid_settings.use_fixed_grid;
        let transform = GridTransform::new(viewport.0, viewport.1, &settings);
        self.mutate(|scene| {
            scene.grid_settings = settings;
            if entering_fixed {
                convert_to_grid(scene, &transform);
            }
            true
        })
    }

    // =========================================================================
    // INITIATIVE
    // =========================================================================

    pub fn advance_turn(&mut self) -> bool {
        self.mutate(|scene| initiative::advance(&mut scene.initiative_order))
    }

    pub fn retreat_turn(&mut self) -> bool {
        self.mutate(|scene| initiative::retreat(&mut scene.initiative_order))
    }

    pub fn kill(&mut self, id: &str) -> bool {
        self.mutate(|scene| initiative::kill(&mut scene.initiative_order, id))
    }

    pub fn revive(&mut self, id: &str) -> bool {
        self.mutate(|scene| initiative::revive(&mut scene.initiative_order, id))
    }

    pub fn adjust_hp(&mut self, id: &str, delta: i64) -> bool {
        self.mutate(|scene| initiative::adjust_hp(&mut scene.initiative_order, id, delta))
    }

    pub fn set_hp(&mut self, id: &str, hp: i64) -> bool {
        self.mutate(|scene| initiative::set_hp(&mut scene.initiative_order, id, hp))
    }

    pub fn add_entry(&mut self, entry: InitiativeEntry) {
        self.mutate(|scene| {
            initiative::add_entry(&mut scene.initiative_order, entry);
            true
        });
    }

    pub fn remove_entry(&mut self, id: &str) -> bool {
        self.mutate(|scene| initiative::remove_entry(&mut scene.initiative_order, id))
    }

    pub fn clear_killed(&mut self) -> bool {
        self.mutate(|scene| initiative::clear_killed(&mut scene.initiative_order) > 0)
    }

    pub fn move_entry(&mut self, from: usize, to: usize) -> bool {
        self.mutate(|scene| from != to && initiative::move_entry(&mut scene.initiative_order, from, to))
    }

    pub fn set_show_current_player(&mut self, show: bool) -> bool {
        self.mutate(|scene| {
            if scene.show_current_player == show {
                return false;
            }
            scene.show_current_player = show;
            true
        })
    }
}

fn revision_of(scene: &Scene) -> Option<u64> {
    scene.extra.get(REVISION_FIELD).and_then(Value::as_u64)
}

/// One-time pixel to grid conversion. Entities already grid-addressed are
/// left alone, so running it twice changes nothing.
fn convert_to_grid(scene: &mut Scene, transform: &GridTransform) {
    for map in &mut scene.maps {
        if !map.data.use_grid_coordinates {
            map.data.position = transform.to_canonical(map.data.position, true);
            map.data.use_grid_coordinates = true;
        }
    }
    for marker in &mut scene.aoe_markers {
        if !marker.use_grid_coordinates {
            marker.position = transform.to_canonical(marker.position, true);
            marker.use_grid_coordinates = true;
        }
    }
    for polygon in &mut scene.fog_of_war {
        if !polygon.use_grid_coordinates {
            for point in &mut polygon.points {
                *point = transform.to_canonical(*point, true);
            }
            polygon.use_grid_coordinates = true;
        }
    }
}
