//! Drag/edit interaction controller.
//!
//! `EngineCore` turns host pointer, wheel, and key events into scene
//! mutations. It never owns the scene: every handler takes the store's
//! current document by reference and answers with [`Action`]s. A `Commit`
//! action carries a whole document for `SceneStore::commit_local`; the host
//! must route it there.
//!
//! During a drag the candidate document is kept as a local preview for
//! immediate display, and commits leave at most once per
//! `DRAG_EMIT_INTERVAL`. The [`Throttle`] parks only the latest pointer
//! position; a parked move is rebuilt against the store's document when the
//! frame releases it, so nothing applied in between is lost. Pointer-up
//! commits the last computed value;
//! Escape restores the pre-drag value. Move and up events must be delivered
//! even when the pointer has left the entity.
//!
//! Time is injected (`now`) so timers are plain deadlines checked by
//! [`EngineCore::tick`]. [`EngineCore::teardown`] clears them all.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::collections::HashMap;
use std::time::Instant;

use frames::Message;

use crate::consts::{
    DRAG_EMIT_INTERVAL, FOG_MIN_POINTS, HIGHLIGHT_DURATION, MARKER_MIN_SIZE_FT, MARKER_ROTATION_STEP_DEG,
    MARKER_SIZE_STEP_FT, SIZE_INDICATOR_DURATION,
};
use crate::doc::Scene;
use crate::grid::{Anchor, GridCell, GridTransform, Point};
use crate::hit::{self, fog_pixels, marker_pixel, nearest_edge};
use crate::input::{Button, DragSubject, InputState, Key, Modifiers, Target, UiState, WheelDelta};
use crate::throttle::Throttle;

/// Actions returned from input handlers for the host to process.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Replace the scene through the store's commit path.
    Commit(Box<Scene>),
    /// Send a message that is not a document update.
    Send(Message),
    SetCursor(String),
    RenderNeeded,
}

/// Interaction controller state. Testable without any windowing host.
pub struct EngineCore {
    pub ui: UiState,
    pub input: InputState,
    pub viewport_width: f64,
    pub viewport_height: f64,
    preview: Option<Scene>,
    throttle: Throttle<Point>,
    size_indicators: HashMap<String, Instant>,
    highlights: HashMap<String, Instant>,
}

impl Default for EngineCore {
    fn default() -> Self {
        Self {
            ui: UiState::default(),
            input: InputState::default(),
            viewport_width: 0.0,
            viewport_height: 0.0,
            preview: None,
            throttle: Throttle::new(DRAG_EMIT_INTERVAL),
            size_indicators: HashMap::new(),
            highlights: HashMap::new(),
        }
    }
}

impl EngineCore {
    #[must_use]
    pub fn new(ui: UiState) -> Self {
        Self { ui, ..Self::default() }
    }

    // --- Queries ---

    /// Transform for the current viewport under `scene`'s grid settings.
    #[must_use]
    pub fn transform(&self, scene: &Scene) -> GridTransform {
        GridTransform::new(self.viewport_width, self.viewport_height, &scene.grid_settings)
    }

    /// What lies under `pt`, ignoring maps.
    #[must_use]
    pub fn target_at(&self, scene: &Scene, pt: Point) -> Target {
        hit::hit_test(scene, &self.transform(scene), pt)
    }

    /// The document to draw: the drag preview if one is live, else `scene`.
    #[must_use]
    pub fn display_scene<'a>(&'a self, scene: &'a Scene) -> &'a Scene {
        self.preview.as_ref().unwrap_or(scene)
    }

    #[must_use]
    pub fn size_indicator_visible(&self, marker_id: &str, now: Instant) -> bool {
        self.size_indicators.get(marker_id).is_some_and(|&until| now < until)
    }

    #[must_use]
    pub fn is_highlighted(&self, marker_id: &str, now: Instant) -> bool {
        self.highlights.get(marker_id).is_some_and(|&until| now < until)
    }

    #[must_use]
    pub fn has_pending_timers(&self) -> bool {
        !self.size_indicators.is_empty() || !self.highlights.is_empty()
    }

    // --- Viewport ---

    /// Record a new viewport size. Viewers ask for a fresh scene afterwards.
    #[allow(clippy::float_cmp)]
    pub fn set_viewport(&mut self, width: f64, height: f64) -> Vec<Action> {
        if width == self.viewport_width && height == self.viewport_height {
            return Vec::new();
        }
        self.viewport_width = width;
        self.viewport_height = height;
        let mut actions = vec![Action::RenderNeeded];
        if !self.ui.is_admin && width > 0.0 && height > 0.0 {
            actions.push(Action::Send(Message::RequestSceneUpdate));
        }
        actions
    }

    // --- Pointer ---

    fn accepts_edits(&self) -> bool {
        self.ui.is_active && self.ui.is_admin
    }

    pub fn on_pointer_down(
        &mut self,
        scene: &Scene,
        target: Target,
        pt: Point,
        button: Button,
        modifiers: Modifiers,
    ) -> Vec<Action> {
        if !self.accepts_edits() || button != Button::Primary || !self.input.is_idle() {
            return Vec::new();
        }
        let transform = self.transform(scene);
        let state = match target {
            Target::Map(name) => scene.map(&name).map(|map| InputState::Dragging {
                anchor: transform.to_pixel(map.data.position, map.data.use_grid_coordinates, Anchor::Corner),
                subject: DragSubject::Map { name: name.clone(), original: map.data.clone() },
                start: pt,
            }),
            Target::Marker(id) => scene.marker(&id).map(|marker| InputState::Dragging {
                anchor: marker_pixel(marker, &transform),
                subject: DragSubject::Marker { id: id.clone(), original: marker.position },
                start: pt,
            }),
            Target::FogVertex { polygon, index } => scene
                .fog(&polygon)
                .and_then(|fog| fog.points.get(index).copied())
                .map(|original| InputState::EditingPoint { polygon, index, original }),
            Target::Fog(id) if modifiers.alternate() => scene.fog(&id).map(|fog| InputState::Dragging {
                anchor: pt,
                subject: DragSubject::Fog { id: id.clone(), original: fog.points.clone() },
                start: pt,
            }),
            Target::Fog(_) | Target::None => None,
        };
        let Some(state) = state else {
            return Vec::new();
        };
        self.input = state;
        self.throttle.reset();
        vec![Action::SetCursor("grabbing".to_owned())]
    }

    pub fn on_pointer_move(&mut self, scene: &Scene, pt: Point, now: Instant) -> Vec<Action> {
        if self.input.is_idle() {
            return Vec::new();
        }
        let Some(next) = self.apply_gesture(scene, pt) else {
            // The entity vanished under us (remote delete).
            self.finish();
            return vec![Action::SetCursor("default".to_owned()), Action::RenderNeeded];
        };
        let mut actions = vec![Action::RenderNeeded];
        if self.throttle.offer(pt, now).is_some() {
            actions.push(Action::Commit(Box::new(next.clone())));
        }
        self.preview = Some(next);
        actions
    }

    pub fn on_pointer_up(&mut self, scene: &Scene, pt: Point) -> Vec<Action> {
        if self.input.is_idle() {
            return Vec::new();
        }
        let committed = self.apply_gesture(scene, pt);
        self.finish();
        let mut actions = vec![Action::SetCursor("default".to_owned()), Action::RenderNeeded];
        if let Some(next) = committed.filter(|next| next != scene) {
            actions.push(Action::Commit(Box::new(next)));
        }
        actions
    }

    /// Escape cancels the gesture and puts the entity back where it started.
    pub fn on_key_down(&mut self, scene: &Scene, key: &Key) -> Vec<Action> {
        if !key.is_escape() || self.input.is_idle() {
            return Vec::new();
        }
        let reverted = self.revert_gesture(scene);
        self.finish();
        let mut actions = vec![Action::SetCursor("default".to_owned()), Action::RenderNeeded];
        if let Some(next) = reverted.filter(|next| next != scene) {
            actions.push(Action::Commit(Box::new(next)));
        }
        actions
    }

    /// Wheel over a marker resizes it, or rotates it with the alternate
    /// modifier held. Either way the size indicator timer restarts.
    pub fn on_wheel(
        &mut self,
        scene: &Scene,
        target: &Target,
        delta: WheelDelta,
        modifiers: Modifiers,
        now: Instant,
    ) -> Vec<Action> {
        let Target::Marker(id) = target else {
            return Vec::new();
        };
        let notch = delta.notch();
        if !self.accepts_edits() || notch == 0.0 {
            return Vec::new();
        }
        let mut next = scene.clone();
        let Some(marker) = next.marker_mut(id) else {
            return Vec::new();
        };
        if modifiers.alternate() {
            marker.rotation = (marker.rotation + notch * MARKER_ROTATION_STEP_DEG).rem_euclid(360.0);
        } else {
            marker.size_in_feet = (marker.size_in_feet + notch * MARKER_SIZE_STEP_FT).max(MARKER_MIN_SIZE_FT);
        }
        self.size_indicators.insert(id.clone(), now + SIZE_INDICATOR_DURATION);
        let mut actions = vec![Action::RenderNeeded];
        if next != *scene {
            actions.push(Action::Commit(Box::new(next)));
        }
        actions
    }

    /// Double-click: remove a fog vertex, insert one on the nearest fog edge,
    /// or ask viewers to highlight a marker.
    pub fn on_double_click(&mut self, scene: &Scene, target: &Target, pt: Point) -> Vec<Action> {
        if !self.accepts_edits() {
            return Vec::new();
        }
        match target {
            Target::FogVertex { polygon, index } => {
                let mut next = scene.clone();
                let Some(fog) = next.fog_mut(polygon) else {
                    return Vec::new();
                };
                if fog.points.len() <= FOG_MIN_POINTS || *index >= fog.points.len() {
                    return Vec::new();
                }
                fog.points.remove(*index);
                vec![Action::Commit(Box::new(next)), Action::RenderNeeded]
            }
            Target::Fog(id) => {
                let transform = self.transform(scene);
                let mut next = scene.clone();
                let Some(fog) = next.fog_mut(id) else {
                    return Vec::new();
                };
                let Some(edge) = nearest_edge(&fog_pixels(fog, &transform), pt) else {
                    return Vec::new();
                };
                let vertex = transform.to_canonical(edge.projection, fog.use_grid_coordinates);
                fog.points.insert(edge.index + 1, vertex);
                vec![Action::Commit(Box::new(next)), Action::RenderNeeded]
            }
            Target::Marker(id) if scene.marker(id).is_some() => {
                vec![Action::Send(Message::HighlightMarker { marker_id: id.clone() })]
            }
            Target::Marker(_) | Target::Map(_) | Target::None => Vec::new(),
        }
    }

    // --- Timers ---

    /// A `highlight_marker` arrived: flash the marker.
    pub fn on_highlight(&mut self, marker_id: &str, now: Instant) -> Vec<Action> {
        self.highlights.insert(marker_id.to_owned(), now + HIGHLIGHT_DURATION);
        vec![Action::RenderNeeded]
    }

    /// Once per animation frame: release a parked drag update and expire
    /// timers. `scene` is the store's current document.
    pub fn on_frame(&mut self, scene: &Scene, now: Instant) -> Vec<Action> {
        let mut actions = self.tick(now);
        let Some(pt) = self.throttle.poll(now) else {
            return actions;
        };
        match self.apply_gesture(scene, pt) {
            Some(next) => {
                self.preview = Some(next.clone());
                if next != *scene {
                    actions.push(Action::Commit(Box::new(next)));
                }
            }
            None => {
                self.finish();
                actions.push(Action::SetCursor("default".to_owned()));
            }
        }
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Expire elapsed size-indicator and highlight timers.
    pub fn tick(&mut self, now: Instant) -> Vec<Action> {
        let before = self.size_indicators.len() + self.highlights.len();
        self.size_indicators.retain(|_, until| now < *until);
        self.highlights.retain(|_, until| now < *until);
        if self.size_indicators.len() + self.highlights.len() == before {
            Vec::new()
        } else {
            vec![Action::RenderNeeded]
        }
    }

    /// Drop every timer and any gesture in flight.
    pub fn teardown(&mut self) {
        self.size_indicators.clear();
        self.highlights.clear();
        self.finish();
    }

    // --- Gesture internals ---

    fn finish(&mut self) {
        self.input = InputState::Idle;
        self.preview = None;
        self.throttle.reset();
    }

    /// `scene` with the active gesture applied at pointer position `pt`.
    /// `None` when idle or when the entity no longer exists.
    fn apply_gesture(&self, scene: &Scene, pt: Point) -> Option<Scene> {
        let transform = self.transform(scene);
        let mut next = scene.clone();
        match &self.input {
            InputState::Idle => return None,
            InputState::Dragging { subject, start, anchor } => {
                let (dx, dy) = (pt.x - start.x, pt.y - start.y);
                let pixel = anchor.offset(dx, dy);
                match subject {
                    DragSubject::Map { name, original } => {
                        let data = &mut next.map_mut(name)?.data;
                        data.position = if data.use_grid_coordinates {
                            shift_by_cells(&transform, original.position, *start, pt)
                        } else {
                            pixel
                        };
                    }
                    DragSubject::Marker { id, .. } => {
                        let marker = next.marker_mut(id)?;
                        marker.position = transform.to_canonical(pixel, marker.use_grid_coordinates);
                    }
                    DragSubject::Fog { id, original } => {
                        let fog = next.fog_mut(id)?;
                        let grid = fog.use_grid_coordinates;
                        fog.points = original
                            .iter()
                            .map(|&p| if grid { shift_by_cells(&transform, p, *start, pt) } else { p.offset(dx, dy) })
                            .collect();
                    }
                }
            }
            InputState::EditingPoint { polygon, index, .. } => {
                let fog = next.fog_mut(polygon)?;
                let grid = fog.use_grid_coordinates;
                *fog.points.get_mut(*index)? = transform.to_canonical(pt, grid);
            }
        }
        Some(next)
    }

    /// `scene` with the gesture's entity restored to its pre-drag value.
    fn revert_gesture(&self, scene: &Scene) -> Option<Scene> {
        let mut next = scene.clone();
        match &self.input {
            InputState::Idle => return None,
            InputState::Dragging { subject, .. } => match subject {
                DragSubject::Map { name, original } => next.map_mut(name)?.data = original.clone(),
                DragSubject::Marker { id, original } => next.marker_mut(id)?.position = *original,
                DragSubject::Fog { id, original } => next.fog_mut(id)?.points.clone_from(original),
            },
            InputState::EditingPoint { polygon, index, original } => {
                *next.fog_mut(polygon)?.points.get_mut(*index)? = *original;
            }
        }
        Some(next)
    }
}

/// Move a grid position by the number of cell boundaries the pointer crossed
/// between `from` and `to`.
fn shift_by_cells(transform: &GridTransform, position: Point, from: Point, to: Point) -> Point {
    let (a, b) = (transform.pixel_to_grid(from), transform.pixel_to_grid(to));
    let cell = GridCell::from_point(position);
    GridCell::new(cell.x + b.x - a.x, cell.y + b.y - a.y).to_point()
}
