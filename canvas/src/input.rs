//! Input model: modifier keys, mouse buttons, pointer targets, and the
//! drag/edit state machine.
//!
//! `Target` names what a pointer event landed on. Markers and fog are resolved
//! by [`crate::hit::hit_test`]; maps are resolved by the host, which knows the
//! rendered image bounds. `InputState` is the gesture tracked between
//! pointer-down and pointer-up, carrying the entity's pre-drag value so
//! Escape can restore it.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::doc::{MapData, MapId};
use crate::grid::Point;

/// Keyboard/mouse modifier keys held during an event.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    /// Shift key is held.
    pub shift: bool,
    /// Ctrl key is held.
    pub ctrl: bool,
    /// Alt / Option key is held.
    pub alt: bool,
    /// Meta / Command key is held.
    pub meta: bool,
}

impl Modifiers {
    /// The modifier that switches fog to whole-polygon drag and the wheel to
    /// rotation.
    #[must_use]
    pub fn alternate(self) -> bool {
        self.shift
    }
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left mouse button (or single-finger tap).
    Primary,
    /// Middle mouse button (scroll wheel click).
    Middle,
    /// Right mouse button (or two-finger tap).
    Secondary,
}

/// A keyboard key.
///
/// The inner string holds the key name as reported by the host (e.g. `"Escape"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(pub String);

impl Key {
    #[must_use]
    pub fn is_escape(&self) -> bool {
        self.0 == "Escape"
    }
}

/// Wheel / trackpad scroll delta.
#[derive(Debug, Clone, Copy)]
pub struct WheelDelta {
    /// Horizontal scroll amount in pixels.
    pub dx: f64,
    /// Vertical scroll amount in pixels (positive = down).
    pub dy: f64,
}

impl WheelDelta {
    /// +1 for one notch up (grow, rotate clockwise), -1 for down, 0 for a
    /// purely horizontal scroll.
    #[must_use]
    pub fn notch(self) -> f64 {
        if self.dy < 0.0 {
            1.0
        } else if self.dy > 0.0 {
            -1.0
        } else {
            0.0
        }
    }
}

/// What a pointer event landed on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    /// Empty space.
    #[default]
    None,
    /// A map image, by name.
    Map(MapId),
    /// An area-of-effect marker, by id.
    Marker(String),
    /// The body or an edge of a fog polygon.
    Fog(String),
    /// One vertex handle of a fog polygon.
    FogVertex { polygon: String, index: usize },
}

/// Role and activity flags for the local client.
#[derive(Debug, Clone, Copy, Default)]
pub struct UiState {
    /// May mutate the scene.
    pub is_admin: bool,
    /// Accepts pointer input at all.
    pub is_active: bool,
}

/// The entity being moved, with the value it had before the drag began.
#[derive(Debug, Clone, PartialEq)]
pub enum DragSubject {
    Map { name: MapId, original: MapData },
    Marker { id: String, original: Point },
    /// Whole-polygon move; `original` holds every vertex.
    Fog { id: String, original: Vec<Point> },
}

/// Internal state for the input state machine.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InputState {
    /// No gesture in progress; waiting for the next pointer-down.
    #[default]
    Idle,
    /// Moving a whole entity.
    Dragging {
        subject: DragSubject,
        /// Pointer position at pointer-down, in viewport pixels.
        start: Point,
        /// The entity's own pixel anchor at pointer-down.
        anchor: Point,
    },
    /// Moving one fog vertex.
    EditingPoint {
        polygon: String,
        index: usize,
        original: Point,
    },
}

impl InputState {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}
