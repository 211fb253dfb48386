//! Shared numeric constants for the canvas crate.

use std::time::Duration;

// ── Grid ────────────────────────────────────────────────────────

/// Real-world feet covered by one grid cell.
pub const FEET_PER_CELL: f64 = 5.0;

/// Tolerance added before flooring so exact grid lines land in the right cell.
pub const GRID_EPSILON: f64 = 1e-9;

// ── Hit-testing ─────────────────────────────────────────────────

/// Screen-space hit slop in pixels for fog vertex handles.
pub const HANDLE_RADIUS_PX: f64 = 8.0;

/// Screen-space distance within which a double-click counts as on an edge.
pub const EDGE_SLOP_PX: f64 = 10.0;

/// Minimum hit radius for markers, so tiny markers stay grabbable.
pub const MIN_MARKER_HIT_RADIUS_PX: f64 = 10.0;

// ── Markers ─────────────────────────────────────────────────────

/// Size change per wheel notch, in feet.
pub const MARKER_SIZE_STEP_FT: f64 = 5.0;

/// Smallest marker size, in feet.
pub const MARKER_MIN_SIZE_FT: f64 = 5.0;

/// Rotation change per wheel notch with the modifier held, in degrees.
pub const MARKER_ROTATION_STEP_DEG: f64 = 5.0;

// ── Fog ─────────────────────────────────────────────────────────

/// A fog polygon never drops below this many vertices.
pub const FOG_MIN_POINTS: usize = 3;

// ── Timing ──────────────────────────────────────────────────────

/// Minimum spacing between drag updates pushed to the store (~30 fps).
pub const DRAG_EMIT_INTERVAL: Duration = Duration::from_millis(32);

/// How long the size indicator stays up after the last wheel event.
pub const SIZE_INDICATOR_DURATION: Duration = Duration::from_millis(1500);

/// How long a highlighted marker flashes on viewers.
pub const HIGHLIGHT_DURATION: Duration = Duration::from_millis(2000);

/// Delay before re-checking that a local rename survived incoming snapshots.
pub const RENAME_RECHECK_DELAY: Duration = Duration::from_millis(500);

// ── Initiative ──────────────────────────────────────────────────

/// Hit points assigned to a revived entry.
pub const REVIVE_HP: i64 = 1;
