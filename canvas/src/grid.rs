//! Coordinate transform engine: grid cells to viewport pixels and back.
//!
//! Only grid-cell coordinates (or raw pixels in free mode) are canonical and
//! persisted. Pixel positions are always derived from a [`GridTransform`]
//! built for the current viewport, so a transform must be rebuilt whenever
//! the viewport is resized.

#[cfg(test)]
#[path = "grid_test.rs"]
mod grid_test;

use serde::{Deserialize, Serialize};

use crate::consts::{FEET_PER_CELL, GRID_EPSILON};
use crate::doc::GridSettings;

/// A point in either viewport-pixel or grid space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    #[must_use]
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Integer index of one addressable grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridCell {
    pub x: i64,
    pub y: i64,
}

impl GridCell {
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Read a stored grid position. Stored values are whole numbers; rounding
    /// only absorbs float noise from JSON.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_point(p: Point) -> Self {
        Self { x: p.x.round() as i64, y: p.y.round() as i64 }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_point(self) -> Point {
        Point { x: self.x as f64, y: self.y as f64 }
    }
}

/// Where a grid-addressed entity renders relative to its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Visual center of the cell (markers).
    Center,
    /// Top-left grid-line intersection (fog vertices, map origins).
    Corner,
}

/// Pure grid/pixel conversions for one viewport size and grid configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTransform {
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub cells_x: u32,
    pub cells_y: u32,
    pub use_fixed_grid: bool,
    pub grid_size_px: f64,
}

impl GridTransform {
    /// Build a transform for a viewport of `width` x `height` pixels.
    #[must_use]
    pub fn new(width: f64, height: f64, settings: &GridSettings) -> Self {
        Self {
            viewport_width: width,
            viewport_height: height,
            cells_x: settings.grid_cells_x,
            cells_y: settings.grid_cells_y,
            use_fixed_grid: settings.use_fixed_grid,
            grid_size_px: settings.grid_size,
        }
    }

    /// Pixel width of one cell.
    #[must_use]
    pub fn cell_width(&self) -> f64 {
        self.viewport_width / f64::from(self.cells_x.max(1))
    }

    /// Pixel height of one cell.
    #[must_use]
    pub fn cell_height(&self) -> f64 {
        self.viewport_height / f64::from(self.cells_y.max(1))
    }

    /// Grid cell to pixel position for the given anchor.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn grid_to_pixel(&self, cell: GridCell, anchor: Anchor) -> Point {
        let offset = match anchor {
            Anchor::Center => 0.5,
            Anchor::Corner => 0.0,
        };
        Point {
            x: (cell.x as f64 + offset) * self.cell_width(),
            y: (cell.y as f64 + offset) * self.cell_height(),
        }
    }

    /// Center of the cell; used for markers.
    #[must_use]
    pub fn grid_to_pixel_center(&self, cell: GridCell) -> Point {
        self.grid_to_pixel(cell, Anchor::Center)
    }

    /// Top-left corner of the cell; used for fog vertices so polygons tile.
    #[must_use]
    pub fn grid_to_pixel_corner(&self, cell: GridCell) -> Point {
        self.grid_to_pixel(cell, Anchor::Corner)
    }

    /// The cell containing `point`. Floors, so any point inside a cell maps to it.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn pixel_to_grid(&self, point: Point) -> GridCell {
        let (w, h) = (self.cell_width(), self.cell_height());
        if w <= 0.0 || h <= 0.0 {
            return GridCell::default();
        }
        GridCell {
            x: (point.x / w + GRID_EPSILON).floor() as i64,
            y: (point.y / h + GRID_EPSILON).floor() as i64,
        }
    }

    /// Square cell size used for scaling: the smaller cell side in fixed mode,
    /// the configured pixel size otherwise.
    #[must_use]
    pub fn effective_grid_size(&self) -> f64 {
        if self.use_fixed_grid {
            self.cell_width().min(self.cell_height())
        } else {
            self.grid_size_px
        }
    }

    /// Convert a size in feet to pixels (5 ft per cell).
    #[must_use]
    pub fn feet_to_pixels(&self, feet: f64) -> f64 {
        feet * self.effective_grid_size() / FEET_PER_CELL
    }

    /// Pixel position of a stored (canonical) position.
    #[must_use]
    pub fn to_pixel(&self, position: Point, use_grid: bool, anchor: Anchor) -> Point {
        if use_grid {
            self.grid_to_pixel(GridCell::from_point(position), anchor)
        } else {
            position
        }
    }

    /// Canonical position for a pixel location: a floored cell for grid
    /// entities, the raw pixel otherwise.
    #[must_use]
    pub fn to_canonical(&self, pixel: Point, use_grid: bool) -> Point {
        if use_grid {
            self.pixel_to_grid(pixel).to_point()
        } else {
            pixel
        }
    }
}
