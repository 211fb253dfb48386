//! Hit-testing and polygon geometry in viewport-pixel space.

#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use crate::consts::{EDGE_SLOP_PX, HANDLE_RADIUS_PX, MIN_MARKER_HIT_RADIUS_PX};
use crate::doc::{AoEMarker, FogPolygon, Scene};
use crate::grid::{Anchor, GridTransform, Point};
use crate::input::Target;

/// Closest point to `p` on segment `a`-`b`, clamped to the segment.
#[must_use]
pub fn project_onto_segment(p: Point, a: Point, b: Point) -> Point {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= 0.0 {
        return a;
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    Point::new(a.x + t * dx, a.y + t * dy)
}

/// The edge of a closed polygon nearest to a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeHit {
    /// Edge runs from vertex `index` to vertex `index + 1` (wrapping).
    pub index: usize,
    pub projection: Point,
    pub distance: f64,
}

/// Nearest edge of the closed polygon `points` to `p`. Ties go to the lower
/// edge index.
#[must_use]
pub fn nearest_edge(points: &[Point], p: Point) -> Option<EdgeHit> {
    if points.len() < 2 {
        return None;
    }
    let mut best: Option<EdgeHit> = None;
    for (index, &a) in points.iter().enumerate() {
        let b = points[(index + 1) % points.len()];
        let projection = project_onto_segment(p, a, b);
        let distance = projection.distance(p);
        if best.is_none_or(|hit| distance < hit.distance) {
            best = Some(EdgeHit { index, projection, distance });
        }
    }
    best
}

/// Even-odd ray cast.
#[must_use]
pub fn point_in_polygon(points: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = points.len().wrapping_sub(1);
    for (i, &a) in points.iter().enumerate() {
        let b = points[j];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Vertex positions of a fog polygon in pixels. Grid vertices sit on cell
/// corners.
#[must_use]
pub fn fog_pixels(polygon: &FogPolygon, transform: &GridTransform) -> Vec<Point> {
    polygon
        .points
        .iter()
        .map(|&p| transform.to_pixel(p, polygon.use_grid_coordinates, Anchor::Corner))
        .collect()
}

/// Marker center in pixels. Grid markers sit at cell centers.
#[must_use]
pub fn marker_pixel(marker: &AoEMarker, transform: &GridTransform) -> Point {
    transform.to_pixel(marker.position, marker.use_grid_coordinates, Anchor::Center)
}

/// Pixel radius within which a marker counts as hit.
#[must_use]
pub fn marker_hit_radius(marker: &AoEMarker, transform: &GridTransform) -> f64 {
    (transform.feet_to_pixels(marker.size_in_feet) / 2.0).max(MIN_MARKER_HIT_RADIUS_PX)
}

/// Resolve what lies under `p`: fog vertex handles first, then markers
/// (topmost wins), then fog bodies and their edges. Maps are not resolved here.
#[must_use]
pub fn hit_test(scene: &Scene, transform: &GridTransform, p: Point) -> Target {
    for polygon in scene.fog_of_war.iter().rev() {
        let pixels = fog_pixels(polygon, transform);
        if let Some(index) = pixels.iter().position(|v| v.distance(p) <= HANDLE_RADIUS_PX) {
            return Target::FogVertex { polygon: polygon.id.clone(), index };
        }
    }
    for marker in scene.aoe_markers.iter().rev() {
        if marker_pixel(marker, transform).distance(p) <= marker_hit_radius(marker, transform) {
            return Target::Marker(marker.id.clone());
        }
    }
    for polygon in scene.fog_of_war.iter().rev() {
        let pixels = fog_pixels(polygon, transform);
        let near_edge = nearest_edge(&pixels, p).is_some_and(|e| e.distance <= EDGE_SLOP_PX);
        if near_edge || point_in_polygon(&pixels, p) {
            return Target::Fog(polygon.id.clone());
        }
    }
    Target::None
}
