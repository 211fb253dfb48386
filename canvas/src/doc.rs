//! Document model: the scene and every entity positioned on it.
//!
//! This module defines the canonical scene document exchanged wholesale over
//! the transport (`Scene`) and the entity types it contains. Field names
//! follow the camelCase JSON shape used on the wire. Fields this crate does
//! not model are carried through untouched in `extra` so a whole-document
//! replace never drops data owned by other collaborators (storage, images).
//!
//! Positions are canonical: grid-cell indices when `use_grid_coordinates` is
//! set, raw viewport pixels otherwise. Pixel positions for display are always
//! derived through [`crate::grid::GridTransform`].

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::grid::Point;

/// Identity key of a map entry (its name).
pub type MapId = String;

/// Generate a fresh id for a marker, fog polygon, or initiative entry.
#[must_use]
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f64 {
    1.0
}

fn default_opacity() -> f64 {
    0.5
}

/// Root scene document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub maps: Vec<MapEntry>,
    /// Name of the displayed map. Should reference an entry in `maps`, but may
    /// transiently dangle while a rename propagates.
    #[serde(default)]
    pub active_map_id: Option<MapId>,
    #[serde(default)]
    pub grid_settings: GridSettings,
    #[serde(default)]
    pub initiative_order: Vec<InitiativeEntry>,
    #[serde(default = "default_true")]
    pub show_current_player: bool,
    #[serde(default)]
    pub aoe_markers: Vec<AoEMarker>,
    #[serde(default)]
    pub fog_of_war: Vec<FogPolygon>,
    /// Fields owned by other collaborators, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Scene {
    /// An empty scene with default grid settings.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            maps: Vec::new(),
            active_map_id: None,
            grid_settings: GridSettings::default(),
            initiative_order: Vec::new(),
            show_current_player: true,
            aoe_markers: Vec::new(),
            fog_of_war: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Parse a scene from a wire payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the payload does not describe a scene.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Serialize for the wire. Serialization of this type cannot fail, so a
    /// failure degrades to `null` rather than panicking.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    #[must_use]
    pub fn has_map(&self, name: &str) -> bool {
        self.maps.iter().any(|m| m.name == name)
    }

    #[must_use]
    pub fn map(&self, name: &str) -> Option<&MapEntry> {
        self.maps.iter().find(|m| m.name == name)
    }

    pub fn map_mut(&mut self, name: &str) -> Option<&mut MapEntry> {
        self.maps.iter_mut().find(|m| m.name == name)
    }

    /// The map `active_map_id` points at, if it resolves.
    #[must_use]
    pub fn active_map(&self) -> Option<&MapEntry> {
        self.active_map_id.as_deref().and_then(|name| self.map(name))
    }

    #[must_use]
    pub fn marker(&self, id: &str) -> Option<&AoEMarker> {
        self.aoe_markers.iter().find(|m| m.id == id)
    }

    pub fn marker_mut(&mut self, id: &str) -> Option<&mut AoEMarker> {
        self.aoe_markers.iter_mut().find(|m| m.id == id)
    }

    #[must_use]
    pub fn fog(&self, id: &str) -> Option<&FogPolygon> {
        self.fog_of_war.iter().find(|f| f.id == id)
    }

    pub fn fog_mut(&mut self, id: &str) -> Option<&mut FogPolygon> {
        self.fog_of_war.iter_mut().find(|f| f.id == id)
    }

    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&InitiativeEntry> {
        self.initiative_order.iter().find(|e| e.id == id)
    }
}

/// A positioned map image. `name` is the identity key within `Scene::maps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub name: MapId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default)]
    pub data: MapData,
}

impl MapEntry {
    #[must_use]
    pub fn new(name: impl Into<MapId>) -> Self {
        Self { name: name.into(), folder: None, data: MapData::default() }
    }
}

/// Placement of a map image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapData {
    #[serde(default)]
    pub position: Point,
    #[serde(default)]
    pub use_grid_coordinates: bool,
    #[serde(default)]
    pub use_grid_scaling: bool,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub is_hidden: bool,
}

impl Default for MapData {
    fn default() -> Self {
        Self {
            position: Point::default(),
            use_grid_coordinates: false,
            use_grid_scaling: false,
            scale: 1.0,
            rotation: 0.0,
            is_hidden: false,
        }
    }
}

/// Grid configuration governing every coordinate conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridSettings {
    pub show_grid: bool,
    /// Cell size in pixels for free (non-fixed) mode.
    pub grid_size: f64,
    pub use_fixed_grid: bool,
    pub grid_cells_x: u32,
    pub grid_cells_y: u32,
    pub grid_color: String,
    pub grid_opacity: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            show_grid: true,
            grid_size: 50.0,
            use_fixed_grid: false,
            grid_cells_x: 25,
            grid_cells_y: 18,
            grid_color: "#000000".to_owned(),
            grid_opacity: 0.5,
        }
    }
}

/// Area-of-effect template shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerShape {
    Circle,
    Cone,
    Line,
    Square,
    Cube,
    Cylinder,
}

/// An area-of-effect marker. Center-anchored when grid-addressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AoEMarker {
    pub id: String,
    pub shape: MarkerShape,
    pub position: Point,
    #[serde(default)]
    pub use_grid_coordinates: bool,
    pub size_in_feet: f64,
    pub color: String,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Degrees, kept in `[0, 360)`.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl AoEMarker {
    /// A new marker with a fresh id, placed at `position`.
    #[must_use]
    pub fn new(shape: MarkerShape, position: Point, use_grid_coordinates: bool, size_in_feet: f64) -> Self {
        Self {
            id: new_entity_id(),
            shape,
            position,
            use_grid_coordinates,
            size_in_feet,
            color: "#ff0000".to_owned(),
            opacity: default_opacity(),
            rotation: 0.0,
            label: None,
        }
    }
}

/// A fog-of-war polygon. Vertices are corner-anchored when grid-addressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FogPolygon {
    pub id: String,
    pub points: Vec<Point>,
    #[serde(default)]
    pub use_grid_coordinates: bool,
    pub color: String,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

impl FogPolygon {
    /// A new polygon with a fresh id.
    #[must_use]
    pub fn new(points: Vec<Point>, use_grid_coordinates: bool) -> Self {
        Self {
            id: new_entity_id(),
            points,
            use_grid_coordinates,
            color: "#000000".to_owned(),
            opacity: 0.8,
        }
    }
}

/// One combatant in the turn order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiativeEntry {
    pub id: String,
    pub name: String,
    pub initiative: i64,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub is_current_turn: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<i64>,
    #[serde(rename = "initialHP", default, skip_serializing_if = "Option::is_none")]
    pub initial_hp: Option<i64>,
    #[serde(default)]
    pub is_killed: bool,
}

impl InitiativeEntry {
    /// A living, waiting entry with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>, initiative: i64) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into(),
            initiative,
            is_player: false,
            is_current_turn: false,
            hp: None,
            initial_hp: None,
            is_killed: false,
        }
    }

    /// Builder-style HP setter; also records the starting HP.
    #[must_use]
    pub fn with_hp(mut self, hp: i64) -> Self {
        self.hp = Some(hp);
        self.initial_hp = Some(hp);
        self
    }
}
