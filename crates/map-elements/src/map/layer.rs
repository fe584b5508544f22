// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Layer types of the retained map model.
//!
//! Every feature an element owns is one [`Layer`] in a map's arena,
//! addressed by a [`LayerId`] that is never reused, so identity checks
//! across updates are exact.

use serde_json::Value;

use crate::geo::LatLng;

use super::icon::Icon;
use super::tile::TileOptions;

/// Identifier of a layer within one map. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) u64);

/// Stroke and fill options shared by vector shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct PathOptions {
    pub stroke: bool,
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    pub fill: bool,
    /// Fill color; falls back to `color` when unset.
    pub fill_color: Option<String>,
    pub fill_opacity: f64,
    pub dash_array: Option<String>,
    pub dash_offset: Option<String>,
    pub line_cap: Option<String>,
    pub line_join: Option<String>,
    pub fill_rule: Option<String>,
    pub pointer_events: Option<String>,
    /// Whether the layer is a pointer target. Off unless declared.
    pub clickable: bool,
    pub class_name: String,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            stroke: false,
            color: "#03f".to_string(),
            weight: 5.0,
            opacity: 0.5,
            fill: false,
            fill_color: None,
            fill_opacity: 0.2,
            dash_array: None,
            dash_offset: None,
            line_cap: None,
            line_join: None,
            fill_rule: None,
            pointer_events: None,
            clickable: false,
            class_name: String::new(),
        }
    }
}

impl PathOptions {
    /// Effective fill color, falling back to the stroke color.
    #[must_use]
    pub fn effective_fill_color(&self) -> &str {
        self.fill_color.as_deref().unwrap_or(&self.color)
    }
}

/// A popup bound to a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub content: String,
    pub open: bool,
}

/// A point marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub position: LatLng,
    pub icon: Icon,
    pub draggable: bool,
    pub keyboard: bool,
    pub title: String,
    pub alt: String,
    pub z_index_offset: f64,
    pub opacity: f64,
    pub rise_on_hover: bool,
    pub rise_offset: f64,
}

/// A circle with a radius in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub center: LatLng,
    pub radius: f64,
    pub options: PathOptions,
}

/// An open polyline; vertex order is meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<LatLng>,
    pub options: PathOptions,
}

/// A closed polygon; vertex order is meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<LatLng>,
    pub options: PathOptions,
}

/// A grouping layer. Members live in the same arena as every other layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerGroup {
    pub members: Vec<LayerId>,
}

/// A layer built from parsed GeoJSON data.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoJsonLayer {
    pub data: Value,
    pub style: PathOptions,
}

/// A raster tile layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub options: TileOptions,
}

/// The concrete kind of a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Tile(TileLayer),
    Marker(Marker),
    Circle(Circle),
    Polyline(Polyline),
    Polygon(Polygon),
    Group(LayerGroup),
    GeoJson(GeoJsonLayer),
}

/// One layer in a map's arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub kind: LayerKind,
    pub popup: Option<Popup>,
}

impl Layer {
    #[must_use]
    pub fn new(kind: LayerKind) -> Self {
        Self { kind, popup: None }
    }
}
