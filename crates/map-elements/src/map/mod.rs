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

//! The retained map model.
//!
//! A [`MapModel`] holds everything one map displays: the current view, an
//! arena of [`Layer`]s, the attached controls, and a queue of [`MapEvent`]s
//! describing what just changed. It knows nothing about documents or
//! rendering; the engine drives it from element state and embedders read it
//! back to paint.

pub mod control;
pub mod events;
pub mod icon;
pub mod layer;
pub mod tile;

use std::collections::{BTreeMap, VecDeque};

use log::warn;
use serde_json::{json, Value};

use crate::geo::{LatLng, LatLngBounds, WebMercator};

use control::{Control, ControlId, ControlKind};
use events::{EventTarget, MapEvent};
use icon::Icon;
use layer::{Layer, LayerId, LayerKind, Marker, PathOptions, Popup};

// Zoom ceiling applied when no max-zoom option is configured
const FALLBACK_MAX_ZOOM: f64 = 18.0;
pub(crate) const ZOOM_CEILING: f64 = 30.0;

/// Identifier of a map instance. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub(crate) u64);

/// Construction options of a map.
///
/// Interaction flags default to enabled and are switched off by the
/// corresponding `no-*` attributes. A `zoom` below zero means "not set":
/// the map then fits its layers, or the world when it has none.
#[derive(Debug, Clone, PartialEq)]
pub struct MapOptions {
    pub center: LatLng,
    pub zoom: f64,
    pub min_zoom: Option<f64>,
    pub max_zoom: Option<f64>,
    pub max_bounds: Option<LatLngBounds>,
    pub dragging: bool,
    pub touch_zoom: bool,
    pub scroll_wheel_zoom: bool,
    pub double_click_zoom: bool,
    pub box_zoom: bool,
    pub keyboard: bool,
    pub tap: bool,
    pub tap_tolerance: f64,
    pub track_resize: bool,
    pub world_copy_jump: bool,
    pub close_popup_on_click: bool,
    pub bounce_at_zoom_limits: bool,
    pub inertia: bool,
    pub inertia_deceleration: f64,
    pub inertia_max_speed: f64,
    pub fade_animation: bool,
    pub zoom_animation: bool,
    pub zoom_animation_threshold: f64,
    pub marker_zoom_animation: bool,
    pub zoom_control: bool,
    pub attribution_control: bool,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            center: LatLng::new(51.0, 0.0),
            zoom: -1.0,
            min_zoom: None,
            max_zoom: None,
            max_bounds: None,
            dragging: true,
            touch_zoom: true,
            scroll_wheel_zoom: true,
            double_click_zoom: true,
            box_zoom: true,
            keyboard: true,
            tap: true,
            tap_tolerance: 15.0,
            track_resize: true,
            world_copy_jump: false,
            close_popup_on_click: true,
            bounce_at_zoom_limits: true,
            inertia: true,
            inertia_deceleration: 3000.0,
            inertia_max_speed: 1500.0,
            fade_animation: true,
            zoom_animation: true,
            zoom_animation_threshold: 4.0,
            marker_zoom_animation: true,
            zoom_control: true,
            attribution_control: true,
        }
    }
}

impl MapOptions {
    /// Whether an explicit initial zoom was configured.
    #[must_use]
    pub fn has_zoom(&self) -> bool {
        self.zoom >= 0.0
    }
}

/// The current center and zoom of a map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub center: LatLng,
    pub zoom: f64,
}

/// One map: view state, layer arena, controls, and its pending events.
#[derive(Debug)]
pub struct MapModel {
    options: MapOptions,
    view: View,
    size: (f32, f32),
    loaded: bool,
    fullscreen: bool,
    pseudo_fullscreen: bool,
    layers: BTreeMap<LayerId, Layer>,
    root_order: Vec<LayerId>,
    controls: BTreeMap<ControlId, Control>,
    control_order: Vec<ControlId>,
    events: VecDeque<MapEvent>,
    next_layer: u64,
    next_control: u64,
}

impl MapModel {
    #[must_use]
    pub fn new(options: MapOptions) -> Self {
        let view = View {
            center: options.center,
            zoom: options.zoom.max(0.0),
        };
        Self {
            options,
            view,
            size: (0.0, 0.0),
            loaded: false,
            fullscreen: false,
            pseudo_fullscreen: false,
            layers: BTreeMap::new(),
            root_order: Vec::new(),
            controls: BTreeMap::new(),
            control_order: Vec::new(),
            events: VecDeque::new(),
            next_layer: 1,
            next_control: 1,
        }
    }

    #[must_use]
    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    #[must_use]
    pub fn view(&self) -> View {
        self.view
    }

    #[must_use]
    pub fn size(&self) -> (f32, f32) {
        self.size
    }

    /// Whether the initial view has been set.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    #[must_use]
    pub fn is_pseudo_fullscreen(&self) -> bool {
        self.pseudo_fullscreen
    }

    fn emit(&mut self, target: EventTarget, name: &'static str, data: Value) {
        self.events.push_back(MapEvent::new(target, name, data));
    }

    /// Emit an event on the map itself. Embedders use this to report
    /// interactions such as clicks.
    pub fn emit_map_event(&mut self, name: &'static str, data: Value) {
        self.emit(EventTarget::Map, name, data);
    }

    /// Emit an event on a layer, for example a click or a tile load.
    pub fn emit_layer_event(&mut self, layer: LayerId, name: &'static str, data: Value) {
        if !self.layers.contains_key(&layer) {
            warn!("Attempted to emit {name} on non-existent layer {layer:?}");
            return;
        }
        self.emit(EventTarget::Layer(layer), name, data);
    }

    /// Drain the pending events.
    ///
    /// The element engine drains this on every flush; call it directly only
    /// when driving a standalone model.
    pub fn take_events(&mut self) -> VecDeque<MapEvent> {
        std::mem::take(&mut self.events)
    }

    /// Update the viewport size in pixels.
    pub fn set_size(&mut self, width: f32, height: f32) {
        if (self.size.0 - width).abs() < f32::EPSILON && (self.size.1 - height).abs() < f32::EPSILON {
            return;
        }
        let old = self.size;
        self.size = (width, height);
        self.emit(
            EventTarget::Map,
            "resize",
            json!({ "oldSize": [old.0, old.1], "newSize": [width, height] }),
        );
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        let min = self.options.min_zoom.unwrap_or(0.0);
        let max = self.options.max_zoom.unwrap_or(ZOOM_CEILING).max(min);
        zoom.clamp(min, max)
    }

    fn constrain_center(&self, center: LatLng) -> LatLng {
        match &self.options.max_bounds {
            Some(bounds) => LatLng::new(
                center.lat.clamp(bounds.south_west.lat, bounds.north_east.lat),
                center.lng.clamp(bounds.south_west.lng, bounds.north_east.lng),
            ),
            None => center,
        }
    }

    /// Move the view. Emits the full event sequence, including a one-time
    /// `load` the first time a view is set.
    pub fn set_view(&mut self, center: LatLng, zoom: f64) {
        let zoom = self.clamp_zoom(zoom);
        let center = self.constrain_center(center);

        let first = !self.loaded;
        let center_changed = center != self.view.center;
        let zoom_changed = (zoom - self.view.zoom).abs() > f64::EPSILON;
        if !first && !center_changed && !zoom_changed {
            return;
        }

        if zoom_changed {
            self.emit(EventTarget::Map, "zoomstart", json!({}));
        }
        self.emit(EventTarget::Map, "movestart", json!({}));

        self.view = View { center, zoom };

        if first || zoom_changed {
            self.emit(EventTarget::Map, "viewreset", json!({}));
        }
        self.emit(EventTarget::Map, "move", json!({ "center": center, "zoom": zoom }));
        if first {
            self.loaded = true;
            self.emit(EventTarget::Map, "load", json!({}));
        }
        if zoom_changed {
            self.emit(EventTarget::Map, "zoomend", json!({ "zoom": zoom }));
        }
        self.emit(EventTarget::Map, "moveend", json!({ "center": center, "zoom": zoom }));
    }

    /// Center and zoom the view so `bounds` is fully visible.
    pub fn fit_bounds(&mut self, bounds: &LatLngBounds) {
        let max = self
            .options
            .max_zoom
            .unwrap_or(FALLBACK_MAX_ZOOM)
            .clamp(0.0, ZOOM_CEILING) as u8;
        let zoom = WebMercator::bounds_zoom(bounds, self.size.0, self.size.1, max);
        self.set_view(bounds.center(), f64::from(zoom));
    }

    /// Fit the whole world into the view.
    pub fn fit_world(&mut self) {
        self.fit_bounds(&LatLngBounds::world());
    }

    // ------------------------------------------------------------------
    // Layers

    fn alloc_layer(&mut self) -> LayerId {
        let id = LayerId(self.next_layer);
        self.next_layer += 1;
        id
    }

    /// Add a layer directly on the map.
    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        let id = self.alloc_layer();
        self.layers.insert(id, layer);
        self.root_order.push(id);
        self.emit(EventTarget::Layer(id), "add", json!({}));
        self.emit(EventTarget::Map, "layeradd", json!({ "layer": id.0 }));
        id
    }

    /// Add a layer inside a group. Returns `None` when the target is not a
    /// group that exists.
    pub fn add_layer_in(&mut self, group: LayerId, layer: Layer) -> Option<LayerId> {
        if !matches!(
            self.layers.get(&group).map(|l| &l.kind),
            Some(LayerKind::Group(_))
        ) {
            warn!("Attempted to add a layer to non-existent group {group:?}");
            return None;
        }
        let id = self.alloc_layer();
        self.layers.insert(id, layer);
        if let Some(LayerKind::Group(g)) = self.layers.get_mut(&group).map(|l| &mut l.kind) {
            g.members.push(id);
        }
        self.emit(EventTarget::Layer(id), "add", json!({}));
        self.emit(EventTarget::Map, "layeradd", json!({ "layer": id.0 }));
        Some(id)
    }

    fn collect_subtree(&self, id: LayerId, out: &mut Vec<LayerId>) {
        if let Some(Layer { kind: LayerKind::Group(g), .. }) = self.layers.get(&id) {
            for member in &g.members {
                self.collect_subtree(*member, out);
            }
        }
        out.push(id);
    }

    /// Remove a layer. Group members are removed first, each with its own
    /// `remove` / `layerremove` pair.
    pub fn remove_layer(&mut self, id: LayerId) {
        if !self.layers.contains_key(&id) {
            warn!("Attempted to remove non-existent layer {id:?}");
            return;
        }
        self.root_order.retain(|l| *l != id);
        for layer in self.layers.values_mut() {
            if let LayerKind::Group(g) = &mut layer.kind {
                g.members.retain(|m| *m != id);
            }
        }

        let mut doomed = Vec::new();
        self.collect_subtree(id, &mut doomed);
        for d in doomed {
            if let Some(layer) = self.layers.remove(&d) {
                if layer.popup.as_ref().is_some_and(|p| p.open) {
                    self.emit(EventTarget::Layer(d), "popupclose", json!({}));
                    self.emit(EventTarget::Map, "popupclose", json!({ "layer": d.0 }));
                }
                self.emit(EventTarget::Layer(d), "remove", json!({}));
                self.emit(EventTarget::Map, "layerremove", json!({ "layer": d.0 }));
            }
        }
    }

    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Layers added directly on the map, in insertion order.
    #[must_use]
    pub fn root_layers(&self) -> &[LayerId] {
        &self.root_order
    }

    /// Every layer in the arena, including group members, in id order.
    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers.iter().map(|(id, layer)| (*id, layer))
    }

    // ------------------------------------------------------------------
    // Marker updates

    fn marker_mut(&mut self, id: LayerId) -> Option<&mut Marker> {
        match self.layers.get_mut(&id).map(|l| &mut l.kind) {
            Some(LayerKind::Marker(m)) => Some(m),
            _ => {
                warn!("Attempted to update non-existent marker {id:?}");
                None
            }
        }
    }

    /// Move a marker. Emits `move` on the layer.
    pub fn set_marker_latlng(&mut self, id: LayerId, latlng: LatLng) {
        let Some(marker) = self.marker_mut(id) else {
            return;
        };
        if marker.position == latlng {
            return;
        }
        marker.position = latlng;
        self.emit(EventTarget::Layer(id), "move", json!({ "latlng": latlng }));
    }

    pub fn set_marker_icon(&mut self, id: LayerId, icon: Icon) {
        if let Some(marker) = self.marker_mut(id) {
            marker.icon = icon;
        }
    }

    pub fn set_marker_opacity(&mut self, id: LayerId, opacity: f64) {
        if let Some(marker) = self.marker_mut(id) {
            marker.opacity = opacity;
        }
    }

    pub fn set_marker_z_index_offset(&mut self, id: LayerId, offset: f64) {
        if let Some(marker) = self.marker_mut(id) {
            marker.z_index_offset = offset;
        }
    }

    pub fn set_marker_title(&mut self, id: LayerId, title: String) {
        if let Some(marker) = self.marker_mut(id) {
            marker.title = title;
        }
    }

    pub fn set_marker_alt(&mut self, id: LayerId, alt: String) {
        if let Some(marker) = self.marker_mut(id) {
            marker.alt = alt;
        }
    }

    pub fn set_marker_draggable(&mut self, id: LayerId, draggable: bool) {
        if let Some(marker) = self.marker_mut(id) {
            marker.draggable = draggable;
        }
    }

    // ------------------------------------------------------------------
    // Shape updates

    pub fn set_circle_center(&mut self, id: LayerId, center: LatLng) {
        match self.layers.get_mut(&id).map(|l| &mut l.kind) {
            Some(LayerKind::Circle(c)) => c.center = center,
            _ => warn!("Attempted to update non-existent circle {id:?}"),
        }
    }

    pub fn set_circle_radius(&mut self, id: LayerId, radius: f64) {
        match self.layers.get_mut(&id).map(|l| &mut l.kind) {
            Some(LayerKind::Circle(c)) => c.radius = radius,
            _ => warn!("Attempted to update non-existent circle {id:?}"),
        }
    }

    /// Replace the vertex list of a polyline or polygon.
    pub fn set_shape_points(&mut self, id: LayerId, points: Vec<LatLng>) {
        match self.layers.get_mut(&id).map(|l| &mut l.kind) {
            Some(LayerKind::Polyline(p)) => p.points = points,
            Some(LayerKind::Polygon(p)) => p.points = points,
            _ => warn!("Attempted to update non-existent shape {id:?}"),
        }
    }

    /// Replace the stroke and fill options of a vector layer.
    pub fn set_path_style(&mut self, id: LayerId, options: PathOptions) {
        match self.layers.get_mut(&id).map(|l| &mut l.kind) {
            Some(LayerKind::Circle(c)) => c.options = options,
            Some(LayerKind::Polyline(p)) => p.options = options,
            Some(LayerKind::Polygon(p)) => p.options = options,
            Some(LayerKind::GeoJson(g)) => g.style = options,
            _ => warn!("Attempted to update style of non-existent path {id:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Tile layer updates

    pub fn set_tile_opacity(&mut self, id: LayerId, opacity: f64) {
        match self.layers.get_mut(&id).map(|l| &mut l.kind) {
            Some(LayerKind::Tile(t)) => t.options.opacity = opacity,
            _ => warn!("Attempted to update non-existent tile layer {id:?}"),
        }
    }

    pub fn set_tile_z_index(&mut self, id: LayerId, z_index: i32) {
        match self.layers.get_mut(&id).map(|l| &mut l.kind) {
            Some(LayerKind::Tile(t)) => t.options.z_index = Some(z_index),
            _ => warn!("Attempted to update non-existent tile layer {id:?}"),
        }
    }

    /// Point a tile layer at a new URL template. Emits `loading` as the
    /// layer starts refetching.
    pub fn set_tile_url(&mut self, id: LayerId, url: String) {
        match self.layers.get_mut(&id).map(|l| &mut l.kind) {
            Some(LayerKind::Tile(t)) => {
                t.options.url = url;
                self.emit(EventTarget::Layer(id), "loading", json!({}));
            }
            _ => warn!("Attempted to update non-existent tile layer {id:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Popups

    /// Bind popup content to a layer, replacing any previous content. An
    /// already open popup stays open and shows the new content.
    pub fn bind_popup(&mut self, id: LayerId, content: String) {
        let Some(layer) = self.layers.get_mut(&id) else {
            warn!("Attempted to bind a popup to non-existent layer {id:?}");
            return;
        };
        match &mut layer.popup {
            Some(popup) => popup.content = content,
            None => layer.popup = Some(Popup { content, open: false }),
        }
    }

    /// Remove a layer's popup, closing it first when open.
    pub fn unbind_popup(&mut self, id: LayerId) {
        let Some(layer) = self.layers.get_mut(&id) else {
            warn!("Attempted to unbind a popup from non-existent layer {id:?}");
            return;
        };
        let was_open = layer.popup.as_ref().is_some_and(|p| p.open);
        layer.popup = None;
        if was_open {
            self.emit(EventTarget::Layer(id), "popupclose", json!({}));
            self.emit(EventTarget::Map, "popupclose", json!({ "layer": id.0 }));
        }
    }

    /// Open a layer's popup. At most one popup is open per map, so any
    /// other open popup closes first.
    pub fn open_popup(&mut self, id: LayerId) {
        let others: Vec<LayerId> = self
            .layers
            .iter()
            .filter(|(other, layer)| **other != id && layer.popup.as_ref().is_some_and(|p| p.open))
            .map(|(other, _)| *other)
            .collect();
        for other in others {
            self.close_popup(other);
        }

        match self.layers.get_mut(&id).and_then(|l| l.popup.as_mut()) {
            Some(popup) if !popup.open => {
                popup.open = true;
                self.emit(EventTarget::Layer(id), "popupopen", json!({}));
                self.emit(EventTarget::Map, "popupopen", json!({ "layer": id.0 }));
            }
            Some(_) => {}
            None => warn!("Attempted to open a popup on layer {id:?} that has none"),
        }
    }

    pub fn close_popup(&mut self, id: LayerId) {
        match self.layers.get_mut(&id).and_then(|l| l.popup.as_mut()) {
            Some(popup) if popup.open => {
                popup.open = false;
                self.emit(EventTarget::Layer(id), "popupclose", json!({}));
                self.emit(EventTarget::Map, "popupclose", json!({ "layer": id.0 }));
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Derived geometry

    /// Geographic bounds of a layer, `None` for layers without one (tile
    /// layers, empty groups).
    #[must_use]
    pub fn layer_bounds(&self, id: LayerId) -> Option<LatLngBounds> {
        let layer = self.layers.get(&id)?;
        match &layer.kind {
            LayerKind::Marker(m) => Some(LatLngBounds::from_point(m.position)),
            LayerKind::Circle(c) => Some(LatLngBounds::from_circle(c.center, c.radius)),
            LayerKind::Polyline(p) => LatLngBounds::from_points(&p.points),
            LayerKind::Polygon(p) => LatLngBounds::from_points(&p.points),
            LayerKind::Group(g) => {
                LatLngBounds::union(g.members.iter().filter_map(|m| self.layer_bounds(*m)))
            }
            LayerKind::GeoJson(g) => geojson_bounds(&g.data),
            LayerKind::Tile(_) => None,
        }
    }

    /// Attribution texts of the current tile layers, deduplicated, in
    /// layer order.
    #[must_use]
    pub fn attributions(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for layer in self.layers.values() {
            if let LayerKind::Tile(t) = &layer.kind {
                if let Some(attribution) = t.options.attribution.as_deref() {
                    let attribution = attribution.trim();
                    if !attribution.is_empty() && !seen.contains(&attribution) {
                        seen.push(attribution);
                    }
                }
            }
        }
        seen
    }

    // ------------------------------------------------------------------
    // GeoJSON export

    /// A layer as a GeoJSON value, `None` for tile layers.
    #[must_use]
    pub fn layer_to_geojson(&self, id: LayerId) -> Option<Value> {
        let layer = self.layers.get(&id)?;
        match &layer.kind {
            LayerKind::Marker(m) => Some(point_feature(m.position, json!({}))),
            LayerKind::Circle(c) => {
                Some(point_feature(c.center, json!({ "radius": c.radius })))
            }
            LayerKind::Polyline(p) => Some(json!({
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "LineString", "coordinates": coordinates(&p.points) },
            })),
            LayerKind::Polygon(p) => {
                let mut ring = coordinates(&p.points);
                if ring.first() != ring.last() {
                    if let Some(first) = ring.first().cloned() {
                        ring.push(first);
                    }
                }
                Some(json!({
                    "type": "Feature",
                    "properties": {},
                    "geometry": { "type": "Polygon", "coordinates": [ring] },
                }))
            }
            LayerKind::Group(g) => {
                let mut features = Vec::new();
                for member in &g.members {
                    if let Some(value) = self.layer_to_geojson(*member) {
                        features.extend(features_of(value));
                    }
                }
                Some(json!({ "type": "FeatureCollection", "features": features }))
            }
            LayerKind::GeoJson(g) => Some(g.data.clone()),
            LayerKind::Tile(_) => None,
        }
    }

    /// The whole map as a GeoJSON `FeatureCollection`.
    #[must_use]
    pub fn to_geojson(&self) -> Value {
        let mut features = Vec::new();
        for id in &self.root_order {
            if let Some(value) = self.layer_to_geojson(*id) {
                features.extend(features_of(value));
            }
        }
        json!({ "type": "FeatureCollection", "features": features })
    }

    // ------------------------------------------------------------------
    // Fullscreen

    fn sync_fullscreen_indicators(&mut self) {
        let on = self.fullscreen;
        for control in self.controls.values_mut() {
            if let ControlKind::Fullscreen(f) = &mut control.kind {
                f.is_fullscreen = on;
            }
        }
    }

    /// Enter or leave host-window fullscreen. Emits `fullscreenchange`.
    pub fn set_fullscreen(&mut self, on: bool) {
        if self.fullscreen == on && !self.pseudo_fullscreen {
            return;
        }
        self.fullscreen = on;
        self.pseudo_fullscreen = false;
        self.sync_fullscreen_indicators();
        self.emit(EventTarget::Map, "fullscreenchange", json!({ "fullscreen": on }));
    }

    /// Enter or leave pseudo fullscreen, where only the map pane is
    /// maximized. Emits `fullscreenchange`.
    pub fn set_pseudo_fullscreen(&mut self, on: bool) {
        if self.fullscreen == on && self.pseudo_fullscreen == on {
            return;
        }
        self.fullscreen = on;
        self.pseudo_fullscreen = on;
        self.sync_fullscreen_indicators();
        self.emit(EventTarget::Map, "fullscreenchange", json!({ "fullscreen": on }));
    }

    // ------------------------------------------------------------------
    // Controls

    fn alloc_control(&mut self) -> ControlId {
        let id = ControlId(self.next_control);
        self.next_control += 1;
        id
    }

    pub fn add_control(&mut self, control: Control) -> ControlId {
        let id = self.alloc_control();
        self.controls.insert(id, control);
        self.control_order.push(id);
        id
    }

    pub fn remove_control(&mut self, id: ControlId) {
        if self.controls.remove(&id).is_none() {
            warn!("Attempted to remove non-existent control {id:?}");
            return;
        }
        self.control_order.retain(|c| *c != id);
    }

    #[must_use]
    pub fn control(&self, id: ControlId) -> Option<&Control> {
        self.controls.get(&id)
    }

    pub(crate) fn control_mut(&mut self, id: ControlId) -> Option<&mut Control> {
        self.controls.get_mut(&id)
    }

    /// Controls in insertion order.
    pub fn controls(&self) -> impl Iterator<Item = (ControlId, &Control)> {
        self.control_order
            .iter()
            .filter_map(move |id| self.controls.get(id).map(|c| (*id, c)))
    }
}

fn coordinates(points: &[LatLng]) -> Vec<Value> {
    points.iter().map(|p| json!([p.lng, p.lat])).collect()
}

fn point_feature(position: LatLng, properties: Value) -> Value {
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": { "type": "Point", "coordinates": [position.lng, position.lat] },
    })
}

/// Flatten a GeoJSON value into a feature list: collections contribute
/// their features, bare geometries get wrapped.
fn features_of(value: Value) -> Vec<Value> {
    match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => match value.get("features") {
            Some(Value::Array(features)) => features.clone(),
            _ => Vec::new(),
        },
        Some("Feature") => vec![value],
        Some(_) => vec![json!({ "type": "Feature", "properties": {}, "geometry": value })],
        None => Vec::new(),
    }
}

fn geojson_bounds(value: &Value) -> Option<LatLngBounds> {
    let mut bounds = None;
    walk_coordinates(value, &mut bounds);
    bounds
}

fn walk_coordinates(value: &Value, bounds: &mut Option<LatLngBounds>) {
    match value {
        Value::Array(items) => {
            // A position is an array starting with two numbers: [lng, lat]
            if items.len() >= 2 && items[0].is_number() && items[1].is_number() {
                if let (Some(lng), Some(lat)) = (items[0].as_f64(), items[1].as_f64()) {
                    let point = LatLng::new(lat, lng);
                    match bounds {
                        Some(b) => b.extend(point),
                        None => *bounds = Some(LatLngBounds::from_point(point)),
                    }
                }
            } else {
                for item in items {
                    walk_coordinates(item, bounds);
                }
            }
        }
        Value::Object(map) => {
            for key in ["features", "geometry", "geometries", "coordinates"] {
                if let Some(inner) = map.get(key) {
                    walk_coordinates(inner, bounds);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::layer::{Circle, GeoJsonLayer, LayerGroup, Polygon, TileLayer};
    use super::tile::TileOptions;
    use super::*;

    fn marker_layer(lat: f64, lng: f64) -> Layer {
        Layer::new(LayerKind::Marker(Marker {
            position: LatLng::new(lat, lng),
            icon: Icon::Default,
            draggable: false,
            keyboard: true,
            title: String::new(),
            alt: String::new(),
            z_index_offset: 0.0,
            opacity: 1.0,
            rise_on_hover: false,
            rise_offset: 250.0,
        }))
    }

    fn event_names(model: &mut MapModel) -> Vec<&'static str> {
        model.take_events().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_first_view_fires_load_once() {
        let mut model = MapModel::new(MapOptions::default());
        model.set_view(LatLng::new(51.5, -0.09), 13.0);

        let names = event_names(&mut model);
        assert_eq!(names.iter().filter(|n| **n == "load").count(), 1);
        assert!(names.contains(&"moveend"));
        assert!(model.is_loaded());

        // Same view again is a no-op
        model.set_view(LatLng::new(51.5, -0.09), 13.0);
        assert!(event_names(&mut model).is_empty());

        // A zoom change fires the zoom pair but no second load
        model.set_view(LatLng::new(51.5, -0.09), 10.0);
        let names = event_names(&mut model);
        assert!(names.contains(&"zoomstart"));
        assert!(names.contains(&"zoomend"));
        assert!(!names.contains(&"load"));
    }

    #[test]
    fn test_zoom_clamped_to_options() {
        let options = MapOptions {
            min_zoom: Some(3.0),
            max_zoom: Some(10.0),
            ..MapOptions::default()
        };
        let mut model = MapModel::new(options);

        model.set_view(LatLng::new(0.0, 0.0), 15.0);
        assert!((model.view().zoom - 10.0).abs() < f64::EPSILON);

        model.set_view(LatLng::new(0.0, 0.0), 1.0);
        assert!((model.view().zoom - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_center_constrained_to_max_bounds() {
        let options = MapOptions {
            max_bounds: Some(LatLngBounds::new(
                LatLng::new(-10.0, -10.0),
                LatLng::new(10.0, 10.0),
            )),
            ..MapOptions::default()
        };
        let mut model = MapModel::new(options);
        model.set_view(LatLng::new(40.0, -60.0), 5.0);

        assert_eq!(model.view().center, LatLng::new(10.0, -10.0));
    }

    #[test]
    fn test_add_and_remove_layer_events() {
        let mut model = MapModel::new(MapOptions::default());
        model.set_view(LatLng::new(0.0, 0.0), 2.0);
        model.take_events();

        let id = model.add_layer(marker_layer(1.0, 2.0));
        let names = event_names(&mut model);
        assert_eq!(names, vec!["add", "layeradd"]);
        assert_eq!(model.root_layers(), &[id]);

        model.remove_layer(id);
        let names = event_names(&mut model);
        assert_eq!(names, vec!["remove", "layerremove"]);
        assert!(model.layer(id).is_none());

        // Removing again only warns
        model.remove_layer(id);
        assert!(event_names(&mut model).is_empty());
    }

    #[test]
    fn test_group_removal_removes_members() {
        let mut model = MapModel::new(MapOptions::default());
        let group = model.add_layer(Layer::new(LayerKind::Group(LayerGroup::default())));
        let member = model.add_layer_in(group, marker_layer(1.0, 1.0)).unwrap();
        model.take_events();

        model.remove_layer(group);
        assert!(model.layer(group).is_none());
        assert!(model.layer(member).is_none());

        // Member first, then the group itself
        let removed: Vec<MapEvent> = model.take_events().into_iter().collect();
        let layer_removes: Vec<&MapEvent> =
            removed.iter().filter(|e| e.name == "layerremove").collect();
        assert_eq!(layer_removes.len(), 2);
        assert_eq!(layer_removes[0].data["layer"], member.0);
        assert_eq!(layer_removes[1].data["layer"], group.0);
    }

    #[test]
    fn test_add_layer_in_requires_group() {
        let mut model = MapModel::new(MapOptions::default());
        let marker = model.add_layer(marker_layer(0.0, 0.0));

        assert!(model.add_layer_in(marker, marker_layer(1.0, 1.0)).is_none());
        assert!(model.add_layer_in(LayerId(999), marker_layer(1.0, 1.0)).is_none());
    }

    #[test]
    fn test_tile_opacity_keeps_layer_identity() {
        let mut model = MapModel::new(MapOptions::default());
        let id = model.add_layer(Layer::new(LayerKind::Tile(TileLayer {
            options: TileOptions::default_basemap(),
        })));
        model.take_events();

        model.set_tile_opacity(id, 0.4);

        // No churn: the same layer, updated in place
        assert!(event_names(&mut model).is_empty());
        let Some(Layer { kind: LayerKind::Tile(t), .. }) = model.layer(id) else {
            panic!("tile layer vanished");
        };
        assert!((t.options.opacity - 0.4).abs() < f64::EPSILON);
        assert_eq!(model.root_layers(), &[id]);
    }

    #[test]
    fn test_set_tile_url_fires_loading() {
        let mut model = MapModel::new(MapOptions::default());
        let id = model.add_layer(Layer::new(LayerKind::Tile(TileLayer {
            options: TileOptions::default_basemap(),
        })));
        model.take_events();

        model.set_tile_url(id, "https://tiles.example.org/{z}/{x}/{y}.png".to_string());
        let names = event_names(&mut model);
        assert_eq!(names, vec!["loading"]);
    }

    #[test]
    fn test_marker_move_emits_event() {
        let mut model = MapModel::new(MapOptions::default());
        let id = model.add_layer(marker_layer(10.0, 20.0));
        model.take_events();

        model.set_marker_latlng(id, LatLng::new(11.0, 21.0));
        let events: Vec<MapEvent> = model.take_events().into_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "move");
        assert_eq!(events[0].target, EventTarget::Layer(id));

        // Same position again is silent
        model.set_marker_latlng(id, LatLng::new(11.0, 21.0));
        assert!(model.take_events().is_empty());
    }

    #[test]
    fn test_popup_bind_open_close_unbind() {
        let mut model = MapModel::new(MapOptions::default());
        let id = model.add_layer(marker_layer(0.0, 0.0));
        model.take_events();

        model.bind_popup(id, "<b>hello</b>".to_string());
        model.open_popup(id);
        assert_eq!(event_names(&mut model), vec!["popupopen", "popupopen"]);
        assert!(model.layer(id).unwrap().popup.as_ref().unwrap().open);

        // Rebinding while open keeps it open with new content
        model.bind_popup(id, "updated".to_string());
        let popup = model.layer(id).unwrap().popup.as_ref().unwrap();
        assert!(popup.open);
        assert_eq!(popup.content, "updated");

        model.unbind_popup(id);
        assert_eq!(event_names(&mut model), vec!["popupclose", "popupclose"]);
        assert!(model.layer(id).unwrap().popup.is_none());
    }

    #[test]
    fn test_single_open_popup_per_map() {
        let mut model = MapModel::new(MapOptions::default());
        let a = model.add_layer(marker_layer(0.0, 0.0));
        let b = model.add_layer(marker_layer(1.0, 1.0));
        model.bind_popup(a, "a".to_string());
        model.bind_popup(b, "b".to_string());
        model.take_events();

        model.open_popup(a);
        model.open_popup(b);

        assert!(!model.layer(a).unwrap().popup.as_ref().unwrap().open);
        assert!(model.layer(b).unwrap().popup.as_ref().unwrap().open);
    }

    #[test]
    fn test_layer_bounds_cover_kinds() {
        let mut model = MapModel::new(MapOptions::default());

        let marker = model.add_layer(marker_layer(10.0, 20.0));
        let circle = model.add_layer(Layer::new(LayerKind::Circle(Circle {
            center: LatLng::new(0.0, 0.0),
            radius: 1000.0,
            options: PathOptions::default(),
        })));
        let group = model.add_layer(Layer::new(LayerKind::Group(LayerGroup::default())));
        model.add_layer_in(group, marker_layer(-5.0, -5.0)).unwrap();

        let mb = model.layer_bounds(marker).unwrap();
        assert_eq!(mb.south_west, LatLng::new(10.0, 20.0));

        let cb = model.layer_bounds(circle).unwrap();
        assert!(cb.contains(LatLng::new(0.0, 0.0)));
        assert!(cb.north_east.lat > 0.0);

        let gb = model.layer_bounds(group).unwrap();
        assert_eq!(gb.south_west, LatLng::new(-5.0, -5.0));
    }

    #[test]
    fn test_geojson_layer_bounds() {
        let data = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": { "type": "Point", "coordinates": [2.35, 48.85] }
                },
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[-0.1, 51.5], [4.9, 52.37]]
                    }
                }
            ]
        });
        let mut model = MapModel::new(MapOptions::default());
        let id = model.add_layer(Layer::new(LayerKind::GeoJson(GeoJsonLayer {
            data,
            style: PathOptions::default(),
        })));

        let bounds = model.layer_bounds(id).unwrap();
        assert!((bounds.south_west.lat - 48.85).abs() < 1e-9);
        assert!((bounds.north_east.lng - 4.9).abs() < 1e-9);
    }

    #[test]
    fn test_fit_bounds_uses_viewport() {
        let mut model = MapModel::new(MapOptions::default());
        model.set_size(800.0, 600.0);
        model.take_events();

        let bounds = LatLngBounds::new(LatLng::new(51.45, -0.2), LatLng::new(51.55, 0.0));
        model.fit_bounds(&bounds);

        let view = model.view();
        assert!((view.center.lat - 51.5).abs() < 1e-9);
        assert!((view.center.lng - (-0.1)).abs() < 1e-9);
        assert!(view.zoom >= 9.0);
        assert!(model.is_loaded());
    }

    #[test]
    fn test_to_geojson_closes_polygon_ring() {
        let mut model = MapModel::new(MapOptions::default());
        model.add_layer(Layer::new(LayerKind::Polygon(Polygon {
            points: vec![
                LatLng::new(0.0, 0.0),
                LatLng::new(0.0, 1.0),
                LatLng::new(1.0, 1.0),
            ],
            options: PathOptions::default(),
        })));

        let geojson = model.to_geojson();
        assert_eq!(geojson["type"], "FeatureCollection");
        let ring = &geojson["features"][0]["geometry"]["coordinates"][0];
        let ring = ring.as_array().unwrap();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_to_geojson_flattens_groups() {
        let mut model = MapModel::new(MapOptions::default());
        let group = model.add_layer(Layer::new(LayerKind::Group(LayerGroup::default())));
        model.add_layer_in(group, marker_layer(1.0, 2.0)).unwrap();
        model.add_layer_in(group, marker_layer(3.0, 4.0)).unwrap();

        let geojson = model.to_geojson();
        let features = geojson["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["geometry"]["type"], "Point");
    }

    #[test]
    fn test_fullscreen_transitions() {
        let mut model = MapModel::new(MapOptions::default());
        let control = model.add_control(Control {
            position: control::ControlPosition::TopLeft,
            kind: ControlKind::Fullscreen(control::FullscreenIndicator {
                true_text: "Exit Fullscreen".to_string(),
                false_text: "View Fullscreen".to_string(),
                is_fullscreen: false,
            }),
        });
        model.take_events();

        model.set_fullscreen(true);
        assert!(model.is_fullscreen());
        assert!(!model.is_pseudo_fullscreen());
        assert_eq!(event_names(&mut model), vec!["fullscreenchange"]);

        let Some(Control { kind: ControlKind::Fullscreen(f), .. }) = model.control(control) else {
            panic!("missing control");
        };
        assert!(f.is_fullscreen);
        assert_eq!(f.title(), "Exit Fullscreen");

        // Repeating the state is silent
        model.set_fullscreen(true);
        assert!(event_names(&mut model).is_empty());

        model.set_pseudo_fullscreen(true);
        assert!(model.is_pseudo_fullscreen());
        model.take_events();
        model.set_pseudo_fullscreen(false);
        assert!(!model.is_fullscreen());
        assert_eq!(event_names(&mut model), vec!["fullscreenchange"]);
    }

    #[test]
    fn test_attributions_deduplicated() {
        let mut model = MapModel::new(MapOptions::default());
        let osm = TileOptions::default_basemap();
        model.add_layer(Layer::new(LayerKind::Tile(TileLayer { options: osm.clone() })));
        model.add_layer(Layer::new(LayerKind::Tile(TileLayer { options: osm })));
        let mut other = TileOptions::default_basemap();
        other.attribution = Some("Tiles by Example".to_string());
        model.add_layer(Layer::new(LayerKind::Tile(TileLayer { options: other })));

        let attributions = model.attributions();
        assert_eq!(attributions.len(), 2);
        assert_eq!(attributions[1], "Tiles by Example");
    }

    #[test]
    fn test_resize_event() {
        let mut model = MapModel::new(MapOptions::default());
        model.set_size(640.0, 480.0);
        assert_eq!(event_names(&mut model), vec!["resize"]);

        model.set_size(640.0, 480.0);
        assert!(event_names(&mut model).is_empty());
    }
}
