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

//! The `leaflet-map` element: option parsing, model construction, view
//! writeback, and the fit-to-layers policy.

use serde_json::Value;

use crate::dom::{Document, NodeId, Tag};
use crate::error::Error;
use crate::geo::{LatLng, LatLngBounds};
use crate::map::events::EventTarget;
use crate::map::layer::{Layer, LayerKind, TileLayer};
use crate::map::tile::TileOptions;
use crate::map::{MapId, MapModel, MapOptions};

use super::{Container, DomEvent, ElementData, Engine, Feature};

/// Every map event re-dispatched on the `leaflet-map` element.
pub(super) const MAP_EVENTS: &[&str] = &[
    "click",
    "dblclick",
    "mousedown",
    "mouseup",
    "mouseover",
    "mouseout",
    "mousemove",
    "contextmenu",
    "focus",
    "blur",
    "preclick",
    "load",
    "unload",
    "viewreset",
    "movestart",
    "move",
    "moveend",
    "dragstart",
    "drag",
    "dragend",
    "zoomstart",
    "zoomend",
    "zoomlevelschange",
    "resize",
    "autopanstart",
    "layeradd",
    "layerremove",
    "baselayerchange",
    "overlayadd",
    "overlayremove",
    "locationfound",
    "locationerror",
    "popupopen",
    "popupclose",
];

/// Host-reported geometry of a map element, tracked before and after its
/// model exists.
#[derive(Debug, Default)]
pub(super) struct MapRootState {
    pub(super) size: (f32, f32),
    pub(super) visible: bool,
}

/// Read map construction options from the element. Behavior attributes are
/// disable flags (`no-dragging`, `no-keyboard`, ...) over defaults that
/// leave everything on; `world-copy-jump` is the one enable flag.
pub(super) fn map_options_from_attrs(doc: &Document, node: NodeId) -> MapOptions {
    let mut options = MapOptions::default();
    if let Some(lat) = doc.attr_f64(node, "latitude") {
        options.center.lat = lat;
    }
    if let Some(lng) = doc.attr_f64(node, "longitude") {
        options.center.lng = lng;
    }
    if let Some(zoom) = doc.attr_f64(node, "zoom") {
        options.zoom = zoom;
    }
    options.min_zoom = doc.attr_f64(node, "min-zoom");
    options.max_zoom = doc.attr_f64(node, "max-zoom");
    options.dragging = !doc.attr_bool(node, "no-dragging");
    options.touch_zoom = !doc.attr_bool(node, "no-touch-zoom");
    options.scroll_wheel_zoom = !doc.attr_bool(node, "no-scroll-wheel-zoom");
    options.double_click_zoom = !doc.attr_bool(node, "no-double-click-zoom");
    options.box_zoom = !doc.attr_bool(node, "no-box-zoom");
    options.keyboard = !doc.attr_bool(node, "no-keyboard");
    options.tap = !doc.attr_bool(node, "no-tap");
    if let Some(tolerance) = doc.attr_f64(node, "tap-tolerance") {
        options.tap_tolerance = tolerance;
    }
    options.track_resize = !doc.attr_bool(node, "no-track-resize");
    options.world_copy_jump = doc.attr_bool(node, "world-copy-jump");
    options.close_popup_on_click = !doc.attr_bool(node, "no-close-popup-on-click");
    options.bounce_at_zoom_limits = !doc.attr_bool(node, "no-bounce-at-zoom-limits");
    options.inertia = !doc.attr_bool(node, "no-inertia");
    if let Some(deceleration) = doc.attr_f64(node, "inertia-deceleration") {
        options.inertia_deceleration = deceleration;
    }
    if let Some(max_speed) = doc.attr_f64(node, "inertia-max-speed") {
        options.inertia_max_speed = max_speed;
    }
    if let Some(threshold) = doc.attr_f64(node, "zoom-animation-threshold") {
        options.zoom_animation_threshold = threshold;
    }
    options.zoom_control = !doc.attr_bool(node, "no-zoom-control");
    options.attribution_control = !doc.attr_bool(node, "no-attribution-control");
    options
}

/// Build the model for a map element whose viewport became visible.
///
/// The order is observable and deliberate: the forwarded `load` from the
/// initial view precedes `map-ready`, the bundled basemap only appears
/// when no child declares one, and children receive their container before
/// any fitting uses their bounds.
pub(super) fn init_map(engine: &mut Engine, node: NodeId) -> Result<(), Error> {
    let options = map_options_from_attrs(&engine.doc, node);
    let center = options.center;
    let zoom = options.zoom;
    let explicit_zoom = options.has_zoom();
    let fit = engine.doc.attr_bool(node, "fit-to-markers");

    let (width, height) = match engine.states.get(&node).map(|s| &s.data) {
        Some(ElementData::MapRoot(root)) => root.size,
        _ => return Ok(()),
    };

    let map = MapId(engine.next_map);
    engine.next_map += 1;

    let mut model = MapModel::new(options);
    model.set_size(width, height);
    // The construction-time resize is not observable
    let _ = model.take_events();
    engine.maps.insert(map, model);

    if let Some(state) = engine.states.get_mut(&node) {
        state.feature = Some(Feature::Map(map));
    }
    engine.forward_events(node, map, EventTarget::Map, MAP_EVENTS);

    if let Some(model) = engine.maps.get_mut(&map) {
        model.set_view(center, zoom.max(0.0));
    }
    engine.pump_map_events()?;
    engine.out_events.push_back(DomEvent {
        target: node,
        name: "map-ready",
        detail: Value::Null,
    });

    let declares_basemap = engine
        .doc
        .children(node)
        .iter()
        .any(|&child| engine.doc.tag(child).is_some_and(Tag::is_layer));
    if !declares_basemap {
        if let Some(model) = engine.maps.get_mut(&map) {
            model.add_layer(Layer::new(LayerKind::Tile(TileLayer {
                options: TileOptions::default_basemap(),
            })));
        }
    }

    engine.propagate_containers(node, Container::Map(map))?;

    if fit {
        fit_to_layers(engine, map, node);
    } else if !explicit_zoom {
        if let Some(model) = engine.maps.get_mut(&map) {
            model.fit_world();
        }
    }
    Ok(())
}

pub(super) fn attribute_changed(engine: &mut Engine, node: NodeId, name: &str) -> Result<(), Error> {
    match name {
        "latitude" | "longitude" | "zoom" => view_changed(engine, node),
        "fit-to-markers" => {
            let Some(Feature::Map(map)) = engine.feature_of(node) else {
                return Ok(());
            };
            if engine.doc.attr_bool(node, "fit-to-markers") {
                fit_to_layers(engine, map, node);
            }
            Ok(())
        }
        // Everything else only matters at construction
        _ => Ok(()),
    }
}

fn view_changed(engine: &mut Engine, node: NodeId) -> Result<(), Error> {
    let Some(Feature::Map(map)) = engine.feature_of(node) else {
        return Ok(());
    };
    let Some(model) = engine.maps.get_mut(&map) else {
        return Ok(());
    };
    // Missing attributes keep their current view component, so a single
    // zoom write does not teleport the center
    let view = model.view();
    let lat = engine
        .doc
        .attr_f64(node, "latitude")
        .unwrap_or(view.center.lat);
    let lng = engine
        .doc
        .attr_f64(node, "longitude")
        .unwrap_or(view.center.lng);
    let zoom = engine.doc.attr_f64(node, "zoom").unwrap_or(view.zoom);
    model.set_view(LatLng::new(lat, lng), zoom);
    Ok(())
}

pub(super) fn children_changed(engine: &mut Engine, node: NodeId) -> Result<(), Error> {
    let Some(Feature::Map(map)) = engine.feature_of(node) else {
        return Ok(());
    };
    engine.propagate_containers(node, Container::Map(map))
}

pub(super) fn write_back_center(engine: &mut Engine, map: MapId) -> Result<(), Error> {
    let Some(node) = engine.map_node(map) else {
        return Ok(());
    };
    let Some(model) = engine.maps.get(&map) else {
        return Ok(());
    };
    let center = model.view().center;
    engine
        .doc
        .set_attribute(node, "latitude", &center.lat.to_string())?;
    engine
        .doc
        .set_attribute(node, "longitude", &center.lng.to_string())?;
    Ok(())
}

pub(super) fn write_back_zoom(engine: &mut Engine, map: MapId) -> Result<(), Error> {
    let Some(node) = engine.map_node(map) else {
        return Ok(());
    };
    let Some(model) = engine.maps.get(&map) else {
        return Ok(());
    };
    let zoom = model.view().zoom;
    engine.doc.set_attribute(node, "zoom", &zoom.to_string())?;
    Ok(())
}

/// Fit the view to the union of the bounds of the map's direct feature
/// children. With nothing to fit, the view stays where it is.
pub(super) fn fit_to_layers(engine: &mut Engine, map: MapId, node: NodeId) {
    let Some(model) = engine.maps.get(&map) else {
        return;
    };
    let mut all = Vec::new();
    for &child in engine.doc.children(node) {
        let Some(tag) = engine.doc.tag(child) else {
            continue;
        };
        if !tag.is_fit_candidate() {
            continue;
        }
        let Some(Feature::Layer { layer, .. }) = engine.feature_of(child) else {
            continue;
        };
        if let Some(bounds) = model.layer_bounds(layer) {
            all.push(bounds);
        }
    }
    if let Some(bounds) = LatLngBounds::union(all) {
        if let Some(model) = engine.maps.get_mut(&map) {
            model.fit_bounds(&bounds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with_attrs(attrs: &[(&str, &str)]) -> (Document, NodeId) {
        let mut doc = Document::new();
        let node = doc.create_element("leaflet-map");
        for (name, value) in attrs {
            doc.set_attribute(node, name, value).unwrap();
        }
        (doc, node)
    }

    #[test]
    fn test_map_options_defaults() {
        let (doc, node) = map_with_attrs(&[]);
        let options = map_options_from_attrs(&doc, node);
        assert_eq!(options.center, LatLng::new(51.0, 0.0));
        assert!(!options.has_zoom());
        assert!(options.dragging);
        assert!(options.keyboard);
        assert!(!options.world_copy_jump);
        assert!(options.zoom_control);
    }

    #[test]
    fn test_map_options_disable_flags() {
        let (doc, node) = map_with_attrs(&[
            ("latitude", "48.85"),
            ("longitude", "2.35"),
            ("zoom", "11"),
            ("no-dragging", ""),
            ("no-scroll-wheel-zoom", ""),
            ("no-zoom-control", ""),
            ("world-copy-jump", ""),
            ("tap-tolerance", "22"),
        ]);
        let options = map_options_from_attrs(&doc, node);
        assert_eq!(options.center, LatLng::new(48.85, 2.35));
        assert!(options.has_zoom());
        assert!(!options.dragging);
        assert!(!options.scroll_wheel_zoom);
        assert!(!options.zoom_control);
        assert!(options.world_copy_jump);
        assert!((options.tap_tolerance - 22.0).abs() < f64::EPSILON);
        // untouched flags keep their defaults
        assert!(options.double_click_zoom);
        assert!(options.attribution_control);
    }

    #[test]
    fn test_map_event_names_unique() {
        let mut names: Vec<&str> = MAP_EVENTS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), MAP_EVENTS.len());
        assert!(MAP_EVENTS.contains(&"load"));
        assert!(MAP_EVENTS.contains(&"locationfound"));
        assert!(MAP_EVENTS.contains(&"popupclose"));
    }
}
