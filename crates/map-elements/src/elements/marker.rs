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

//! The `leaflet-marker` element.

use log::warn;

use crate::dom::{NodeId, Tag};
use crate::error::Error;
use crate::geo::LatLng;
use crate::map::events::EventTarget;
use crate::map::icon::Icon;
use crate::map::layer::{Layer, LayerKind, Marker};

use super::{data, Container, Engine, Feature};

/// Events re-dispatched on the `leaflet-marker` element.
const MARKER_EVENTS: &[&str] = &[
    "click",
    "dblclick",
    "mousedown",
    "mouseover",
    "mouseout",
    "contextmenu",
    "dragstart",
    "drag",
    "dragend",
    "move",
    "add",
    "remove",
    "popupopen",
    "popupclose",
];

/// Build the marker once both coordinates are present; until then the
/// element holds its container and waits.
pub(super) fn create(engine: &mut Engine, node: NodeId, container: Container) -> Result<(), Error> {
    let Some(lat) = engine.doc.attr_f64(node, "latitude") else {
        return Ok(());
    };
    let Some(lng) = engine.doc.attr_f64(node, "longitude") else {
        return Ok(());
    };
    let icon = resolve_icon(engine, node);
    let doc = &engine.doc;
    let marker = Marker {
        position: LatLng::new(lat, lng),
        icon,
        draggable: doc.attr_bool(node, "draggable"),
        keyboard: doc.attr_bool(node, "keyboard"),
        title: doc.attr(node, "title").unwrap_or_default().to_string(),
        alt: doc.attr(node, "alt").unwrap_or_default().to_string(),
        z_index_offset: doc.attr_f64(node, "z-index-offset").unwrap_or(0.0),
        opacity: doc.attr_f64(node, "opacity").unwrap_or(1.0),
        rise_on_hover: doc.attr_bool(node, "rise-on-hover"),
        rise_offset: doc.attr_f64(node, "rise-offset").unwrap_or(250.0),
    };
    let Some(layer) = engine.place_layer(node, container, Layer::new(LayerKind::Marker(marker)))
    else {
        return Ok(());
    };
    engine.forward_events(node, container.map(), EventTarget::Layer(layer), MARKER_EVENTS);
    engine.refresh_popup(node)?;
    Ok(())
}

pub(super) fn attribute_changed(engine: &mut Engine, node: NodeId, name: &str) -> Result<(), Error> {
    let Some(Feature::Layer { map, layer }) = engine.feature_of(node) else {
        // Completing the coordinate pair brings the marker to life
        return engine.try_create_feature(node);
    };
    match name {
        "latitude" | "longitude" => {
            let lat = engine.doc.attr_f64(node, "latitude");
            let lng = engine.doc.attr_f64(node, "longitude");
            if let (Some(lat), Some(lng)) = (lat, lng) {
                if let Some(model) = engine.maps.get_mut(&map) {
                    model.set_marker_latlng(layer, LatLng::new(lat, lng));
                }
            }
        }
        "icon" => {
            let icon = resolve_icon(engine, node);
            if let Some(model) = engine.maps.get_mut(&map) {
                model.set_marker_icon(layer, icon);
            }
        }
        "opacity" => {
            if let Some(opacity) = engine.doc.attr_f64(node, "opacity") {
                if let Some(model) = engine.maps.get_mut(&map) {
                    model.set_marker_opacity(layer, opacity);
                }
            }
        }
        "z-index-offset" => {
            if let Some(offset) = engine.doc.attr_f64(node, "z-index-offset") {
                if let Some(model) = engine.maps.get_mut(&map) {
                    model.set_marker_z_index_offset(layer, offset);
                }
            }
        }
        // title, alt, draggable and the rest only matter at construction
        _ => {}
    }
    Ok(())
}

/// Resolve a marker's `icon` attribute: an element id naming a
/// `leaflet-icon` or `leaflet-divicon` wins, then inline JSON options,
/// then the default icon.
fn resolve_icon(engine: &mut Engine, node: NodeId) -> Icon {
    let Some(raw) = engine.doc.attr(node, "icon") else {
        return Icon::Default;
    };
    let raw = raw.to_string();
    if let Some(icon_node) = engine.doc.element_by_id(&raw) {
        if matches!(engine.doc.tag(icon_node), Some(Tag::Icon | Tag::DivIcon)) {
            return data::icon_for_element(engine, icon_node);
        }
    }
    match Icon::from_json(&raw) {
        Ok(icon) => icon,
        Err(err) => {
            warn!("Unusable icon options on marker: {err}");
            Icon::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::icon::IconOptions;

    fn marker_engine(marker_attrs: &str) -> (Engine, NodeId) {
        let markup = format!(
            "<leaflet-map zoom=\"3\"><leaflet-marker {marker_attrs}></leaflet-marker></leaflet-map>"
        );
        let mut engine = Engine::from_markup(&markup).unwrap();
        let doc = engine.document();
        let map_node = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some(Tag::Map))
            .unwrap();
        engine.set_map_viewport(map_node, 800.0, 600.0, true);
        engine.flush().unwrap();
        let doc = engine.document();
        let marker_node = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some(Tag::Marker))
            .unwrap();
        (engine, marker_node)
    }

    fn model_marker(engine: &Engine, node: NodeId) -> Marker {
        let Some(Feature::Layer { map, layer }) = engine.feature_of(node) else {
            panic!("marker has no layer feature");
        };
        match &engine.map(map).unwrap().layer(layer).unwrap().kind {
            LayerKind::Marker(marker) => marker.clone(),
            other => panic!("expected marker, got {other:?}"),
        }
    }

    #[test]
    fn test_marker_attributes_map_to_options() {
        let (engine, node) = marker_engine(
            "latitude=\"51.5\" longitude=\"-0.09\" draggable keyboard \
             title=\"Big Ben\" alt=\"clock tower\" z-index-offset=\"100\" \
             opacity=\"0.7\" rise-on-hover rise-offset=\"300\"",
        );
        let marker = model_marker(&engine, node);
        assert_eq!(marker.position, LatLng::new(51.5, -0.09));
        assert!(marker.draggable);
        assert!(marker.keyboard);
        assert_eq!(marker.title, "Big Ben");
        assert_eq!(marker.alt, "clock tower");
        assert!((marker.z_index_offset - 100.0).abs() < f64::EPSILON);
        assert!((marker.opacity - 0.7).abs() < f64::EPSILON);
        assert!(marker.rise_on_hover);
        assert!((marker.rise_offset - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_marker_option_defaults() {
        let (engine, node) = marker_engine("latitude=\"1\" longitude=\"2\"");
        let marker = model_marker(&engine, node);
        assert!(!marker.draggable);
        assert!(!marker.keyboard);
        assert_eq!(marker.title, "");
        assert!((marker.z_index_offset).abs() < f64::EPSILON);
        assert!((marker.opacity - 1.0).abs() < f64::EPSILON);
        assert!((marker.rise_offset - 250.0).abs() < f64::EPSILON);
        assert_eq!(marker.icon, Icon::Default);
    }

    #[test]
    fn test_marker_inline_icon_json() {
        let (engine, node) = marker_engine(
            "latitude=\"1\" longitude=\"2\" \
             icon='{\"iconUrl\":\"pin.png\",\"iconSize\":[24,32]}'",
        );
        let marker = model_marker(&engine, node);
        assert_eq!(
            marker.icon,
            Icon::Image(IconOptions {
                icon_url: Some("pin.png".to_string()),
                icon_size: Some((24.0, 32.0)),
                ..IconOptions::default()
            })
        );
    }

    #[test]
    fn test_marker_unparseable_icon_falls_back_to_default() {
        let (engine, node) = marker_engine("latitude=\"1\" longitude=\"2\" icon=\"not json\"");
        let marker = model_marker(&engine, node);
        assert_eq!(marker.icon, Icon::Default);
    }

    #[test]
    fn test_marker_construction_attributes_do_not_react() {
        let (mut engine, node) = marker_engine("latitude=\"1\" longitude=\"2\" title=\"before\"");
        engine
            .document_mut()
            .set_attribute(node, "title", "after")
            .unwrap();
        engine
            .document_mut()
            .set_attribute(node, "opacity", "0.25")
            .unwrap();
        engine.flush().unwrap();
        let marker = model_marker(&engine, node);
        assert_eq!(marker.title, "before");
        assert!((marker.opacity - 0.25).abs() < f64::EPSILON);
    }
}
