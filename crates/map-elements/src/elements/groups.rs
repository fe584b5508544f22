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

//! Composite layers: `leaflet-layer-group` and `leaflet-geojson`.
//!
//! A layer group is itself a container; its children bind their layers
//! into the group rather than directly onto the map. GeoJSON elements
//! read their data from an inline JSON `<script>` child, unless the host
//! supplies data programmatically.

use serde_json::Value;

use crate::dom::{Document, NodeId};
use crate::error::Error;
use crate::map::layer::{GeoJsonLayer, Layer, LayerGroup, LayerKind, PathOptions};

use super::{style, Container, ElementData, Engine, Feature};

/// Per-element state of a `leaflet-geojson`.
#[derive(Debug, Default)]
pub(super) struct GeoJsonState {
    /// Data supplied through [`Engine::set_geojson_data`], shadowing any
    /// inline script child.
    pub(super) override_data: Option<Value>,
    /// Error from the last failed parse of inline data.
    pub(super) parse_error: Option<String>,
}

pub(super) fn create_group(
    engine: &mut Engine,
    node: NodeId,
    container: Container,
) -> Result<(), Error> {
    let Some(group) = engine.place_layer(
        node,
        container,
        Layer::new(LayerKind::Group(LayerGroup::default())),
    ) else {
        return Ok(());
    };
    engine.propagate_containers(
        node,
        Container::Group {
            map: container.map(),
            group,
        },
    )
}

/// Children added under a live group pick up its container.
pub(super) fn children_changed(engine: &mut Engine, node: NodeId) -> Result<(), Error> {
    let Some(Feature::Layer { map, layer }) = engine.feature_of(node) else {
        return Ok(());
    };
    engine.propagate_containers(node, Container::Group { map, group: layer })
}

pub(super) fn create_geojson(
    engine: &mut Engine,
    node: NodeId,
    container: Container,
) -> Result<(), Error> {
    let (data, error) = resolve_data(engine, node);
    if let Some(state) = engine.states.get_mut(&node) {
        if let ElementData::GeoJson(geo) = &mut state.data {
            geo.parse_error = error;
        }
    }
    let Some(data) = data else {
        return Ok(());
    };

    let styled = style::path_options_from_attrs(&engine.doc, node, PathOptions::default());
    let layer = Layer::new(LayerKind::GeoJson(GeoJsonLayer {
        data,
        style: PathOptions::default(),
    }));
    let Some(id) = engine.place_layer(node, container, layer) else {
        return Ok(());
    };
    // Styling is a separate step so attribute defaults merge the same way
    // they would on a restyled live layer
    if let Some(model) = engine.maps.get_mut(&container.map()) {
        model.set_path_style(id, styled);
    }
    Ok(())
}

/// Inline data edits only matter while the element has no layer yet; a
/// live layer keeps the data it was built from.
pub(super) fn content_changed(engine: &mut Engine, node: NodeId) -> Result<(), Error> {
    if engine.feature_of(node).is_some() {
        return Ok(());
    }
    if let Some(state) = engine.states.get(&node) {
        if let ElementData::GeoJson(geo) = &state.data {
            if geo.override_data.is_some() {
                return Ok(());
            }
        }
    }
    engine.try_create_feature(node)
}

/// Resolve the element's data: a host override wins, otherwise the inline
/// script child is parsed. Returns the data and any parse error.
fn resolve_data(engine: &Engine, node: NodeId) -> (Option<Value>, Option<String>) {
    if let Some(state) = engine.states.get(&node) {
        if let ElementData::GeoJson(geo) = &state.data {
            if let Some(data) = &geo.override_data {
                return (Some(data.clone()), None);
            }
        }
    }
    let Some(raw) = inline_json(&engine.doc, node) else {
        return (None, None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(err.to_string())),
    }
}

/// Text of the first `<script type="application/json">` child.
fn inline_json(doc: &Document, node: NodeId) -> Option<String> {
    doc.children(node)
        .iter()
        .copied()
        .find(|&child| {
            doc.element_name(child) == Some("script")
                && doc.attr(child, "type") == Some("application/json")
        })
        .map(|child| doc.inner_text(child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Tag;

    fn shown(markup: &str) -> Engine {
        let mut engine = Engine::from_markup(markup).unwrap();
        let doc = engine.document();
        let map_node = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some(Tag::Map))
            .unwrap();
        engine.set_map_viewport(map_node, 800.0, 600.0, true);
        engine.flush().unwrap();
        engine
    }

    fn find(engine: &Engine, tag: Tag) -> NodeId {
        let doc = engine.document();
        doc.descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some(tag))
            .unwrap()
    }

    #[test]
    fn test_inline_script_requires_json_type() {
        let engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-geojson>\
             <script>{\"type\":\"FeatureCollection\",\"features\":[]}</script>\
             </leaflet-geojson></leaflet-map>",
        );
        let node = find(&engine, Tag::GeoJson);
        assert!(engine.feature_of(node).is_none());
        assert!(engine.geojson_error(node).is_none());

        let engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-geojson>\
             <script type=\"application/json\">\
             {\"type\":\"FeatureCollection\",\"features\":[]}</script>\
             </leaflet-geojson></leaflet-map>",
        );
        let node = find(&engine, Tag::GeoJson);
        assert!(engine.feature_of(node).is_some());
    }

    #[test]
    fn test_geojson_style_comes_from_attributes() {
        let engine = shown(
            "<leaflet-map zoom=\"3\">\
             <leaflet-geojson color=\"#ff0000\" fill fill-opacity=\"0.6\">\
             <script type=\"application/json\">\
             {\"type\":\"Point\",\"coordinates\":[0,0]}</script>\
             </leaflet-geojson></leaflet-map>",
        );
        let node = find(&engine, Tag::GeoJson);
        let Some(Feature::Layer { map, layer }) = engine.feature_of(node) else {
            panic!("geojson did not build a layer");
        };
        let model = engine.map(map).unwrap();
        match &model.layer(layer).unwrap().kind {
            LayerKind::GeoJson(geo) => {
                assert_eq!(geo.style.color, "#ff0000");
                assert!(geo.style.fill);
                assert!((geo.style.fill_opacity - 0.6).abs() < f64::EPSILON);
                assert_eq!(geo.data["type"], "Point");
            }
            other => panic!("expected geojson layer, got {other:?}"),
        }
    }

    #[test]
    fn test_late_child_joins_group() {
        let mut engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-layer-group></leaflet-layer-group></leaflet-map>",
        );
        let group_node = find(&engine, Tag::LayerGroup);
        let Some(Feature::Layer { map, layer: group }) = engine.feature_of(group_node) else {
            panic!("group did not build a layer");
        };

        let marker = {
            let doc = engine.document_mut();
            let marker = doc.create_element("leaflet-marker");
            doc.set_attribute(marker, "latitude", "10").unwrap();
            doc.set_attribute(marker, "longitude", "20").unwrap();
            doc.append_child(group_node, marker).unwrap();
            marker
        };
        engine.flush().unwrap();

        let Some(Feature::Layer { layer, .. }) = engine.feature_of(marker) else {
            panic!("marker did not join the group");
        };
        let model = engine.map(map).unwrap();
        match &model.layer(group).unwrap().kind {
            LayerKind::Group(g) => assert_eq!(g.members, vec![layer]),
            other => panic!("expected group layer, got {other:?}"),
        }
    }
}
