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

//! Vector shapes: `leaflet-circle`, `leaflet-polyline` and
//! `leaflet-polygon`, with vertices drawn from `leaflet-point` children.

use crate::dom::{Document, NodeId, Tag};
use crate::error::Error;
use crate::geo::LatLng;
use crate::map::events::EventTarget;
use crate::map::layer::{Circle, Layer, LayerKind, PathOptions, Polygon, Polyline};

use super::{style, Container, Engine, Feature};

/// Events re-dispatched on vector shape elements.
const PATH_EVENTS: &[&str] = &[
    "click",
    "dblclick",
    "mousedown",
    "mouseover",
    "mouseout",
    "contextmenu",
    "add",
    "remove",
    "popupopen",
    "popupclose",
];

/// Vertex list from direct `leaflet-point` children, in document order.
/// A missing coordinate reads as zero.
pub(super) fn collect_points(doc: &Document, node: NodeId) -> Vec<LatLng> {
    doc.children(node)
        .iter()
        .filter(|&&child| doc.tag(child) == Some(Tag::Point))
        .map(|&child| {
            LatLng::new(
                doc.attr_f64(child, "latitude").unwrap_or(0.0),
                doc.attr_f64(child, "longitude").unwrap_or(0.0),
            )
        })
        .collect()
}

/// Build the circle once both coordinates are present.
pub(super) fn create_circle(
    engine: &mut Engine,
    node: NodeId,
    container: Container,
) -> Result<(), Error> {
    let Some(lat) = engine.doc.attr_f64(node, "latitude") else {
        return Ok(());
    };
    let Some(lng) = engine.doc.attr_f64(node, "longitude") else {
        return Ok(());
    };
    let circle = Circle {
        center: LatLng::new(lat, lng),
        radius: engine.doc.attr_f64(node, "radius").unwrap_or(100.0),
        options: style::path_options_from_attrs(&engine.doc, node, PathOptions::default()),
    };
    let Some(layer) = engine.place_layer(node, container, Layer::new(LayerKind::Circle(circle)))
    else {
        return Ok(());
    };
    engine.forward_events(node, container.map(), EventTarget::Layer(layer), PATH_EVENTS);
    engine.refresh_popup(node)?;
    Ok(())
}

/// Build a polyline, or a polygon when `closed`. Polygons fill by
/// default; polylines do not.
pub(super) fn create_shape(
    engine: &mut Engine,
    node: NodeId,
    container: Container,
    closed: bool,
) -> Result<(), Error> {
    let points = collect_points(&engine.doc, node);
    let mut base = PathOptions::default();
    if closed {
        base.fill = true;
    }
    let options = style::path_options_from_attrs(&engine.doc, node, base);
    let kind = if closed {
        LayerKind::Polygon(Polygon { points, options })
    } else {
        LayerKind::Polyline(Polyline { points, options })
    };
    let Some(layer) = engine.place_layer(node, container, Layer::new(kind)) else {
        return Ok(());
    };
    engine.forward_events(node, container.map(), EventTarget::Layer(layer), PATH_EVENTS);
    engine.refresh_popup(node)?;
    Ok(())
}

pub(super) fn circle_attribute_changed(
    engine: &mut Engine,
    node: NodeId,
    name: &str,
) -> Result<(), Error> {
    let Some(Feature::Layer { map, layer }) = engine.feature_of(node) else {
        // Completing the coordinate pair brings the circle to life
        return engine.try_create_feature(node);
    };
    match name {
        "latitude" | "longitude" => {
            let lat = engine.doc.attr_f64(node, "latitude");
            let lng = engine.doc.attr_f64(node, "longitude");
            if let (Some(lat), Some(lng)) = (lat, lng) {
                if let Some(model) = engine.maps.get_mut(&map) {
                    model.set_circle_center(layer, LatLng::new(lat, lng));
                }
            }
        }
        "radius" => {
            if let Some(radius) = engine.doc.attr_f64(node, "radius") {
                if let Some(model) = engine.maps.get_mut(&map) {
                    model.set_circle_radius(layer, radius);
                }
            }
        }
        // Style attributes only matter at construction
        _ => {}
    }
    Ok(())
}

/// Rebuild the vertex list after any change below the shape element.
pub(super) fn points_changed(engine: &mut Engine, node: NodeId) -> Result<(), Error> {
    let Some(Feature::Layer { map, layer }) = engine.feature_of(node) else {
        return Ok(());
    };
    let points = collect_points(&engine.doc, node);
    if let Some(model) = engine.maps.get_mut(&map) {
        model.set_shape_points(layer, points);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn find_all(engine: &Engine, tag: Tag) -> Vec<NodeId> {
        let doc = engine.document();
        doc.descendants(doc.root())
            .into_iter()
            .filter(|&n| doc.tag(n) == Some(tag))
            .collect()
    }

    fn shape_kind(engine: &Engine, node: NodeId) -> LayerKind {
        let Some(Feature::Layer { map, layer }) = engine.feature_of(node) else {
            panic!("element has no layer feature");
        };
        engine.map(map).unwrap().layer(layer).unwrap().kind.clone()
    }

    #[test]
    fn test_collect_points_in_document_order() {
        let mut doc = Document::new();
        let shape = doc.create_element("leaflet-polyline");
        for (lat, lng) in [(1.0, 4.0), (2.0, 5.0), (3.0, 6.0)] {
            let point = doc.create_element("leaflet-point");
            doc.set_attribute(point, "latitude", &lat.to_string()).unwrap();
            doc.set_attribute(point, "longitude", &lng.to_string()).unwrap();
            doc.append_child(shape, point).unwrap();
        }
        let other = doc.create_element("span");
        doc.append_child(shape, other).unwrap();

        let points = collect_points(&doc, shape);
        assert_eq!(
            points,
            vec![
                LatLng::new(1.0, 4.0),
                LatLng::new(2.0, 5.0),
                LatLng::new(3.0, 6.0)
            ]
        );
    }

    #[test]
    fn test_point_missing_coordinate_reads_zero() {
        let mut doc = Document::new();
        let shape = doc.create_element("leaflet-polyline");
        let point = doc.create_element("leaflet-point");
        doc.set_attribute(point, "latitude", "7").unwrap();
        doc.append_child(shape, point).unwrap();
        assert_eq!(collect_points(&doc, shape), vec![LatLng::new(7.0, 0.0)]);
    }

    #[test]
    fn test_circle_waits_for_coordinates() {
        let mut engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-circle radius=\"500\"></leaflet-circle></leaflet-map>",
        );
        let node = find(&engine, Tag::Circle);
        assert!(engine.feature_of(node).is_none());

        engine
            .document_mut()
            .set_attribute(node, "latitude", "45")
            .unwrap();
        engine
            .document_mut()
            .set_attribute(node, "longitude", "9")
            .unwrap();
        engine.flush().unwrap();
        match shape_kind(&engine, node) {
            LayerKind::Circle(circle) => {
                assert_eq!(circle.center, LatLng::new(45.0, 9.0));
                assert!((circle.radius - 500.0).abs() < f64::EPSILON);
            }
            other => panic!("expected circle, got {other:?}"),
        }
    }

    #[test]
    fn test_circle_radius_defaults_and_reacts() {
        let mut engine = shown(
            "<leaflet-map zoom=\"3\">\
             <leaflet-circle latitude=\"1\" longitude=\"2\"></leaflet-circle></leaflet-map>",
        );
        let node = find(&engine, Tag::Circle);
        match shape_kind(&engine, node) {
            LayerKind::Circle(circle) => assert!((circle.radius - 100.0).abs() < f64::EPSILON),
            other => panic!("expected circle, got {other:?}"),
        }

        engine
            .document_mut()
            .set_attribute(node, "radius", "2500")
            .unwrap();
        engine.flush().unwrap();
        match shape_kind(&engine, node) {
            LayerKind::Circle(circle) => assert!((circle.radius - 2500.0).abs() < f64::EPSILON),
            other => panic!("expected circle, got {other:?}"),
        }
    }

    #[test]
    fn test_circle_click_target_is_opt_in() {
        let engine = shown(
            "<leaflet-map zoom=\"3\">\
             <leaflet-circle latitude=\"1\" longitude=\"2\"></leaflet-circle>\
             <leaflet-circle latitude=\"3\" longitude=\"4\" clickable></leaflet-circle>\
             </leaflet-map>",
        );
        let nodes = find_all(&engine, Tag::Circle);
        match shape_kind(&engine, nodes[0]) {
            LayerKind::Circle(circle) => assert!(!circle.options.clickable),
            other => panic!("expected circle, got {other:?}"),
        }
        match shape_kind(&engine, nodes[1]) {
            LayerKind::Circle(circle) => assert!(circle.options.clickable),
            other => panic!("expected circle, got {other:?}"),
        }
    }

    #[test]
    fn test_polygon_fills_by_default_polyline_does_not() {
        let engine = shown(
            "<leaflet-map zoom=\"3\">\
             <leaflet-polygon>\
             <leaflet-point latitude=\"0\" longitude=\"0\"></leaflet-point>\
             <leaflet-point latitude=\"0\" longitude=\"1\"></leaflet-point>\
             <leaflet-point latitude=\"1\" longitude=\"1\"></leaflet-point>\
             </leaflet-polygon>\
             <leaflet-polyline>\
             <leaflet-point latitude=\"2\" longitude=\"2\"></leaflet-point>\
             <leaflet-point latitude=\"3\" longitude=\"3\"></leaflet-point>\
             </leaflet-polyline>\
             </leaflet-map>",
        );
        let polygon = find(&engine, Tag::Polygon);
        let polyline = find(&engine, Tag::Polyline);
        match shape_kind(&engine, polygon) {
            LayerKind::Polygon(shape) => assert!(shape.options.fill),
            other => panic!("expected polygon, got {other:?}"),
        }
        match shape_kind(&engine, polyline) {
            LayerKind::Polyline(shape) => assert!(!shape.options.fill),
            other => panic!("expected polyline, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_polyline_still_builds() {
        let engine =
            shown("<leaflet-map zoom=\"3\"><leaflet-polyline></leaflet-polyline></leaflet-map>");
        let node = find(&engine, Tag::Polyline);
        match shape_kind(&engine, node) {
            LayerKind::Polyline(shape) => assert!(shape.points.is_empty()),
            other => panic!("expected polyline, got {other:?}"),
        }
    }
}
