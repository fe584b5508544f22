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

//! Control elements: zoom buttons, scale bar and the fullscreen toggle.
//!
//! Controls are configured entirely at construction and sit directly on
//! the map; a control declared inside a layer group is rejected.

use log::warn;

use crate::dom::{Document, NodeId, Tag};
use crate::error::Error;
use crate::map::control::{
    Control, ControlKind, ControlPosition, FullscreenIndicator, FullscreenToggle, ScaleControl,
    ZoomControl,
};

use super::{Container, ElementData, Engine, Feature};

pub(super) fn create(
    engine: &mut Engine,
    node: NodeId,
    tag: Tag,
    container: Container,
) -> Result<(), Error> {
    let Container::Map(map) = container else {
        warn!("Attempted to add control to a layer group");
        return Ok(());
    };
    let Some(model) = engine.maps.get_mut(&map) else {
        return Ok(());
    };

    let doc = &engine.doc;
    let (control, toggle) = match tag {
        Tag::ZoomControl => (
            Control {
                position: position_attr(doc, node, ControlPosition::TopRight),
                kind: ControlKind::Zoom(zoom_from_attrs(doc, node)),
            },
            None,
        ),
        Tag::ScaleControl => (
            Control {
                position: position_attr(doc, node, ControlPosition::BottomLeft),
                kind: ControlKind::Scale(scale_from_attrs(doc, node)),
            },
            None,
        ),
        Tag::FullscreenControl => {
            let true_text = doc
                .attr(node, "true-text")
                .unwrap_or("Exit Fullscreen")
                .to_string();
            let false_text = doc
                .attr(node, "false-text")
                .unwrap_or("View Fullscreen")
                .to_string();
            let toggle = FullscreenToggle {
                pseudo: doc.attr_bool(node, "pseudo-fullscreen"),
                true_text: true_text.clone(),
                false_text: false_text.clone(),
            };
            (
                Control {
                    position: position_attr(doc, node, ControlPosition::TopLeft),
                    kind: ControlKind::Fullscreen(FullscreenIndicator {
                        true_text,
                        false_text,
                        is_fullscreen: model.is_fullscreen(),
                    }),
                },
                Some(toggle),
            )
        }
        _ => return Ok(()),
    };

    let id = model.add_control(control);
    if let Some(state) = engine.states.get_mut(&node) {
        state.feature = Some(Feature::Control { map, control: id });
        if let Some(toggle) = toggle {
            state.data = ElementData::Fullscreen(toggle);
        }
    }
    Ok(())
}

pub(super) fn position_attr(doc: &Document, node: NodeId, default: ControlPosition) -> ControlPosition {
    ControlPosition::from_attr(doc.attr(node, "position"), default)
}

// The zoom button attribute names have no separators; they mirror the
// camel-cased option names as attributes verbatim
fn zoom_from_attrs(doc: &Document, node: NodeId) -> ZoomControl {
    let base = ZoomControl::default();
    ZoomControl {
        zoom_in_text: doc
            .attr(node, "zoomintext")
            .map_or(base.zoom_in_text, ToString::to_string),
        zoom_in_title: doc
            .attr(node, "zoomintitle")
            .map_or(base.zoom_in_title, ToString::to_string),
        zoom_out_text: doc
            .attr(node, "zoomouttext")
            .map_or(base.zoom_out_text, ToString::to_string),
        zoom_out_title: doc
            .attr(node, "zoomouttitle")
            .map_or(base.zoom_out_title, ToString::to_string),
    }
}

fn scale_from_attrs(doc: &Document, node: NodeId) -> ScaleControl {
    let (metric, imperial) = ScaleControl::resolve_units(
        doc.attr_bool(node, "metric"),
        doc.attr_bool(node, "imperial"),
    );
    ScaleControl {
        max_width: doc.attr_f64(node, "max-width").unwrap_or(100.0),
        metric,
        imperial,
        update_when_idle: doc.attr_bool(node, "update-when-idle"),
    }
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

    fn control_of(engine: &Engine, tag: Tag) -> Control {
        let doc = engine.document();
        let node = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some(tag))
            .unwrap();
        let Some(Feature::Control { map, control }) = engine.feature_of(node) else {
            panic!("element has no control feature");
        };
        engine.map(map).unwrap().control(control).unwrap().clone()
    }

    #[test]
    fn test_zoom_control_defaults() {
        let engine = shown(
            "<leaflet-map zoom=\"3\">\
             <leaflet-zoom-control></leaflet-zoom-control></leaflet-map>",
        );
        let control = control_of(&engine, Tag::ZoomControl);
        assert_eq!(control.position, ControlPosition::TopRight);
        match control.kind {
            ControlKind::Zoom(zoom) => {
                assert_eq!(zoom.zoom_in_text, "+");
                assert_eq!(zoom.zoom_out_text, "\u{2212}");
                assert_eq!(zoom.zoom_in_title, "Zoom in");
            }
            other => panic!("expected zoom control, got {other:?}"),
        }
    }

    #[test]
    fn test_zoom_control_attribute_overrides() {
        let engine = shown(
            "<leaflet-map zoom=\"3\">\
             <leaflet-zoom-control position=\"bottomright\" zoomintext=\"in\" \
             zoomouttitle=\"Back out\"></leaflet-zoom-control></leaflet-map>",
        );
        let control = control_of(&engine, Tag::ZoomControl);
        assert_eq!(control.position, ControlPosition::BottomRight);
        match control.kind {
            ControlKind::Zoom(zoom) => {
                assert_eq!(zoom.zoom_in_text, "in");
                assert_eq!(zoom.zoom_out_title, "Back out");
                assert_eq!(zoom.zoom_out_text, "\u{2212}");
            }
            other => panic!("expected zoom control, got {other:?}"),
        }
    }

    #[test]
    fn test_scale_control_unit_flags() {
        let engine = shown(
            "<leaflet-map zoom=\"3\">\
             <leaflet-scale-control metric max-width=\"200\" update-when-idle>\
             </leaflet-scale-control></leaflet-map>",
        );
        let control = control_of(&engine, Tag::ScaleControl);
        assert_eq!(control.position, ControlPosition::BottomLeft);
        match control.kind {
            ControlKind::Scale(scale) => {
                assert!(scale.metric);
                assert!(!scale.imperial);
                assert!((scale.max_width - 200.0).abs() < f64::EPSILON);
                assert!(scale.update_when_idle);
            }
            other => panic!("expected scale control, got {other:?}"),
        }
    }

    #[test]
    fn test_fullscreen_indicator_tracks_map_state() {
        let mut engine = shown(
            "<leaflet-map zoom=\"3\">\
             <leaflet-fullscreen-control pseudo-fullscreen></leaflet-fullscreen-control>\
             </leaflet-map>",
        );
        let control = control_of(&engine, Tag::FullscreenControl);
        match control.kind {
            ControlKind::Fullscreen(indicator) => {
                assert!(!indicator.is_fullscreen);
                assert_eq!(indicator.title(), "View Fullscreen");
            }
            other => panic!("expected fullscreen control, got {other:?}"),
        }

        let doc = engine.document();
        let node = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some(Tag::FullscreenControl))
            .unwrap();
        engine.toggle_fullscreen(node).unwrap();
        let control = control_of(&engine, Tag::FullscreenControl);
        match control.kind {
            ControlKind::Fullscreen(indicator) => {
                assert!(indicator.is_fullscreen);
                assert_eq!(indicator.title(), "Exit Fullscreen");
            }
            other => panic!("expected fullscreen control, got {other:?}"),
        }
    }

    #[test]
    fn test_control_inside_group_is_rejected() {
        let engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-layer-group>\
             <leaflet-zoom-control></leaflet-zoom-control>\
             </leaflet-layer-group></leaflet-map>",
        );
        let doc = engine.document();
        let node = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some(Tag::ZoomControl))
            .unwrap();
        assert!(engine.feature_of(node).is_none());
    }
}
