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

//! The legend element and its `leaflet-legend-symbol` children.
//!
//! Entries follow the symbol children: adding, removing or editing a
//! symbol rebuilds the legend on the next flush. Toggling an entry is
//! mirrored onto the backing symbol's `inactive` attribute so markup and
//! model stay in agreement.

use log::warn;

use crate::dom::{Document, NodeId, Tag};
use crate::error::Error;
use crate::map::control::{
    circle_glyph, polygon_glyph, polyline_glyph, rectangle_glyph, Control, ControlKind,
    ControlPosition, Glyph, LegendControl, LegendEntry,
};
use crate::map::layer::PathOptions;
use crate::map::MapId;

use super::{controls, style, Container, Engine, Feature};

pub(super) fn create(
    engine: &mut Engine,
    node: NodeId,
    container: Container,
) -> Result<(), Error> {
    let Container::Map(map) = container else {
        warn!("Attempted to add legend to a layer group");
        return Ok(());
    };
    let control = Control {
        position: controls::position_attr(&engine.doc, node, ControlPosition::TopLeft),
        kind: ControlKind::Legend(legend_from_attrs(&engine.doc, node)),
    };
    let Some(model) = engine.maps.get_mut(&map) else {
        return Ok(());
    };
    let id = model.add_control(control);
    if let Some(state) = engine.states.get_mut(&node) {
        state.feature = Some(Feature::Control { map, control: id });
    }
    Ok(())
}

/// Rebuild the entries of a legend from its current symbol children.
pub(super) fn refresh(engine: &mut Engine, node: NodeId) -> Result<(), Error> {
    let Some(Feature::Control { map, control }) = engine.feature_of(node) else {
        return Ok(());
    };
    let entries = build_entries(&engine.doc, node);
    if let Some(model) = engine.maps.get_mut(&map) {
        if let Some(ControlKind::Legend(legend)) = model.control_mut(control).map(|c| &mut c.kind)
        {
            legend.entries = entries;
        }
    }
    Ok(())
}

/// Rebuild every legend on a map, for example after the zoom changed.
pub(super) fn refresh_for_map(engine: &mut Engine, map: MapId) -> Result<(), Error> {
    let legends: Vec<NodeId> = engine
        .states
        .iter()
        .filter_map(|(node, state)| match state.feature {
            Some(Feature::Control { map: owner, .. })
                if owner == map && engine.doc.tag(*node) == Some(Tag::Legend) =>
            {
                Some(*node)
            }
            _ => None,
        })
        .collect();
    for node in legends {
        refresh(engine, node)?;
    }
    Ok(())
}

/// Flip the `index`-th entry between active and inactive, mirroring the
/// state onto the backing symbol element.
pub(super) fn toggle_entry(engine: &mut Engine, node: NodeId, index: usize) -> Result<(), Error> {
    let Some(Feature::Control { map, control }) = engine.feature_of(node) else {
        return Ok(());
    };
    let mut now_inactive = None;
    if let Some(model) = engine.maps.get_mut(&map) {
        if let Some(ControlKind::Legend(legend)) = model.control_mut(control).map(|c| &mut c.kind)
        {
            if let Some(entry) = legend.entries.get_mut(index) {
                entry.inactive = !entry.inactive;
                now_inactive = Some(entry.inactive);
            }
        }
    }
    let Some(now_inactive) = now_inactive else {
        return Ok(());
    };
    let Some(&symbol) = entry_symbols(&engine.doc, node).get(index) else {
        return Ok(());
    };
    if now_inactive {
        engine.doc.set_attribute(symbol, "inactive", "")?;
    } else {
        engine.doc.remove_attribute(symbol, "inactive")?;
    }
    Ok(())
}

/// Expand or collapse the legend. Expanding rebuilds the entries so a
/// panel opened after symbol edits shows the current set.
pub(super) fn set_expanded(engine: &mut Engine, node: NodeId, expanded: bool) -> Result<(), Error> {
    let Some(Feature::Control { map, control }) = engine.feature_of(node) else {
        return Ok(());
    };
    let entries = expanded.then(|| build_entries(&engine.doc, node));
    if let Some(model) = engine.maps.get_mut(&map) {
        if let Some(ControlKind::Legend(legend)) = model.control_mut(control).map(|c| &mut c.kind)
        {
            legend.expanded = expanded;
            if let Some(entries) = entries {
                legend.entries = entries;
            }
        }
    }
    Ok(())
}

fn legend_from_attrs(doc: &Document, node: NodeId) -> LegendControl {
    LegendControl {
        title: doc.attr(node, "title").unwrap_or("Legend").to_string(),
        opacity: doc.attr_f64(node, "opacity"),
        symbol_width: doc.attr_f64(node, "symbol-width").map_or(24, |v| v as u32),
        symbol_height: doc.attr_f64(node, "symbol-height").map_or(24, |v| v as u32),
        column: doc.attr_f64(node, "column").map_or(1, |v| v as u32),
        expanded: !doc.attr_bool(node, "collapsed"),
        entries: build_entries(doc, node),
    }
}

fn build_entries(doc: &Document, node: NodeId) -> Vec<LegendEntry> {
    let width = doc.attr_f64(node, "symbol-width").unwrap_or(24.0) as f32;
    let height = doc.attr_f64(node, "symbol-height").unwrap_or(24.0) as f32;
    entry_symbols(doc, node)
        .into_iter()
        .filter_map(|symbol| build_entry(doc, symbol, width, height))
        .collect()
}

/// Symbol children that produce an entry, in document order. Symbols with
/// a missing or unknown `type` draw nothing and are skipped.
fn entry_symbols(doc: &Document, node: NodeId) -> Vec<NodeId> {
    doc.children(node)
        .iter()
        .copied()
        .filter(|&child| {
            doc.tag(child) == Some(Tag::LegendSymbol)
                && matches!(
                    doc.attr(child, "type"),
                    Some("circle" | "polyline" | "rectangle" | "polygon" | "image")
                )
        })
        .collect()
}

fn build_entry(doc: &Document, node: NodeId, width: f32, height: f32) -> Option<LegendEntry> {
    let weight = doc.attr_f64(node, "weight").unwrap_or(3.0) as f32;
    let glyph = match doc.attr(node, "type")? {
        "circle" => circle_glyph(
            width,
            height,
            weight,
            doc.attr_f64(node, "radius").map(|r| r as f32),
        ),
        "polyline" => polyline_glyph(width, height),
        "rectangle" => rectangle_glyph(width, height, weight),
        "polygon" => polygon_glyph(
            width,
            height,
            weight,
            doc.attr_f64(node, "sides").map_or(3, |s| s as u32),
        ),
        "image" => Glyph::Image {
            url: doc.attr(node, "url").unwrap_or_default().to_string(),
        },
        _ => return None,
    };
    let base = PathOptions {
        stroke: true,
        color: "#3388ff".to_string(),
        weight: 3.0,
        opacity: 1.0,
        fill: false,
        fill_opacity: 0.2,
        line_cap: Some("round".to_string()),
        line_join: Some("round".to_string()),
        ..PathOptions::default()
    };
    Some(LegendEntry {
        label: doc.attr(node, "label").unwrap_or_default().to_string(),
        glyph,
        style: style::path_options_from_attrs(doc, node, base),
        inactive: doc.attr_bool(node, "inactive"),
    })
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

    fn legend_node(engine: &Engine) -> NodeId {
        let doc = engine.document();
        doc.descendants(doc.root())
            .into_iter()
            .find(|&n| doc.tag(n) == Some(Tag::Legend))
            .unwrap()
    }

    fn legend_of(engine: &Engine, node: NodeId) -> LegendControl {
        let Some(Feature::Control { map, control }) = engine.feature_of(node) else {
            panic!("element has no control feature");
        };
        match &engine.map(map).unwrap().control(control).unwrap().kind {
            ControlKind::Legend(legend) => legend.clone(),
            other => panic!("expected legend, got {other:?}"),
        }
    }

    #[test]
    fn test_legend_defaults() {
        let engine = shown("<leaflet-map zoom=\"3\"><leaflet-legend></leaflet-legend></leaflet-map>");
        let node = legend_node(&engine);
        let legend = legend_of(&engine, node);
        assert_eq!(legend.title, "Legend");
        assert!(legend.expanded);
        assert_eq!(legend.symbol_width, 24);
        assert_eq!(legend.symbol_height, 24);
        assert_eq!(legend.column, 1);
        assert!(legend.entries.is_empty());
    }

    #[test]
    fn test_collapsed_legend_starts_unexpanded() {
        let engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-legend collapsed></leaflet-legend></leaflet-map>",
        );
        let node = legend_node(&engine);
        assert!(!legend_of(&engine, node).expanded);
    }

    #[test]
    fn test_symbols_without_known_type_are_skipped() {
        let engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-legend>\
             <leaflet-legend-symbol label=\"No type\"></leaflet-legend-symbol>\
             <leaflet-legend-symbol type=\"rectangle\" label=\"Zones\"></leaflet-legend-symbol>\
             <leaflet-legend-symbol type=\"blob\" label=\"Unknown\"></leaflet-legend-symbol>\
             </leaflet-legend></leaflet-map>",
        );
        let node = legend_node(&engine);
        let legend = legend_of(&engine, node);
        assert_eq!(legend.entries.len(), 1);
        assert_eq!(legend.entries[0].label, "Zones");
    }

    #[test]
    fn test_symbol_style_merges_attributes() {
        let engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-legend>\
             <leaflet-legend-symbol type=\"circle\" color=\"#aa0000\" fill radius=\"5\">\
             </leaflet-legend-symbol></leaflet-legend></leaflet-map>",
        );
        let node = legend_node(&engine);
        let legend = legend_of(&engine, node);
        let entry = &legend.entries[0];
        assert_eq!(entry.style.color, "#aa0000");
        assert!(entry.style.fill);
        // Untouched attributes keep the symbol defaults, not the shape ones
        assert!(entry.style.stroke);
        assert!((entry.style.weight - 3.0).abs() < f64::EPSILON);
        let Glyph::Circle { radius, .. } = entry.glyph else {
            panic!("expected circle glyph");
        };
        assert!((radius - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_toggle_targets_the_entry_not_the_child_index() {
        let mut engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-legend>\
             <leaflet-legend-symbol label=\"skipped\"></leaflet-legend-symbol>\
             <leaflet-legend-symbol type=\"polyline\" label=\"Routes\"></leaflet-legend-symbol>\
             </leaflet-legend></leaflet-map>",
        );
        let node = legend_node(&engine);
        engine.legend_toggle_entry(node, 0).unwrap();
        engine.flush().unwrap();

        let legend = legend_of(&engine, node);
        assert!(legend.entries[0].inactive);
        let doc = engine.document();
        let symbols: Vec<NodeId> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|&n| doc.tag(n) == Some(Tag::LegendSymbol))
            .collect();
        assert!(!doc.attr_bool(symbols[0], "inactive"));
        assert!(doc.attr_bool(symbols[1], "inactive"));
    }

    #[test]
    fn test_set_expanded_flips_state() {
        let mut engine = shown(
            "<leaflet-map zoom=\"3\"><leaflet-legend collapsed>\
             <leaflet-legend-symbol type=\"polyline\" label=\"Routes\"></leaflet-legend-symbol>\
             </leaflet-legend></leaflet-map>",
        );
        let node = legend_node(&engine);
        assert!(!legend_of(&engine, node).expanded);

        engine.legend_set_expanded(node, true).unwrap();
        let legend = legend_of(&engine, node);
        assert!(legend.expanded);
        assert_eq!(legend.entries.len(), 1);
    }
}
