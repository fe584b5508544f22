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

//! Stroke and fill options parsed from element attributes, shared by the
//! vector shapes, GeoJSON layers, and legend symbols.

use crate::dom::{Document, NodeId};
use crate::map::layer::PathOptions;

/// Read path style attributes over `base`. Boolean attributes enable on
/// presence and never disable, per HTML boolean attribute semantics;
/// everything else overrides its base only when present.
pub(super) fn path_options_from_attrs(
    doc: &Document,
    node: NodeId,
    mut base: PathOptions,
) -> PathOptions {
    if doc.attr_bool(node, "stroke") {
        base.stroke = true;
    }
    if let Some(color) = doc.attr(node, "color") {
        base.color = color.to_string();
    }
    if let Some(weight) = doc.attr_f64(node, "weight") {
        base.weight = weight;
    }
    if let Some(opacity) = doc.attr_f64(node, "opacity") {
        base.opacity = opacity;
    }
    if doc.attr_bool(node, "fill") {
        base.fill = true;
    }
    if let Some(fill_color) = doc.attr(node, "fill-color") {
        base.fill_color = Some(fill_color.to_string());
    }
    if let Some(fill_opacity) = doc.attr_f64(node, "fill-opacity") {
        base.fill_opacity = fill_opacity;
    }
    if let Some(dash_array) = doc.attr(node, "dash-array") {
        base.dash_array = Some(dash_array.to_string());
    }
    if let Some(dash_offset) = doc.attr(node, "dash-offset") {
        base.dash_offset = Some(dash_offset.to_string());
    }
    if let Some(line_cap) = doc.attr(node, "line-cap") {
        base.line_cap = Some(line_cap.to_string());
    }
    if let Some(line_join) = doc.attr(node, "line-join") {
        base.line_join = Some(line_join.to_string());
    }
    if let Some(fill_rule) = doc.attr(node, "fill-rule") {
        base.fill_rule = Some(fill_rule.to_string());
    }
    if let Some(pointer_events) = doc.attr(node, "pointer-events") {
        base.pointer_events = Some(pointer_events.to_string());
    }
    if doc.attr_bool(node, "clickable") {
        base.clickable = true;
    }
    if let Some(class_name) = doc.attr(node, "class-name") {
        base.class_name = class_name.to_string();
    }
    base
}
