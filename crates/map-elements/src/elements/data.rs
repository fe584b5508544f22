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

//! Icon definitions and geolocation plumbing.
//!
//! `leaflet-icon` and `leaflet-divicon` elements do not produce layers of
//! their own; markers reference them by id and the resolved icon is cached
//! on the element. `leaflet-geolocation` polls the installed [`Locator`]
//! and mirrors each fix onto its own attributes.

use serde_json::json;

use crate::dom::{Document, NodeId, Tag};
use crate::error::Error;
use crate::geo::WebMercator;
use crate::locate::{LocateFailure, LocateOptions, LocationFix, Locator};
use crate::map::events::EventTarget;
use crate::map::icon::{DivIconOptions, Icon, IconOptions};

use super::{Container, ElementData, Engine};

// ----------------------------------------------------------------------
// Icons

/// Cached resolution of an icon element's attributes.
#[derive(Debug, Default)]
pub(super) struct IconCache {
    pub(super) icon: Option<Icon>,
}

/// Resolve an icon element, caching the result on the element.
pub(super) fn icon_for_element(engine: &mut Engine, node: NodeId) -> Icon {
    if let Some(state) = engine.states.get(&node) {
        if let ElementData::Icon(cache) = &state.data {
            if let Some(icon) = &cache.icon {
                return icon.clone();
            }
        }
    }
    let icon = icon_from_attrs(&engine.doc, node);
    if let Some(state) = engine.states.get_mut(&node) {
        if let ElementData::Icon(cache) = &mut state.data {
            cache.icon = Some(icon.clone());
        }
    }
    icon
}

/// Drop the cached icon after an attribute change. Markers keep the icon
/// they already resolved; only future lookups see the new options.
pub(super) fn icon_changed(engine: &mut Engine, node: NodeId) {
    if let Some(state) = engine.states.get_mut(&node) {
        if let ElementData::Icon(cache) = &mut state.data {
            cache.icon = None;
        }
    }
}

fn icon_from_attrs(doc: &Document, node: NodeId) -> Icon {
    let icon_size = attr_pair(doc, node, "icon-width", "icon-height");
    let icon_anchor = attr_pair(doc, node, "icon-anchor-x", "icon-anchor-y");
    let class_name = doc.attr(node, "class-name").unwrap_or_default().to_string();

    if doc.tag(node) == Some(Tag::DivIcon) {
        return Icon::Div(DivIconOptions {
            icon_size,
            icon_anchor,
            class_name,
            html: doc.inner_markup(node),
        });
    }
    Icon::Image(IconOptions {
        icon_url: doc.attr(node, "icon-url").map(ToString::to_string),
        icon_retina_url: doc.attr(node, "icon-retina-url").map(ToString::to_string),
        icon_size,
        icon_anchor,
        shadow_url: doc.attr(node, "shadow-url").map(ToString::to_string),
        shadow_retina_url: doc.attr(node, "shadow-retina-url").map(ToString::to_string),
        shadow_size: attr_pair(doc, node, "shadow-width", "shadow-height"),
        shadow_anchor: attr_pair(doc, node, "shadow-anchor-x", "shadow-anchor-y"),
        popup_anchor: attr_pair(doc, node, "popup-anchor-x", "popup-anchor-y"),
        class_name,
    })
}

/// A coordinate pair exists only when both attributes do.
fn attr_pair(doc: &Document, node: NodeId, x: &str, y: &str) -> Option<(f64, f64)> {
    Some((doc.attr_f64(node, x)?, doc.attr_f64(node, y)?))
}

// ----------------------------------------------------------------------
// Geolocation

/// Per-element state of a `leaflet-geolocation`.
#[derive(Debug, Default)]
pub(super) struct GeolocationState {
    /// Connected under a live map and subscribed to fixes.
    pub(super) active: bool,
    /// A fix has been requested but not delivered yet.
    pub(super) pending: bool,
    /// Options snapshot taken when the request started.
    pub(super) options: LocateOptions,
    pub(super) last_fix: Option<LocationFix>,
}

/// Begin locating. Options are read once here; attribute edits after the
/// request started only apply to a restarted element.
pub(super) fn start_geolocation(
    engine: &mut Engine,
    node: NodeId,
    container: Container,
) -> Result<(), Error> {
    let options = locate_options_from_attrs(&engine.doc, node);
    {
        let Some(state) = engine.states.get_mut(&node) else {
            return Ok(());
        };
        let ElementData::Geolocation(geo) = &mut state.data else {
            return Ok(());
        };
        if geo.active {
            return Ok(());
        }
        geo.active = true;
        geo.pending = true;
        geo.options = options;
        geo.last_fix = None;
    }
    engine.forward_events(
        node,
        container.map(),
        EventTarget::Map,
        &["locationfound", "locationerror"],
    );
    Ok(())
}

fn locate_options_from_attrs(doc: &Document, node: NodeId) -> LocateOptions {
    let mut options = LocateOptions {
        watch: doc.attr_bool(node, "watch"),
        set_view: doc.attr_bool(node, "set-view"),
        enable_high_accuracy: doc.attr_bool(node, "enable-high-accuracy"),
        ..LocateOptions::default()
    };
    if let Some(max_zoom) = doc.attr_f64(node, "max-zoom") {
        options.max_zoom = max_zoom;
    }
    if let Some(timeout) = doc.attr_f64(node, "timeout") {
        options.timeout_ms = timeout as u64;
    }
    if let Some(age) = doc.attr_f64(node, "maximum-age") {
        options.maximum_age_ms = age as u64;
    }
    options
}

/// Poll the locator for one waiting element. Watch requests deduplicate:
/// a fix identical to the last delivered one stays silent.
pub(super) fn poll_location(
    engine: &mut Engine,
    // The trait object keeps its 'static bound so the boxed locator's
    // re-borrow is not pinned to the whole poll loop
    locator: Option<&mut (dyn Locator + Send + 'static)>,
    node: NodeId,
) -> Result<(), Error> {
    let options = {
        let Some(ElementData::Geolocation(geo)) = engine.states.get(&node).map(|s| &s.data) else {
            return Ok(());
        };
        geo.options.clone()
    };

    let outcome = match locator {
        Some(locator) => locator.locate(&options),
        None => Err(LocateFailure::unavailable("no location provider installed")),
    };

    match outcome {
        Ok(None) => Ok(()),
        Ok(Some(fix)) => {
            let fresh = {
                let Some(ElementData::Geolocation(geo)) =
                    engine.states.get_mut(&node).map(|s| &mut s.data)
                else {
                    return Ok(());
                };
                let fresh =
                    geo.pending || (geo.options.watch && geo.last_fix.as_ref() != Some(&fix));
                geo.pending = false;
                geo.last_fix = Some(fix.clone());
                fresh
            };
            if fresh {
                deliver_fix(engine, node, &options, &fix)?;
            }
            Ok(())
        }
        Err(failure) => {
            if let Some(ElementData::Geolocation(geo)) =
                engine.states.get_mut(&node).map(|s| &mut s.data)
            {
                geo.pending = false;
                // A failing provider is reported once, not every flush
                geo.options.watch = false;
            }
            if let Some(container) = engine.container_of(node) {
                if let Some(model) = engine.maps.get_mut(&container.map()) {
                    model.emit_map_event(
                        "locationerror",
                        json!({ "code": failure.code, "message": failure.message }),
                    );
                }
            }
            Ok(())
        }
    }
}

/// Mirror a fix onto the element's attributes and fire `locationfound`.
fn deliver_fix(
    engine: &mut Engine,
    node: NodeId,
    options: &LocateOptions,
    fix: &LocationFix,
) -> Result<(), Error> {
    let bounds = fix.bounds();
    let doc = &mut engine.doc;
    doc.set_attribute(node, "latitude", &fix.position.lat.to_string())?;
    doc.set_attribute(node, "longitude", &fix.position.lng.to_string())?;
    doc.set_attribute(node, "accuracy", &fix.accuracy.to_string())?;
    doc.set_attribute(
        node,
        "bounds",
        &format!(
            "{},{},{},{}",
            bounds.south_west.lat,
            bounds.south_west.lng,
            bounds.north_east.lat,
            bounds.north_east.lng
        ),
    )?;
    doc.set_attribute(
        node,
        "timestamp",
        &fix.timestamp.timestamp_millis().to_string(),
    )?;
    set_optional(doc, node, "altitude", fix.altitude)?;
    set_optional(doc, node, "altitude-accuracy", fix.altitude_accuracy)?;
    set_optional(doc, node, "heading", fix.heading)?;
    set_optional(doc, node, "speed", fix.speed)?;

    let Some(container) = engine.container_of(node) else {
        return Ok(());
    };
    let Some(model) = engine.maps.get_mut(&container.map()) else {
        return Ok(());
    };
    if options.set_view {
        let (width, height) = model.size();
        let max_zoom = options.max_zoom.min(crate::map::ZOOM_CEILING) as u8;
        let zoom = WebMercator::bounds_zoom(&bounds, width, height, max_zoom);
        model.set_view(fix.position, f64::from(zoom));
    }
    model.emit_map_event(
        "locationfound",
        json!({
            "latlng": { "lat": fix.position.lat, "lng": fix.position.lng },
            "bounds": [
                [bounds.south_west.lat, bounds.south_west.lng],
                [bounds.north_east.lat, bounds.north_east.lng],
            ],
            "accuracy": fix.accuracy,
            "altitude": fix.altitude,
            "altitudeAccuracy": fix.altitude_accuracy,
            "heading": fix.heading,
            "speed": fix.speed,
            "timestamp": fix.timestamp.timestamp_millis(),
        }),
    );
    Ok(())
}

fn set_optional(
    doc: &mut Document,
    node: NodeId,
    name: &str,
    value: Option<f64>,
) -> Result<(), Error> {
    match value {
        Some(value) => doc.set_attribute(node, name, &value.to_string()),
        None => doc.remove_attribute(node, name),
    }
}
