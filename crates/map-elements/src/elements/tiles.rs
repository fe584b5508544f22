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

//! Tile layer elements: `leaflet-tilelayer` and `leaflet-tilelayer-wms`.
//!
//! Most tile options are construction-only. After the layer exists only
//! `opacity`, `z-index` and `url` writes take effect; everything else
//! requires recreating the element.

use crate::dom::{Document, NodeId, Tag};
use crate::error::Error;
use crate::map::events::EventTarget;
use crate::map::layer::{Layer, LayerKind, TileLayer};
use crate::map::tile::{clean_url, parse_subdomains, TileOptions, WmsOptions};

use super::{Container, Engine, Feature};

/// Events re-dispatched on tile layer elements.
const TILE_EVENTS: &[&str] = &["loading", "load", "tileloadstart", "tileload", "tileunload"];

/// Read tile options from the element's attributes.
///
/// Plain layers treat `url` as a `{z}/{x}/{y}` template and decode
/// percent-encoded braces; WMS endpoints are passed through untouched.
/// Attribution combines inline markup with the `attribution` attribute.
pub(super) fn tile_options_from_attrs(doc: &Document, node: NodeId, wms: bool) -> TileOptions {
    let mut options = TileOptions::default();

    if wms {
        options.url = doc.attr(node, "url").unwrap_or_default().to_string();
        options.wms = Some(WmsOptions {
            layers: doc.attr(node, "layers").unwrap_or_default().to_string(),
            styles: doc.attr(node, "styles").unwrap_or_default().to_string(),
            format: doc
                .attr(node, "format")
                .map_or_else(|| "image/jpeg".to_string(), ToString::to_string),
            transparent: doc.attr_bool(node, "transparent"),
            version: doc
                .attr(node, "version")
                .map_or_else(|| "1.1.1".to_string(), ToString::to_string),
            crs: doc.attr(node, "crs").map(ToString::to_string),
        });
    } else if let Some(url) = doc.attr(node, "url") {
        options.url = clean_url(url);
    }

    if let Some(min_zoom) = doc.attr_f64(node, "min-zoom") {
        options.min_zoom = min_zoom as u8;
    }
    if let Some(max_zoom) = doc.attr_f64(node, "max-zoom") {
        options.max_zoom = max_zoom as u8;
    }
    options.max_native_zoom = doc.attr_f64(node, "max-native-zoom").map(|z| z as u8);
    if let Some(tile_size) = doc.attr_f64(node, "tile-size") {
        options.tile_size = tile_size as u32;
    }
    if let Some(subdomains) = doc.attr(node, "subdomains") {
        options.subdomains = parse_subdomains(subdomains);
    }
    options.error_tile_url = doc.attr(node, "error-tile-url").map(ToString::to_string);
    options.tms = doc.attr_bool(node, "tms");
    options.continuous_world = doc.attr_bool(node, "continuous-world");
    options.no_wrap = doc.attr_bool(node, "nowrap");
    if let Some(offset) = doc.attr_f64(node, "zoom-offset") {
        options.zoom_offset = offset as i16;
    }
    options.zoom_reverse = doc.attr_bool(node, "zoom-reverse");
    if let Some(opacity) = doc.attr_f64(node, "opacity") {
        options.opacity = opacity;
    }
    options.z_index = doc.attr_f64(node, "z-index").map(|z| z as i32);
    options.detect_retina = doc.attr_bool(node, "detect-retina");

    let attribution = format!(
        "{}{}",
        doc.inner_markup(node),
        doc.attr(node, "attribution").unwrap_or_default()
    );
    let attribution = attribution.trim();
    if !attribution.is_empty() {
        options.attribution = Some(attribution.to_string());
    }

    options
}

pub(super) fn create(
    engine: &mut Engine,
    node: NodeId,
    container: Container,
    wms: bool,
) -> Result<(), Error> {
    let options = tile_options_from_attrs(&engine.doc, node, wms);
    let Some(layer) = engine.place_layer(
        node,
        container,
        Layer::new(LayerKind::Tile(TileLayer { options })),
    ) else {
        return Ok(());
    };
    engine.forward_events(node, container.map(), EventTarget::Layer(layer), TILE_EVENTS);
    Ok(())
}

pub(super) fn attribute_changed(
    engine: &mut Engine,
    node: NodeId,
    tag: Tag,
    name: &str,
) -> Result<(), Error> {
    let Some(Feature::Layer { map, layer }) = engine.feature_of(node) else {
        return Ok(());
    };
    let Some(model) = engine.maps.get_mut(&map) else {
        return Ok(());
    };
    match name {
        "opacity" => {
            if let Some(opacity) = engine.doc.attr_f64(node, "opacity") {
                model.set_tile_opacity(layer, opacity);
            }
        }
        "z-index" => {
            if let Some(z_index) = engine.doc.attr_f64(node, "z-index") {
                model.set_tile_z_index(layer, z_index as i32);
            }
        }
        "url" => {
            if let Some(url) = engine.doc.attr(node, "url") {
                let url = if tag == Tag::TileLayerWms {
                    url.to_string()
                } else {
                    clean_url(url)
                };
                model.set_tile_url(layer, url);
            }
        }
        // All other tile options are fixed at construction
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::tile::OSM_TILE_URL;

    fn parse(markup: &str) -> (Document, NodeId) {
        let doc = Document::from_markup(markup).unwrap();
        let node = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| {
                matches!(doc.tag(n), Some(Tag::TileLayer | Tag::TileLayerWms))
            })
            .unwrap();
        (doc, node)
    }

    #[test]
    fn test_plain_defaults_to_osm() {
        let (doc, node) = parse("<leaflet-tilelayer></leaflet-tilelayer>");
        let options = tile_options_from_attrs(&doc, node, false);
        assert_eq!(options.url, OSM_TILE_URL);
        assert_eq!(options.max_zoom, 18);
        assert_eq!(options.tile_size, 256);
        assert_eq!(options.subdomains, vec!["a", "b", "c"]);
        assert!(options.wms.is_none());
        assert!(options.attribution.is_none());
    }

    #[test]
    fn test_plain_url_is_cleaned() {
        let (doc, node) = parse(
            "<leaflet-tilelayer url=\"https://tiles.example/%7Bz%7D/%7Bx%7D/%7By%7D.png\">\
             </leaflet-tilelayer>",
        );
        let options = tile_options_from_attrs(&doc, node, false);
        assert_eq!(options.url, "https://tiles.example/{z}/{x}/{y}.png");
    }

    #[test]
    fn test_wms_url_is_not_cleaned() {
        let (doc, node) = parse(
            "<leaflet-tilelayer-wms url=\"https://wms.example/map?foo=%7Bbar%7D\" \
             layers=\"radar\" transparent version=\"1.3.0\"></leaflet-tilelayer-wms>",
        );
        let options = tile_options_from_attrs(&doc, node, true);
        assert_eq!(options.url, "https://wms.example/map?foo=%7Bbar%7D");
        let wms = options.wms.unwrap();
        assert_eq!(wms.layers, "radar");
        assert_eq!(wms.styles, "");
        assert_eq!(wms.format, "image/jpeg");
        assert!(wms.transparent);
        assert_eq!(wms.version, "1.3.0");
    }

    #[test]
    fn test_numeric_and_flag_attributes() {
        let (doc, node) = parse(
            "<leaflet-tilelayer min-zoom=\"2\" max-zoom=\"12\" max-native-zoom=\"10\" \
             tile-size=\"512\" subdomains=\"t1,t2\" zoom-offset=\"-1\" zoom-reverse \
             tms nowrap opacity=\"0.5\" z-index=\"7\" detect-retina></leaflet-tilelayer>",
        );
        let options = tile_options_from_attrs(&doc, node, false);
        assert_eq!(options.min_zoom, 2);
        assert_eq!(options.max_zoom, 12);
        assert_eq!(options.max_native_zoom, Some(10));
        assert_eq!(options.tile_size, 512);
        assert_eq!(options.subdomains, vec!["t1", "t2"]);
        assert_eq!(options.zoom_offset, -1);
        assert!(options.zoom_reverse);
        assert!(options.tms);
        assert!(options.no_wrap);
        assert!((options.opacity - 0.5).abs() < f64::EPSILON);
        assert_eq!(options.z_index, Some(7));
        assert!(options.detect_retina);
    }

    #[test]
    fn test_attribution_combines_markup_and_attribute() {
        let (doc, node) = parse(
            "<leaflet-tilelayer attribution=\" and friends\">\
             <a href=\"https://osm.org\">OSM</a></leaflet-tilelayer>",
        );
        let options = tile_options_from_attrs(&doc, node, false);
        assert_eq!(
            options.attribution.as_deref(),
            Some("<a href=\"https://osm.org\">OSM</a> and friends")
        );
    }
}
