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

//! Tile layer configuration and URL templating.
//!
//! [`TileOptions`] captures everything a tile layer is constructed with.
//! After construction only `opacity` and `z_index` are updated in place;
//! the remaining options are fixed for the lifetime of the layer.

/// Default basemap URL template (OpenStreetMap).
pub const OSM_TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Attribution for the default basemap.
pub const OSM_ATTRIBUTION: &str =
    "Map data &copy; <a href=\"https://openstreetmap.org\">OpenStreetMap</a> contributors, \
     <a href=\"https://creativecommons.org/licenses/by-sa/2.0/\">CC-BY-SA</a>";

/// WMS request parameters for a WMS tile layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsOptions {
    pub layers: String,
    pub styles: String,
    pub format: String,
    pub transparent: bool,
    pub version: String,
    pub crs: Option<String>,
}

impl Default for WmsOptions {
    fn default() -> Self {
        Self {
            layers: String::new(),
            styles: String::new(),
            format: "image/jpeg".to_string(),
            transparent: false,
            version: "1.1.1".to_string(),
            crs: None,
        }
    }
}

impl WmsOptions {
    /// The fixed query parameters of a `GetMap` request.
    ///
    /// The caller appends `width`, `height` and `bbox` for the tile being
    /// fetched. WMS 1.3.0 renamed the projection parameter from `srs` to
    /// `crs`, which is reflected here.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let crs_key = if self.version.as_str() >= "1.3" { "crs" } else { "srs" };
        vec![
            ("service", "WMS".to_string()),
            ("request", "GetMap".to_string()),
            ("version", self.version.clone()),
            ("layers", self.layers.clone()),
            ("styles", self.styles.clone()),
            ("format", self.format.clone()),
            ("transparent", self.transparent.to_string()),
            (crs_key, self.crs.clone().unwrap_or_else(|| "EPSG:3857".to_string())),
        ]
    }
}

/// Construction options for a tile layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TileOptions {
    pub url: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub max_native_zoom: Option<u8>,
    pub tile_size: u32,
    pub subdomains: Vec<String>,
    pub error_tile_url: Option<String>,
    pub attribution: Option<String>,
    pub tms: bool,
    pub continuous_world: bool,
    pub no_wrap: bool,
    pub zoom_offset: i16,
    pub zoom_reverse: bool,
    pub opacity: f64,
    pub z_index: Option<i32>,
    pub detect_retina: bool,
    pub wms: Option<WmsOptions>,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            url: OSM_TILE_URL.to_string(),
            min_zoom: 0,
            max_zoom: 18,
            max_native_zoom: None,
            tile_size: 256,
            subdomains: parse_subdomains("abc"),
            error_tile_url: None,
            attribution: None,
            tms: false,
            continuous_world: false,
            no_wrap: false,
            zoom_offset: 0,
            zoom_reverse: false,
            opacity: 1.0,
            z_index: None,
            detect_retina: false,
            wms: None,
        }
    }
}

/// Parse a subdomains attribute: comma separated tokens, or single letters.
#[must_use]
pub fn parse_subdomains(raw: &str) -> Vec<String> {
    if raw.contains(',') {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    } else {
        raw.chars().map(|c| c.to_string()).collect()
    }
}

/// Decode percent-encoded template braces some editors produce in URLs.
#[must_use]
pub fn clean_url(raw: &str) -> String {
    raw.replace("%7B", "{").replace("%7D", "}")
}

impl TileOptions {
    /// Default OSM basemap options, used when a map has no declared layer.
    #[must_use]
    pub fn default_basemap() -> Self {
        Self {
            attribution: Some(OSM_ATTRIBUTION.to_string()),
            ..Self::default()
        }
    }

    /// Subdomain for a tile, rotating deterministically over the pool.
    #[must_use]
    pub fn subdomain_for(&self, x: u32, y: u32) -> &str {
        if self.subdomains.is_empty() {
            return "";
        }
        let index = ((x + y) as usize) % self.subdomains.len();
        &self.subdomains[index]
    }

    /// Map a display zoom to the zoom used in tile URLs, applying
    /// `zoom_reverse`, `zoom_offset` and the native zoom cap.
    #[must_use]
    pub fn url_zoom(&self, display_zoom: u8) -> u8 {
        let mut zoom = i16::from(display_zoom.clamp(self.min_zoom, self.max_zoom));
        if self.zoom_reverse {
            zoom = i16::from(self.max_zoom) - zoom;
        }
        zoom += self.zoom_offset;
        let zoom = u8::try_from(zoom.max(0)).unwrap_or(0);
        let zoom = match self.max_native_zoom {
            Some(native) => zoom.min(native),
            None => zoom,
        };
        zoom.min(30)
    }

    /// Expand the URL template for one tile.
    ///
    /// `zoom` is the display zoom; the URL zoom is derived via
    /// [`Self::url_zoom`]. TMS layers flip the Y axis.
    #[must_use]
    pub fn tile_url(&self, x: u32, y: u32, zoom: u8) -> String {
        let z = self.url_zoom(zoom);
        // Subdomain rotation uses the unflipped coordinate
        let subdomain = self.subdomain_for(x, y);
        let y = if self.tms { (1_u32 << z) - 1 - y } else { y };
        let retina = if self.detect_retina { "@2x" } else { "" };

        self.url
            .replace("{s}", subdomain)
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
            .replace("{r}", retina)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_url_decodes_braces() {
        assert_eq!(
            clean_url("https://tiles.example/%7Bz%7D/%7Bx%7D/%7By%7D.png"),
            "https://tiles.example/{z}/{x}/{y}.png"
        );
        assert_eq!(clean_url(OSM_TILE_URL), OSM_TILE_URL);
    }

    #[test]
    fn test_subdomain_rotation() {
        let options = TileOptions::default();
        assert_eq!(options.subdomain_for(0, 0), "a");
        assert_eq!(options.subdomain_for(1, 0), "b");
        assert_eq!(options.subdomain_for(1, 1), "c");
        assert_eq!(options.subdomain_for(2, 1), "a");
    }

    #[test]
    fn test_parse_subdomains_forms() {
        assert_eq!(parse_subdomains("abcd"), vec!["a", "b", "c", "d"]);
        assert_eq!(parse_subdomains("t1,t2"), vec!["t1", "t2"]);
    }

    #[test]
    fn test_tile_url_substitution() {
        let options = TileOptions::default();
        assert_eq!(
            options.tile_url(2, 3, 5),
            "https://b.tile.openstreetmap.org/5/2/3.png"
        );
    }

    #[test]
    fn test_tile_url_tms_flips_y() {
        let options = TileOptions {
            url: "https://tiles.example/{z}/{x}/{y}.png".to_string(),
            tms: true,
            ..Default::default()
        };
        // At zoom 3 the world is 8 tiles tall, so y=1 becomes 6
        assert_eq!(options.tile_url(0, 1, 3), "https://tiles.example/3/0/6.png");
    }

    #[test]
    fn test_tile_url_retina_suffix() {
        let options = TileOptions {
            url: "https://tiles.example/{z}/{x}/{y}{r}.png".to_string(),
            detect_retina: true,
            ..Default::default()
        };
        assert_eq!(options.tile_url(0, 0, 1), "https://tiles.example/1/0/0@2x.png");
    }

    #[test]
    fn test_url_zoom_reverse_and_offset() {
        let options = TileOptions {
            zoom_reverse: true,
            zoom_offset: 1,
            max_zoom: 10,
            ..Default::default()
        };
        // reverse: 10 - 4 = 6, offset: +1 = 7
        assert_eq!(options.url_zoom(4), 7);

        let capped = TileOptions {
            max_native_zoom: Some(8),
            ..Default::default()
        };
        assert_eq!(capped.url_zoom(12), 8);
    }

    #[test]
    fn test_wms_query_pairs() {
        let wms = WmsOptions {
            layers: "radar".to_string(),
            transparent: true,
            ..Default::default()
        };
        let pairs = wms.query_pairs();

        assert!(pairs.contains(&("service", "WMS".to_string())));
        assert!(pairs.contains(&("layers", "radar".to_string())));
        assert!(pairs.contains(&("transparent", "true".to_string())));
        // 1.1.1 uses srs, not crs
        assert!(pairs.iter().any(|(k, v)| *k == "srs" && v == "EPSG:3857"));

        let modern = WmsOptions {
            version: "1.3.0".to_string(),
            ..Default::default()
        };
        assert!(modern.query_pairs().iter().any(|(k, _)| *k == "crs"));
    }
}
