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

//! Tile source bridging engine tile options to the walkers source trait.

use walkers::sources::{Attribution, TileSource};
use walkers::TileId;

use map_elements::map::tile::{TileOptions, WmsOptions};

use map_elements::geo::WebMercator;

/// Tile source driven by the URL template and options of a declared layer.
///
/// Plain layers expand the `{s}`/`{z}`/`{x}`/`{y}`/`{r}` template; WMS
/// layers assemble a `GetMap` request with the tile's EPSG:3857 bounding
/// box.
pub struct TemplateSource {
    options: TileOptions,
}

impl TemplateSource {
    pub fn new(options: TileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TileOptions {
        &self.options
    }

    fn wms_url(&self, wms: &WmsOptions, tile_id: TileId) -> String {
        // The bounding box comes from the displayed tile grid, so the
        // URL zoom mapping does not apply here.
        let west = WebMercator::tile_to_lon(f64::from(tile_id.x), tile_id.zoom);
        let east = WebMercator::tile_to_lon(f64::from(tile_id.x + 1), tile_id.zoom);
        let north = WebMercator::tile_to_lat(f64::from(tile_id.y), tile_id.zoom);
        let south = WebMercator::tile_to_lat(f64::from(tile_id.y + 1), tile_id.zoom);
        let (min_x, min_y) = WebMercator::to_meters(south, west);
        let (max_x, max_y) = WebMercator::to_meters(north, east);

        let size = self.options.tile_size;
        let mut pairs = wms.query_pairs();
        pairs.push(("width", size.to_string()));
        pairs.push(("height", size.to_string()));
        pairs.push(("bbox", format!("{min_x},{min_y},{max_x},{max_y}")));

        let query = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.options.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.options.url, separator, query)
    }
}

impl TileSource for TemplateSource {
    fn tile_url(&self, tile_id: TileId) -> String {
        match &self.options.wms {
            Some(wms) => self.wms_url(wms, tile_id),
            None => self.options.tile_url(tile_id.x, tile_id.y, tile_id.zoom),
        }
    }

    fn attribution(&self) -> Attribution {
        // The attribution declared in the markup is painted by the app;
        // this is the source-level fallback walkers asks for.
        Attribution {
            text: "© OpenStreetMap contributors",
            url: "https://www.openstreetmap.org/copyright",
            logo_light: None,
            logo_dark: None,
        }
    }

    // Use default implementations for tile_size() and max_zoom(); the
    // manager reads the per-layer values from options() directly.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_template_expansion() {
        let source = TemplateSource::new(TileOptions::default());
        let url = source.tile_url(TileId { x: 2, y: 3, zoom: 5 });
        assert_eq!(url, "https://b.tile.openstreetmap.org/5/2/3.png");
    }

    #[test]
    fn test_wms_request_assembly() {
        let options = TileOptions {
            url: "https://wms.example/service".to_string(),
            wms: Some(WmsOptions {
                layers: "radar".to_string(),
                transparent: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let source = TemplateSource::new(options);
        let url = source.tile_url(TileId { x: 0, y: 0, zoom: 1 });

        assert!(url.starts_with("https://wms.example/service?"));
        assert!(url.contains("service=WMS"));
        assert!(url.contains("request=GetMap"));
        assert!(url.contains("layers=radar"));
        assert!(url.contains("transparent=true"));
        assert!(url.contains("width=256"));
        assert!(url.contains("srs=EPSG:3857"));
        // Tile (0,0) at zoom 1 is the north-west world quadrant
        let bbox = url.split("bbox=").nth(1).unwrap();
        let parts: Vec<f64> = bbox.split(',').map(|p| p.parse().unwrap()).collect();
        assert!(parts[0] < 0.0 && parts[1].abs() < 1e-6);
        assert!(parts[2].abs() < 1e-6 && parts[3] > 0.0);
    }

    #[test]
    fn test_wms_appends_to_existing_query() {
        let options = TileOptions {
            url: "https://wms.example/service?map=base".to_string(),
            wms: Some(WmsOptions::default()),
            ..Default::default()
        };
        let source = TemplateSource::new(options);
        let url = source.tile_url(TileId { x: 0, y: 0, zoom: 0 });
        assert!(url.starts_with("https://wms.example/service?map=base&service=WMS"));
    }
}
