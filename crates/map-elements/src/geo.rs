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

//! Geographic primitives: [`LatLng`], [`LatLngBounds`], and Web Mercator
//! projection helpers shared by the map model and by embedders that render it.

use serde::{Deserialize, Serialize};

// Meters per degree of latitude (Earth circumference / 360)
const METERS_PER_DEGREE: f64 = 111_319.49;

/// Equatorial radius used by the EPSG:3857 projection, in meters.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Highest latitude representable in Web Mercator.
pub const MAX_LATITUDE: f64 = 85.051_128;

/// A geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A rectangular geographic area, tracked as south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    /// Create bounds from two corners in any order.
    #[must_use]
    pub fn new(a: LatLng, b: LatLng) -> Self {
        Self {
            south_west: LatLng::new(a.lat.min(b.lat), a.lng.min(b.lng)),
            north_east: LatLng::new(a.lat.max(b.lat), a.lng.max(b.lng)),
        }
    }

    /// Degenerate bounds containing a single point.
    #[must_use]
    pub fn from_point(p: LatLng) -> Self {
        Self {
            south_west: p,
            north_east: p,
        }
    }

    /// Bounds of a circle given its center and radius in meters.
    ///
    /// Uses the flat-earth approximation that is standard for small radii.
    #[must_use]
    pub fn from_circle(center: LatLng, radius_meters: f64) -> Self {
        let d_lat = radius_meters / METERS_PER_DEGREE;
        let cos_lat = center.lat.to_radians().cos().max(1e-9);
        let d_lng = radius_meters / (METERS_PER_DEGREE * cos_lat);
        Self {
            south_west: LatLng::new(center.lat - d_lat, center.lng - d_lng),
            north_east: LatLng::new(center.lat + d_lat, center.lng + d_lng),
        }
    }

    /// Bounds of a point sequence, or `None` for an empty sequence.
    #[must_use]
    pub fn from_points(points: &[LatLng]) -> Option<Self> {
        let mut iter = points.iter();
        let first = iter.next()?;
        let mut bounds = Self::from_point(*first);
        for p in iter {
            bounds.extend(*p);
        }
        Some(bounds)
    }

    /// The whole Web Mercator world.
    #[must_use]
    pub fn world() -> Self {
        Self {
            south_west: LatLng::new(-MAX_LATITUDE, -180.0),
            north_east: LatLng::new(MAX_LATITUDE, 180.0),
        }
    }

    /// Grow the bounds to include a point.
    pub fn extend(&mut self, p: LatLng) {
        self.south_west.lat = self.south_west.lat.min(p.lat);
        self.south_west.lng = self.south_west.lng.min(p.lng);
        self.north_east.lat = self.north_east.lat.max(p.lat);
        self.north_east.lng = self.north_east.lng.max(p.lng);
    }

    /// Grow the bounds to include another bounds.
    pub fn extend_bounds(&mut self, other: &Self) {
        self.extend(other.south_west);
        self.extend(other.north_east);
    }

    /// Union of an iterator of bounds, or `None` when the iterator is empty.
    #[must_use]
    pub fn union<I: IntoIterator<Item = Self>>(bounds: I) -> Option<Self> {
        let mut iter = bounds.into_iter();
        let mut result = iter.next()?;
        for b in iter {
            result.extend_bounds(&b);
        }
        Some(result)
    }

    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }

    #[must_use]
    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.south_west.lat
            && p.lat <= self.north_east.lat
            && p.lng >= self.south_west.lng
            && p.lng <= self.north_east.lng
    }
}

/// Web Mercator projection utilities.
///
/// Coordinates are in tile units at the given zoom: one unit equals one
/// 256-pixel tile, the world is `2^zoom` units wide.
#[derive(Debug)]
pub struct WebMercator;

impl WebMercator {
    /// Convert latitude to Web Mercator Y tile coordinate.
    #[must_use]
    pub fn lat_to_y(lat: f64, zoom: u8) -> f64 {
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let lat_rad = lat.to_radians();
        let n = 2_f64.powi(i32::from(zoom));
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0;
        y * n
    }

    /// Convert longitude to Web Mercator X tile coordinate.
    #[must_use]
    pub fn lon_to_x(lon: f64, zoom: u8) -> f64 {
        let n = 2_f64.powi(i32::from(zoom));
        ((lon + 180.0) / 360.0) * n
    }

    /// Convert a tile Y coordinate back to latitude.
    #[must_use]
    pub fn tile_to_lat(y: f64, zoom: u8) -> f64 {
        let n = 2_f64.powi(i32::from(zoom));
        let lat_rad = ((std::f64::consts::PI * (1.0 - 2.0 * y / n)).sinh()).atan();
        lat_rad.to_degrees()
    }

    /// Convert a tile X coordinate back to longitude.
    #[must_use]
    pub fn tile_to_lon(x: f64, zoom: u8) -> f64 {
        let n = 2_f64.powi(i32::from(zoom));
        x / n * 360.0 - 180.0
    }

    /// Project a position to EPSG:3857 meters, as WMS bounding boxes expect.
    #[must_use]
    pub fn to_meters(lat: f64, lon: f64) -> (f64, f64) {
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let x = EARTH_RADIUS * lon.to_radians();
        let y = EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
        (x, y)
    }

    /// Ground resolution in meters per pixel at a latitude and fractional
    /// zoom, assuming 256-pixel tiles.
    #[must_use]
    pub fn meters_per_pixel(lat: f64, zoom: f64) -> f64 {
        let circumference = 2.0 * std::f64::consts::PI * EARTH_RADIUS;
        circumference * lat.to_radians().cos().abs() / (256.0 * 2_f64.powf(zoom))
    }

    /// The highest integer zoom at which `bounds` fits into a viewport of
    /// `width` x `height` pixels with 256-pixel tiles.
    #[must_use]
    pub fn bounds_zoom(bounds: &LatLngBounds, width: f32, height: f32, max_zoom: u8) -> u8 {
        let span_x = Self::lon_to_x(bounds.north_east.lng, 0) - Self::lon_to_x(bounds.south_west.lng, 0);
        let span_y = Self::lat_to_y(bounds.south_west.lat, 0) - Self::lat_to_y(bounds.north_east.lat, 0);

        let mut zoom = max_zoom;
        for z in 0..=max_zoom {
            let scale = 2_f64.powi(i32::from(z)) * 256.0;
            if span_x * scale > f64::from(width) || span_y * scale > f64::from(height) {
                zoom = z.saturating_sub(1);
                break;
            }
            zoom = z;
        }
        zoom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_extend() {
        let mut bounds = LatLngBounds::from_point(LatLng::new(51.5, -0.1));
        bounds.extend(LatLng::new(48.85, 2.35));

        assert!((bounds.south_west.lat - 48.85).abs() < 1e-9);
        assert!((bounds.north_east.lat - 51.5).abs() < 1e-9);
        assert!((bounds.south_west.lng - (-0.1)).abs() < 1e-9);
        assert!((bounds.north_east.lng - 2.35).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_union() {
        let a = LatLngBounds::new(LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0));
        let b = LatLngBounds::new(LatLng::new(-2.0, 0.5), LatLng::new(0.5, 3.0));
        let u = LatLngBounds::union([a, b]).unwrap();

        assert_eq!(u.south_west, LatLng::new(-2.0, 0.0));
        assert_eq!(u.north_east, LatLng::new(1.0, 3.0));
        assert!(LatLngBounds::union(std::iter::empty()).is_none());
    }

    #[test]
    fn test_circle_bounds_symmetric() {
        let center = LatLng::new(12.93, 77.58);
        let bounds = LatLngBounds::from_circle(center, 2000.0);
        let c = bounds.center();

        assert!((c.lat - center.lat).abs() < 1e-9);
        assert!((c.lng - center.lng).abs() < 1e-9);
        assert!(bounds.north_east.lat > center.lat);
        assert!(bounds.north_east.lng > center.lng);
    }

    #[test]
    fn test_mercator_roundtrip() {
        let lat = 37.7749;
        let lon = -122.4194;
        let zoom = 10;

        let x = WebMercator::lon_to_x(lon, zoom);
        let y = WebMercator::lat_to_y(lat, zoom);

        assert!((WebMercator::tile_to_lon(x, zoom) - lon).abs() < 1e-9);
        assert!((WebMercator::tile_to_lat(y, zoom) - lat).abs() < 1e-6);
    }

    #[test]
    fn test_origin_projects_to_zero_meters() {
        let (x, y) = WebMercator::to_meters(0.0, 0.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_meters_per_pixel_halves_per_zoom() {
        let z5 = WebMercator::meters_per_pixel(0.0, 5.0);
        let z6 = WebMercator::meters_per_pixel(0.0, 6.0);
        assert!((z5 / z6 - 2.0).abs() < 1e-9);
        // Zoom 0 at the equator is the full circumference over one tile
        let z0 = WebMercator::meters_per_pixel(0.0, 0.0);
        assert!((z0 - 156_543.03).abs() < 0.01);
    }

    #[test]
    fn test_bounds_zoom_fits() {
        // A city-sized bounds should land on a mid zoom for a typical window
        let bounds = LatLngBounds::new(LatLng::new(51.45, -0.2), LatLng::new(51.55, 0.0));
        let zoom = WebMercator::bounds_zoom(&bounds, 800.0, 600.0, 18);
        assert!((9..=13).contains(&zoom), "unexpected zoom {zoom}");

        // The world never fits above zoom ~2 in a small window
        let world = LatLngBounds::world();
        assert!(WebMercator::bounds_zoom(&world, 512.0, 512.0, 18) <= 2);
    }
}
