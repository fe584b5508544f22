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

//! The geolocation provider seam.
//!
//! The engine never talks to positioning hardware or services itself. An
//! embedder installs a [`Locator`] and geolocation elements poll it; a
//! provider that is still waiting for a fix returns `Ok(None)` and gets
//! polled again on a later flush.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::geo::{LatLng, LatLngBounds};

const EARTH_CIRCUMFERENCE: f64 = 40_075_017.0;

/// Options of a location request.
#[derive(Debug, Clone, PartialEq)]
pub struct LocateOptions {
    /// Keep delivering fixes instead of stopping after the first.
    pub watch: bool,
    /// Move the map view to each fix.
    pub set_view: bool,
    /// Zoom cap when `set_view` pans to a fix.
    pub max_zoom: f64,
    pub timeout_ms: u64,
    pub maximum_age_ms: u64,
    pub enable_high_accuracy: bool,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            watch: false,
            set_view: false,
            max_zoom: f64::INFINITY,
            timeout_ms: 10_000,
            maximum_age_ms: 0,
            enable_high_accuracy: false,
        }
    }
}

/// A successful position fix.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub position: LatLng,
    /// Position accuracy in meters.
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub altitude_accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    /// The area the position is known to lie within, derived from the
    /// accuracy radius.
    #[must_use]
    pub fn bounds(&self) -> LatLngBounds {
        let lat_accuracy = 180.0 * self.accuracy / EARTH_CIRCUMFERENCE;
        let lng_accuracy = lat_accuracy / self.position.lat.to_radians().cos().abs().max(1e-9);
        LatLngBounds::new(
            LatLng::new(
                self.position.lat - lat_accuracy,
                self.position.lng - lng_accuracy,
            ),
            LatLng::new(
                self.position.lat + lat_accuracy,
                self.position.lng + lng_accuracy,
            ),
        )
    }
}

/// A failed position lookup, with the W3C geolocation error codes:
/// 1 permission denied, 2 position unavailable, 3 timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("location error {code}: {message}")]
pub struct LocateFailure {
    pub code: u16,
    pub message: String,
}

impl LocateFailure {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            message: message.into(),
        }
    }
}

/// Source of position fixes.
pub trait Locator {
    /// Poll for a fix. `Ok(None)` means no fix is available yet and the
    /// caller should poll again later.
    fn locate(&mut self, options: &LocateOptions) -> Result<Option<LocationFix>, LocateFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_bounds_centered_on_position() {
        let fix = LocationFix {
            position: LatLng::new(48.85, 2.35),
            accuracy: 120.0,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
            timestamp: Utc::now(),
        };

        let bounds = fix.bounds();
        let center = bounds.center();
        assert!((center.lat - 48.85).abs() < 1e-9);
        assert!((center.lng - 2.35).abs() < 1e-9);
        // Longitude span widens away from the equator
        let lat_span = bounds.north_east.lat - bounds.south_west.lat;
        let lng_span = bounds.north_east.lng - bounds.south_west.lng;
        assert!(lng_span > lat_span);
    }

    #[test]
    fn test_default_options() {
        let options = LocateOptions::default();
        assert!(!options.watch);
        assert_eq!(options.timeout_ms, 10_000);
        assert!(options.max_zoom.is_infinite());
    }
}
