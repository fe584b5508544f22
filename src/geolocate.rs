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

//! IP-based geolocation provider.
//!
//! Implements the engine's [`Locator`] seam with a best-effort IP lookup:
//! ipapi.co first, ip-api.com as the fallback. The fetch runs on a
//! background thread so `locate` never blocks a frame; until it completes
//! the provider answers `Ok(None)` and gets polled again on a later flush.

use chrono::Utc;
use log::{debug, info, warn};
use map_elements::{LatLng, LocateFailure, LocateOptions, LocationFix, Locator};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// City-level accuracy claimed for an IP fix, in meters
const IP_ACCURACY_METERS: f64 = 25_000.0;

enum FetchState {
    Idle,
    Pending,
    Done(Result<LocationFix, LocateFailure>),
}

pub struct IpLocator {
    state: Arc<Mutex<FetchState>>,
    /// Built once at construction. The fix never changes between polls, so
    /// watch requests settle after the first delivery.
    override_fix: Option<LocationFix>,
}

impl IpLocator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FetchState::Idle)),
            override_fix: None,
        }
    }

    /// Skip the network entirely and always report the configured position
    pub fn with_override(latitude: f64, longitude: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(FetchState::Idle)),
            override_fix: Some(fix_at(latitude, longitude)),
        }
    }
}

impl Default for IpLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Locator for IpLocator {
    fn locate(&mut self, options: &LocateOptions) -> Result<Option<LocationFix>, LocateFailure> {
        if let Some(fix) = &self.override_fix {
            return Ok(Some(fix.clone()));
        }

        let mut state = self.state.lock().unwrap();
        match &*state {
            FetchState::Idle => {}
            FetchState::Pending => return Ok(None),
            // An IP fix does not move, so the stored result answers every
            // later poll as-is
            FetchState::Done(Ok(fix)) => return Ok(Some(fix.clone())),
            FetchState::Done(Err(failure)) => return Err(failure.clone()),
        }

        *state = FetchState::Pending;
        let shared = self.state.clone();
        let timeout = Duration::from_millis(options.timeout_ms);
        std::thread::spawn(move || {
            let result = fetch_ip_location(timeout);
            *shared.lock().unwrap() = FetchState::Done(result);
        });
        Ok(None)
    }
}

fn fix_at(latitude: f64, longitude: f64) -> LocationFix {
    LocationFix {
        position: LatLng::new(latitude, longitude),
        accuracy: IP_ACCURACY_METERS,
        altitude: None,
        altitude_accuracy: None,
        heading: None,
        speed: None,
        timestamp: Utc::now(),
    }
}

fn fetch_ip_location(timeout: Duration) -> Result<LocationFix, LocateFailure> {
    debug!("Fetching current location...");

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LocateFailure::unavailable(e.to_string()))?;

    // Try ipapi.co first
    if let Some((lat, lon)) = query_json(&client, "https://ipapi.co/json/", "latitude", "longitude")
    {
        info!("Location found via ipapi.co: {}, {}", lat, lon);
        return Ok(fix_at(lat, lon));
    }

    // Fallback to ip-api.com (no API key needed)
    if let Some((lat, lon)) = query_json(&client, "http://ip-api.com/json/", "lat", "lon") {
        info!("Location found via ip-api.com: {}, {}", lat, lon);
        return Ok(fix_at(lat, lon));
    }

    warn!("Failed to fetch location from all sources");
    Err(LocateFailure::unavailable("IP geolocation lookup failed"))
}

fn query_json(
    client: &reqwest::blocking::Client,
    url: &str,
    lat_key: &str,
    lon_key: &str,
) -> Option<(f64, f64)> {
    let response = client.get(url).send().ok()?;
    let value: serde_json::Value = response.json().ok()?;
    let lat = value.get(lat_key)?.as_f64()?;
    let lon = value.get(lon_key)?.as_f64()?;
    Some((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_short_circuits_network() {
        let mut locator = IpLocator::with_override(40.7128, -74.006);

        let fix = locator.locate(&LocateOptions::default()).unwrap().unwrap();
        assert_eq!(fix.position, LatLng::new(40.7128, -74.006));
        assert_eq!(fix.accuracy, IP_ACCURACY_METERS);

        // Identical on every poll, so a watch request stays quiet after
        // the first delivery
        let again = locator.locate(&LocateOptions::default()).unwrap().unwrap();
        assert_eq!(fix, again);
    }

    #[test]
    fn test_first_poll_is_pending() {
        let mut locator = IpLocator::new();
        let options = LocateOptions {
            timeout_ms: 1,
            ..LocateOptions::default()
        };

        // The fetch thread has only just started; the first answer is
        // always "not yet"
        assert_eq!(locator.locate(&options), Ok(None));
    }
}
