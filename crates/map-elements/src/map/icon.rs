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

//! Marker icon definitions.
//!
//! An icon is either the built-in default pin, an image icon described by
//! [`IconOptions`], or an HTML div icon described by [`DivIconOptions`].
//! Image icons can also be parsed from an inline JSON option object using
//! the camel-cased option names the wrapped library popularized.

use serde::Deserialize;

/// Options for an image icon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IconOptions {
    pub icon_url: Option<String>,
    pub icon_retina_url: Option<String>,
    pub icon_size: Option<(f64, f64)>,
    pub icon_anchor: Option<(f64, f64)>,
    pub shadow_url: Option<String>,
    pub shadow_retina_url: Option<String>,
    pub shadow_size: Option<(f64, f64)>,
    pub shadow_anchor: Option<(f64, f64)>,
    pub popup_anchor: Option<(f64, f64)>,
    pub class_name: String,
}

/// Options for a div icon, whose body is arbitrary markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DivIconOptions {
    pub icon_size: Option<(f64, f64)>,
    pub icon_anchor: Option<(f64, f64)>,
    pub class_name: String,
    pub html: String,
}

/// A resolved marker icon.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Icon {
    /// The library default pin.
    #[default]
    Default,
    Image(IconOptions),
    Div(DivIconOptions),
}

// Inline `icon` attribute JSON, camelCase per the wrapped library
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIconOptions {
    icon_url: Option<String>,
    icon_retina_url: Option<String>,
    icon_size: Option<[f64; 2]>,
    icon_anchor: Option<[f64; 2]>,
    shadow_url: Option<String>,
    shadow_retina_url: Option<String>,
    shadow_size: Option<[f64; 2]>,
    shadow_anchor: Option<[f64; 2]>,
    popup_anchor: Option<[f64; 2]>,
    class_name: Option<String>,
}

fn pair(raw: Option<[f64; 2]>) -> Option<(f64, f64)> {
    raw.map(|[a, b]| (a, b))
}

impl Icon {
    /// Parse an inline JSON icon option object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawIconOptions = serde_json::from_str(json)?;
        Ok(Self::Image(IconOptions {
            icon_url: raw.icon_url,
            icon_retina_url: raw.icon_retina_url,
            icon_size: pair(raw.icon_size),
            icon_anchor: pair(raw.icon_anchor),
            shadow_url: raw.shadow_url,
            shadow_retina_url: raw.shadow_retina_url,
            shadow_size: pair(raw.shadow_size),
            shadow_anchor: pair(raw.shadow_anchor),
            popup_anchor: pair(raw.popup_anchor),
            class_name: raw.class_name.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_from_json() {
        let icon = Icon::from_json(
            r#"{"iconUrl": "pin.png", "iconSize": [25, 41], "iconAnchor": [12, 41]}"#,
        )
        .unwrap();

        let Icon::Image(options) = icon else {
            panic!("expected image icon");
        };
        assert_eq!(options.icon_url.as_deref(), Some("pin.png"));
        assert_eq!(options.icon_size, Some((25.0, 41.0)));
        assert_eq!(options.icon_anchor, Some((12.0, 41.0)));
        assert!(options.shadow_url.is_none());
    }

    #[test]
    fn test_icon_from_invalid_json() {
        assert!(Icon::from_json("not json").is_err());
    }
}
