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

//! Map controls: zoom, scale, fullscreen, and the legend with its glyph
//! geometry. Glyphs are computed in symbol-box coordinates so embedders can
//! paint them with whatever canvas they have.

use super::layer::PathOptions;

/// Identifier of a control within one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub(crate) u64);

/// Map corner a control is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPosition {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ControlPosition {
    /// Parse an attribute value, falling back to the given default.
    #[must_use]
    pub fn from_attr(raw: Option<&str>, default: Self) -> Self {
        match raw {
            Some("topleft") => Self::TopLeft,
            Some("topright") => Self::TopRight,
            Some("bottomleft") => Self::BottomLeft,
            Some("bottomright") => Self::BottomRight,
            _ => default,
        }
    }
}

/// Zoom button pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomControl {
    pub zoom_in_text: String,
    pub zoom_in_title: String,
    pub zoom_out_text: String,
    pub zoom_out_title: String,
}

impl Default for ZoomControl {
    fn default() -> Self {
        Self {
            zoom_in_text: "+".to_string(),
            zoom_in_title: "Zoom in".to_string(),
            zoom_out_text: "\u{2212}".to_string(),
            zoom_out_title: "Zoom out".to_string(),
        }
    }
}

/// Scale bar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleControl {
    pub max_width: f64,
    pub metric: bool,
    pub imperial: bool,
    pub update_when_idle: bool,
}

impl ScaleControl {
    /// Resolve the unit flags: with neither flag set both bars are shown,
    /// with exactly one set only that one is.
    #[must_use]
    pub fn resolve_units(metric: bool, imperial: bool) -> (bool, bool) {
        (metric || !imperial, imperial || !metric)
    }
}

impl Default for ScaleControl {
    fn default() -> Self {
        Self {
            max_width: 100.0,
            metric: true,
            imperial: true,
            update_when_idle: false,
        }
    }
}

/// Fullscreen toggle button state as shown on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct FullscreenIndicator {
    pub true_text: String,
    pub false_text: String,
    pub is_fullscreen: bool,
}

impl FullscreenIndicator {
    /// Title for the current state.
    #[must_use]
    pub fn title(&self) -> &str {
        if self.is_fullscreen {
            &self.true_text
        } else {
            &self.false_text
        }
    }
}

/// The fullscreen capability owned by the one control that needs it.
///
/// Decides, without touching any shared state, whether a toggle should go
/// through the host window or through the pseudo-fullscreen fallback that
/// merely restyles the map pane.
#[derive(Debug, Clone, PartialEq)]
pub struct FullscreenToggle {
    pub pseudo: bool,
    pub true_text: String,
    pub false_text: String,
}

/// Outcome of a fullscreen toggle decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenAction {
    /// Flip the map's pseudo-fullscreen flag to this value.
    Pseudo(bool),
    /// Ask the host to set window fullscreen to this value.
    Host(bool),
}

impl FullscreenToggle {
    /// Decide the toggle path.
    ///
    /// A map currently in pseudo mode always leaves through the pseudo
    /// path, and a host that cannot fullscreen always falls back to it.
    #[must_use]
    pub fn decide(&self, fullscreen: bool, pseudo_active: bool, host_capable: bool) -> FullscreenAction {
        let target = !fullscreen;
        if fullscreen && pseudo_active {
            return FullscreenAction::Pseudo(false);
        }
        if self.pseudo || !host_capable {
            FullscreenAction::Pseudo(target)
        } else {
            FullscreenAction::Host(target)
        }
    }
}

/// Glyph geometry of one legend symbol, in symbol-box coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Glyph {
    Circle { center: (f32, f32), radius: f32 },
    Polyline { y: f32 },
    Rectangle { min: (f32, f32), max: (f32, f32) },
    Polygon { points: Vec<(f32, f32)> },
    Image { url: String },
}

/// A circle clamped so the stroke stays inside the box.
#[must_use]
pub fn circle_glyph(width: f32, height: f32, weight: f32, radius: Option<f32>) -> Glyph {
    let center = (width / 2.0, height / 2.0);
    let max_radius = (center.0.min(center.1) - weight).max(0.0);
    let radius = match radius {
        Some(r) => r.min(max_radius),
        None => max_radius,
    };
    Glyph::Circle { center, radius }
}

/// A horizontal line through the box midline.
#[must_use]
pub fn polyline_glyph(_width: f32, height: f32) -> Glyph {
    Glyph::Polyline { y: height / 2.0 }
}

/// A rectangle inset by the stroke weight; a square box gets its height
/// halved so the shape reads as a rectangle.
#[must_use]
pub fn rectangle_glyph(width: f32, height: f32, weight: f32) -> Glyph {
    let x0 = width / 2.0;
    let y0 = height / 2.0;
    let rx = (x0 - weight).max(0.0);
    let mut ry = (y0 - weight).max(0.0);
    if (rx - ry).abs() < f32::EPSILON {
        ry /= 2.0;
    }
    Glyph::Rectangle {
        min: (x0 - rx, y0 - ry),
        max: (x0 + rx, y0 + ry),
    }
}

/// A regular polygon rotated so its top edge is horizontal. The vertex list
/// is closed (first point repeated).
#[must_use]
pub fn polygon_glyph(width: f32, height: f32, weight: f32, sides: u32) -> Glyph {
    let sides = sides.max(3);
    let x0 = width / 2.0;
    let y0 = height / 2.0;
    let r = (x0.min(y0) - weight).max(0.0);
    let step = 360.0 / sides as f32;

    let mut points = Vec::with_capacity(sides as usize + 1);
    for i in 0..=sides {
        let angle = (step * i as f32 + (90.0 - step / 2.0)).to_radians();
        points.push((x0 + r * angle.cos(), y0 + r * angle.sin()));
    }
    Glyph::Polygon { points }
}

/// One row of the legend.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub glyph: Glyph,
    pub style: PathOptions,
    pub inactive: bool,
}

/// Legend control composed from symbol elements.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendControl {
    pub title: String,
    pub opacity: Option<f64>,
    pub symbol_width: u32,
    pub symbol_height: u32,
    pub column: u32,
    pub expanded: bool,
    pub entries: Vec<LegendEntry>,
}

impl LegendControl {
    /// Entries per column for the configured column count.
    #[must_use]
    pub fn column_size(&self) -> usize {
        let columns = self.column.max(1) as usize;
        self.entries.len().div_ceil(columns)
    }
}

/// The concrete kind of a control.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    Zoom(ZoomControl),
    Scale(ScaleControl),
    Fullscreen(FullscreenIndicator),
    Legend(LegendControl),
}

/// One control on a map.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub position: ControlPosition,
    pub kind: ControlKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_glyph_clamps_radius() {
        // 24x24 box, weight 3: max radius is 12 - 3 = 9
        let Glyph::Circle { center, radius } = circle_glyph(24.0, 24.0, 3.0, Some(100.0)) else {
            panic!("expected circle");
        };
        assert_eq!(center, (12.0, 12.0));
        assert!((radius - 9.0).abs() < f32::EPSILON);

        let Glyph::Circle { radius, .. } = circle_glyph(24.0, 24.0, 3.0, Some(5.0)) else {
            panic!("expected circle");
        };
        assert!((radius - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rectangle_glyph_halves_square() {
        let Glyph::Rectangle { min, max } = rectangle_glyph(24.0, 24.0, 3.0) else {
            panic!("expected rectangle");
        };
        // rx = 9, ry halved to 4.5
        assert_eq!(min, (3.0, 7.5));
        assert_eq!(max, (21.0, 16.5));
    }

    #[test]
    fn test_polygon_glyph_closed_ring() {
        let Glyph::Polygon { points } = polygon_glyph(24.0, 24.0, 3.0, 4) else {
            panic!("expected polygon");
        };
        assert_eq!(points.len(), 5);
        let first = points.first().unwrap();
        let last = points.last().unwrap();
        assert!((first.0 - last.0).abs() < 1e-3);
        assert!((first.1 - last.1).abs() < 1e-3);
    }

    #[test]
    fn test_scale_unit_resolution() {
        assert_eq!(ScaleControl::resolve_units(false, false), (true, true));
        assert_eq!(ScaleControl::resolve_units(true, false), (true, false));
        assert_eq!(ScaleControl::resolve_units(false, true), (false, true));
        assert_eq!(ScaleControl::resolve_units(true, true), (true, true));
    }

    #[test]
    fn test_fullscreen_toggle_paths() {
        let toggle = FullscreenToggle {
            pseudo: false,
            true_text: "Exit Fullscreen".to_string(),
            false_text: "View Fullscreen".to_string(),
        };

        assert_eq!(toggle.decide(false, false, true), FullscreenAction::Host(true));
        assert_eq!(toggle.decide(true, false, true), FullscreenAction::Host(false));
        // Incapable host falls back to pseudo
        assert_eq!(toggle.decide(false, false, false), FullscreenAction::Pseudo(true));
        // A pseudo-mode map always exits through the pseudo path
        assert_eq!(toggle.decide(true, true, true), FullscreenAction::Pseudo(false));

        let forced = FullscreenToggle { pseudo: true, ..toggle };
        assert_eq!(forced.decide(false, false, true), FullscreenAction::Pseudo(true));
    }

    #[test]
    fn test_legend_column_size() {
        let legend = LegendControl {
            title: "Legend".to_string(),
            opacity: None,
            symbol_width: 24,
            symbol_height: 24,
            column: 2,
            expanded: true,
            entries: vec![
                LegendEntry {
                    label: "a".to_string(),
                    glyph: polyline_glyph(24.0, 24.0),
                    style: PathOptions::default(),
                    inactive: false,
                };
                5
            ],
        };
        assert_eq!(legend.column_size(), 3);
    }
}
