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

//! The viewer window: a map pane rendering the engine's model on the left,
//! a document inspector on the right.
//!
//! The app owns the [`Engine`] and drives it once per frame: report the
//! viewport, apply pointer input, flush, paint from the resulting model,
//! then feed clicks back in. Painting never mutates; interactions are
//! collected as [`Action`]s and applied after the model borrow ends.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use egui::{Color32, CornerRadius, FontId, Pos2, Rect, Stroke, StrokeKind};
use log::warn;

use map_elements::dom::Document;
use map_elements::geo::WebMercator;
use map_elements::map::control::{
    ControlId, ControlKind, ControlPosition, Glyph, LegendControl, LegendEntry, ScaleControl,
};
use map_elements::map::icon::Icon;
use map_elements::map::layer::{LayerId, LayerKind, Marker, PathOptions};
use map_elements::map::tile::TileOptions;
use map_elements::{Engine, Feature, HostCommand, LatLng, MapId, MapModel, NodeId, Tag};

use crate::tiles::TileManager;
use crate::tilesource::TemplateSource;

const EVENT_LOG_CAP: usize = 200;

/// Pixel extent of one tile in the overlay coordinate space. Layer tile
/// sizes only affect the raster grid, not overlay math.
const WORLD_TILE_PX: f64 = 256.0;

/// Click radius around a marker icon
const MARKER_HIT_RADIUS: f32 = 10.0;

/// One line of the inspector event log
struct LogEntry {
    at: DateTime<Utc>,
    target: String,
    name: &'static str,
    detail: String,
}

/// A clickable layer feature from the last painted frame
#[derive(Clone, Copy)]
struct LayerHit {
    node: NodeId,
    layer: LayerId,
    pos: Pos2,
    radius: f32,
    draggable: bool,
}

/// Interactions collected while the model is borrowed for painting
#[derive(Clone, Copy)]
enum Action {
    ZoomIn,
    ZoomOut,
    ToggleFullscreen(NodeId),
    LegendToggle(NodeId, usize),
    LegendSetExpanded(NodeId, bool),
    LayerClick(LayerId, LatLng),
    ClosePopup(LayerId),
    MapClick(LatLng),
}

/// Screen-space context shared by the paint helpers
struct PaintCtx {
    rect: Rect,
    center: Pos2,
    view_center: LatLng,
    zoom: u8,
}

impl PaintCtx {
    fn to_screen(&self, position: LatLng) -> Pos2 {
        let tile_x = WebMercator::lon_to_x(position.lng, self.zoom);
        let tile_y = WebMercator::lat_to_y(position.lat, self.zoom);
        let center_x = WebMercator::lon_to_x(self.view_center.lng, self.zoom);
        let center_y = WebMercator::lat_to_y(self.view_center.lat, self.zoom);

        egui::pos2(
            self.center.x + ((tile_x - center_x) * WORLD_TILE_PX) as f32,
            self.center.y + ((tile_y - center_y) * WORLD_TILE_PX) as f32,
        )
    }

    fn to_latlng(&self, pos: Pos2) -> LatLng {
        let center_x = WebMercator::lon_to_x(self.view_center.lng, self.zoom);
        let center_y = WebMercator::lat_to_y(self.view_center.lat, self.zoom);
        let tile_x = center_x + f64::from(pos.x - self.center.x) / WORLD_TILE_PX;
        let tile_y = center_y + f64::from(pos.y - self.center.y) / WORLD_TILE_PX;

        LatLng::new(
            WebMercator::tile_to_lat(tile_y, self.zoom),
            WebMercator::tile_to_lon(tile_x, self.zoom),
        )
    }

    fn meters_per_pixel(&self, lat: f64) -> f64 {
        WebMercator::meters_per_pixel(lat, f64::from(self.zoom))
    }
}

pub struct LeafmarkApp {
    engine: Engine,
    tiles: TileManager,
    offline: bool,
    event_log: VecDeque<LogEntry>,
    selected: Option<NodeId>,
    /// Node and layer of the marker currently being dragged
    dragging_marker: Option<(NodeId, LayerId)>,
    tile_error: Option<String>,
    /// Hit targets from the previous frame, used for drag-start detection
    layer_hits: Vec<LayerHit>,
    /// Last host fullscreen state we saw, to detect external changes
    last_fullscreen: Option<bool>,
}

impl LeafmarkApp {
    pub fn new(engine: Engine, offline: bool) -> Self {
        Self {
            engine,
            tiles: TileManager::new(offline),
            offline,
            event_log: VecDeque::new(),
            selected: None,
            dragging_marker: None,
            tile_error: None,
            layer_hits: Vec::new(),
            last_fullscreen: None,
        }
    }

    /// The map element the viewer renders: the first one in the document.
    fn find_map_node(&self) -> Option<NodeId> {
        let doc = self.engine.document();
        doc.descendants(doc.root())
            .into_iter()
            .find(|node| doc.tag(*node) == Some(Tag::Map))
    }

    /// Elements of one map keyed by the feature they produced, so clicks on
    /// painted features can address the engine's element operations.
    fn feature_nodes(
        &self,
        map_node: NodeId,
        map_id: MapId,
    ) -> (HashMap<LayerId, NodeId>, HashMap<ControlId, NodeId>) {
        let mut layers = HashMap::new();
        let mut controls = HashMap::new();
        for node in self.engine.document().descendants(map_node) {
            match self.engine.feature_of(node) {
                Some(Feature::Layer { map, layer }) if map == map_id => {
                    layers.insert(layer, node);
                }
                Some(Feature::Control { map, control }) if map == map_id => {
                    controls.insert(control, node);
                }
                _ => {}
            }
        }
        (layers, controls)
    }

    fn flush_engine(&mut self) {
        if let Err(e) = self.engine.flush() {
            warn!("Flush failed: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Map pane

    fn draw_map(&mut self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(
            egui::vec2(ui.available_width(), ui.available_height()),
            egui::Sense::click_and_drag(),
        );

        let rect = response.rect;
        painter.rect_filled(rect, CornerRadius::ZERO, Color32::from_rgb(200, 220, 240));

        let Some(map_node) = self.find_map_node() else {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "No <leaflet-map> element in document",
                FontId::proportional(14.0),
                Color32::from_rgb(80, 80, 80),
            );
            return;
        };

        // Report the viewport; the first visible report wakes the map up
        self.engine
            .set_map_viewport(map_node, rect.width(), rect.height(), true);
        self.flush_engine();

        let Some(map_id) = self.engine.map_of(map_node) else {
            return;
        };

        self.handle_input(&response, ui, map_id);
        self.flush_engine();

        let (layer_nodes, control_nodes) = self.feature_nodes(map_node, map_id);

        // Everything painted below reads one immutable model borrow;
        // interactions land in `actions` and apply afterwards
        let mut actions: Vec<Action> = Vec::new();
        let mut fresh_hits: Vec<LayerHit> = Vec::new();
        let mut control_hits: Vec<(Rect, Action)> = Vec::new();
        let mut popup_hits: Vec<(Rect, Rect, LayerId)> = Vec::new();
        let mut tile_status = self.tile_error.clone();

        {
            let Some(model) = self.engine.map(map_id) else {
                return;
            };
            let view = model.view();
            let ctx = PaintCtx {
                rect,
                center: rect.center(),
                view_center: view.center,
                zoom: view.zoom.round().clamp(0.0, 30.0) as u8,
            };

            let mut tile_ids = Vec::new();
            let mut vector_ids = Vec::new();
            let mut marker_ids = Vec::new();
            collect_paint_order(model, model.root_layers(), &mut tile_ids, &mut vector_ids, &mut marker_ids);
            tile_ids.sort_by_key(|id| match model.layer(*id).map(|l| &l.kind) {
                Some(LayerKind::Tile(t)) => t.options.z_index.unwrap_or(0),
                _ => 0,
            });

            let mut tiles_rendered = 0;
            for id in &tile_ids {
                if let Some(LayerKind::Tile(tile)) = model.layer(*id).map(|l| &l.kind) {
                    tiles_rendered +=
                        self.paint_tile_layer(&painter, &ctx, &tile.options, ui.ctx());
                }
            }

            // Update error state based on tile loading
            if self.tiles.get_error_count() > 0 {
                tile_status = Some(format!(
                    "Failed to load {} tiles",
                    self.tiles.get_error_count()
                ));
            } else if self.tiles.has_loading_tiles() {
                tile_status = Some("Loading map tiles...".to_string());
            } else if tiles_rendered > 0 {
                tile_status = None;
            }

            for id in &vector_ids {
                self.paint_vector_layer(&painter, &ctx, model, *id, &layer_nodes, &mut fresh_hits);
            }
            for id in &marker_ids {
                if let Some(LayerKind::Marker(marker)) = model.layer(*id).map(|l| &l.kind) {
                    self.paint_marker(&painter, &ctx, marker, ui.ctx());
                    fresh_hits.push(LayerHit {
                        node: layer_nodes.get(id).copied().unwrap_or(map_node),
                        layer: *id,
                        pos: ctx.to_screen(marker.position),
                        radius: MARKER_HIT_RADIUS,
                        draggable: marker.draggable,
                    });
                }
            }

            self.paint_controls(&painter, &ctx, model, &control_nodes, &mut control_hits, ui.ctx());
            self.paint_popups(&painter, &ctx, model, &mut popup_hits);

            if model.is_pseudo_fullscreen() {
                painter.rect_stroke(
                    rect.shrink(1.0),
                    CornerRadius::ZERO,
                    Stroke::new(2.0, Color32::from_rgb(255, 170, 0)),
                    StrokeKind::Inside,
                );
            }

            if let Some(ref error_msg) = tile_status {
                paint_status_bubble(&painter, rect, error_msg);
            }

            // Resolve a click against what was just painted, topmost first
            if response.clicked() {
                if let Some(click) = response.interact_pointer_pos() {
                    actions.extend(resolve_click(
                        click,
                        &ctx,
                        &popup_hits,
                        &control_hits,
                        &fresh_hits,
                    ));
                }
            }
        }

        self.layer_hits = fresh_hits;
        self.tile_error = tile_status;

        for action in actions {
            self.apply_action(action, map_id);
        }
        self.flush_engine();
    }

    /// Pointer input that pans, zooms, and drags markers. Uses the hit
    /// targets painted on the previous frame.
    fn handle_input(&mut self, response: &egui::Response, ui: &egui::Ui, map_id: MapId) {
        let Some((view, options)) = self
            .engine
            .map(map_id)
            .map(|m| (m.view(), m.options().clone()))
        else {
            return;
        };
        let rect = response.rect;
        let ctx = PaintCtx {
            rect,
            center: rect.center(),
            view_center: view.center,
            zoom: view.zoom.round().clamp(0.0, 30.0) as u8,
        };

        // Marker drags win over panning
        if response.drag_started() {
            if let Some(pos) = response.interact_pointer_pos() {
                let hit = self
                    .layer_hits
                    .iter()
                    .filter(|h| h.draggable && h.pos.distance(pos) <= h.radius)
                    .min_by(|a, b| a.pos.distance(pos).total_cmp(&b.pos.distance(pos)))
                    .copied();
                if let Some(hit) = hit {
                    self.dragging_marker = Some((hit.node, hit.layer));
                    if let Some(model) = self.engine.map_mut(map_id) {
                        model.emit_layer_event(hit.layer, "dragstart", serde_json::json!({}));
                    }
                }
            }
        }

        if let Some((node, layer)) = self.dragging_marker {
            if response.dragged() {
                if let Some(pos) = response.interact_pointer_pos() {
                    let position = ctx.to_latlng(pos);
                    if let Err(e) = self.engine.marker_dragged(node, position) {
                        warn!("Marker drag failed: {}", e);
                    }
                    if let Some(model) = self.engine.map_mut(map_id) {
                        model.emit_layer_event(
                            layer,
                            "drag",
                            serde_json::json!({
                                "latlng": { "lat": position.lat, "lng": position.lng }
                            }),
                        );
                    }
                }
            }
            if response.drag_stopped() {
                if let Some(model) = self.engine.map_mut(map_id) {
                    model.emit_layer_event(layer, "dragend", serde_json::json!({}));
                }
                self.dragging_marker = None;
            }
            return;
        }

        let mut new_center = view.center;
        let mut new_zoom = view.zoom;

        // Drag to pan
        if response.dragged() && options.dragging {
            let delta = response.drag_delta();
            let center_x =
                WebMercator::lon_to_x(view.center.lng, ctx.zoom) - f64::from(delta.x) / WORLD_TILE_PX;
            let center_y =
                WebMercator::lat_to_y(view.center.lat, ctx.zoom) - f64::from(delta.y) / WORLD_TILE_PX;
            new_center = LatLng::new(
                WebMercator::tile_to_lat(center_y, ctx.zoom).clamp(-85.0, 85.0),
                WebMercator::tile_to_lon(center_x, ctx.zoom),
            );
        }

        // Pinch zoom
        let zoom_delta = ui.ctx().input(|i| i.zoom_delta());
        if options.touch_zoom && (zoom_delta - 1.0).abs() > 0.001 {
            new_zoom += f64::from(zoom_delta.log2());
        }

        // Scroll wheel zoom, one level per 60 scroll pixels
        if options.scroll_wheel_zoom && response.hovered() {
            let scroll = ui.ctx().input(|i| i.smooth_scroll_delta.y);
            if scroll.abs() > 0.0 {
                new_zoom += f64::from(scroll) / 60.0;
            }
        }

        if options.double_click_zoom && response.double_clicked() {
            new_zoom = view.zoom.round() + 1.0;
        }

        if new_center != view.center || (new_zoom - view.zoom).abs() > f64::EPSILON {
            if let Some(model) = self.engine.map_mut(map_id) {
                model.set_view(new_center, new_zoom);
            }
        }
    }

    fn apply_action(&mut self, action: Action, map_id: MapId) {
        match action {
            Action::ZoomIn => {
                if let Some(model) = self.engine.map_mut(map_id) {
                    let view = model.view();
                    model.set_view(view.center, view.zoom.round() + 1.0);
                }
            }
            Action::ZoomOut => {
                if let Some(model) = self.engine.map_mut(map_id) {
                    let view = model.view();
                    model.set_view(view.center, view.zoom.round() - 1.0);
                }
            }
            Action::ToggleFullscreen(node) => {
                if let Err(e) = self.engine.toggle_fullscreen(node) {
                    warn!("Fullscreen toggle failed: {}", e);
                }
            }
            Action::LegendToggle(node, index) => {
                if let Err(e) = self.engine.legend_toggle_entry(node, index) {
                    warn!("Legend toggle failed: {}", e);
                }
            }
            Action::LegendSetExpanded(node, expanded) => {
                if let Err(e) = self.engine.legend_set_expanded(node, expanded) {
                    warn!("Legend expand failed: {}", e);
                }
            }
            Action::LayerClick(layer, position) => {
                if let Some(model) = self.engine.map_mut(map_id) {
                    model.emit_layer_event(
                        layer,
                        "click",
                        serde_json::json!({
                            "latlng": { "lat": position.lat, "lng": position.lng }
                        }),
                    );
                    if model.layer(layer).is_some_and(|l| l.popup.is_some()) {
                        model.open_popup(layer);
                    }
                }
            }
            Action::ClosePopup(layer) => {
                if let Some(model) = self.engine.map_mut(map_id) {
                    model.close_popup(layer);
                }
            }
            Action::MapClick(position) => {
                if let Some(model) = self.engine.map_mut(map_id) {
                    if model.options().close_popup_on_click {
                        let open: Vec<LayerId> = model
                            .layers()
                            .filter(|(_, l)| l.popup.as_ref().is_some_and(|p| p.open))
                            .map(|(id, _)| id)
                            .collect();
                        for id in open {
                            model.close_popup(id);
                        }
                    }
                    model.emit_map_event(
                        "click",
                        serde_json::json!({
                            "latlng": { "lat": position.lat, "lng": position.lng }
                        }),
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Layer painting

    /// Paint one tile layer; returns the number of tiles drawn.
    fn paint_tile_layer(
        &self,
        painter: &egui::Painter,
        ctx: &PaintCtx,
        options: &TileOptions,
        egui_ctx: &egui::Context,
    ) -> usize {
        // Outside the layer's zoom range nothing is shown
        if ctx.zoom < options.min_zoom || ctx.zoom > options.max_zoom {
            return 0;
        }

        // Past the native zoom the grid stays at the native level and the
        // tiles are scaled up
        let grid_zoom = match options.max_native_zoom {
            Some(native) => ctx.zoom.min(native),
            None => ctx.zoom,
        };
        let scale = 1_u32 << (ctx.zoom - grid_zoom).min(4);
        let tile_px = options.tile_size.saturating_mul(scale).max(1);

        let source = TemplateSource::new(options.clone());
        let visible = self.tiles.get_visible_tiles(
            ctx.view_center.lat,
            ctx.view_center.lng,
            grid_zoom,
            ctx.rect.width(),
            ctx.rect.height(),
            tile_px,
            !options.no_wrap,
        );

        let tint = if options.opacity < 1.0 {
            Color32::WHITE.gamma_multiply(options.opacity.clamp(0.0, 1.0) as f32)
        } else {
            Color32::WHITE
        };

        let mut rendered = 0;
        for (coord, offset_x, offset_y) in visible {
            if let Some(texture) = self.tiles.get_tile(&source, coord, egui_ctx) {
                let tile_pos = egui::pos2(ctx.center.x + offset_x, ctx.center.y + offset_y);
                let tile_rect =
                    Rect::from_min_size(tile_pos, egui::vec2(tile_px as f32, tile_px as f32));

                painter.image(
                    texture.id(),
                    tile_rect,
                    Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    tint,
                );
                rendered += 1;
            }
        }
        rendered
    }

    fn paint_vector_layer(
        &self,
        painter: &egui::Painter,
        ctx: &PaintCtx,
        model: &MapModel,
        id: LayerId,
        layer_nodes: &HashMap<LayerId, NodeId>,
        hits: &mut Vec<LayerHit>,
    ) {
        let Some(layer) = model.layer(id) else {
            return;
        };
        match &layer.kind {
            LayerKind::Circle(circle) => {
                let pos = ctx.to_screen(circle.center);
                let radius =
                    (circle.radius / ctx.meters_per_pixel(circle.center.lat)).max(1.0) as f32;
                paint_path_circle(painter, pos, radius, &circle.options);
                // Only declared click targets intercept the pointer;
                // everything else lets the click fall through to the map
                if circle.options.clickable {
                    if let Some(&node) = layer_nodes.get(&id) {
                        hits.push(LayerHit {
                            node,
                            layer: id,
                            pos,
                            radius: radius.max(8.0),
                            draggable: false,
                        });
                    }
                }
            }
            LayerKind::Polyline(line) => {
                let points: Vec<Pos2> = line.points.iter().map(|p| ctx.to_screen(*p)).collect();
                paint_path_line(painter, points, &line.options);
            }
            LayerKind::Polygon(polygon) => {
                let points: Vec<Pos2> = polygon.points.iter().map(|p| ctx.to_screen(*p)).collect();
                paint_path_polygon(painter, points, &polygon.options);
            }
            LayerKind::GeoJson(geojson) => {
                self.paint_geojson(painter, ctx, &geojson.data, &geojson.style);
            }
            _ => {}
        }
    }

    fn paint_geojson(
        &self,
        painter: &egui::Painter,
        ctx: &PaintCtx,
        value: &serde_json::Value,
        style: &PathOptions,
    ) {
        match value.get("type").and_then(serde_json::Value::as_str) {
            Some("FeatureCollection") => {
                if let Some(features) = value.get("features").and_then(serde_json::Value::as_array)
                {
                    for feature in features {
                        self.paint_geojson(painter, ctx, feature, style);
                    }
                }
            }
            Some("Feature") => {
                if let Some(geometry) = value.get("geometry") {
                    self.paint_geojson(painter, ctx, geometry, style);
                }
            }
            Some("GeometryCollection") => {
                if let Some(parts) = value.get("geometries").and_then(serde_json::Value::as_array)
                {
                    for part in parts {
                        self.paint_geojson(painter, ctx, part, style);
                    }
                }
            }
            Some(kind) => {
                let Some(coordinates) = value.get("coordinates") else {
                    return;
                };
                match kind {
                    "Point" => {
                        if let Some(position) = geojson_position(coordinates) {
                            paint_path_circle(painter, ctx.to_screen(position), 6.0, style);
                        }
                    }
                    "MultiPoint" => {
                        for position in geojson_positions(coordinates) {
                            paint_path_circle(painter, ctx.to_screen(position), 6.0, style);
                        }
                    }
                    "LineString" => {
                        let points: Vec<Pos2> = geojson_positions(coordinates)
                            .into_iter()
                            .map(|p| ctx.to_screen(p))
                            .collect();
                        paint_path_line(painter, points, style);
                    }
                    "MultiLineString" => {
                        if let Some(lines) = coordinates.as_array() {
                            for line in lines {
                                let points: Vec<Pos2> = geojson_positions(line)
                                    .into_iter()
                                    .map(|p| ctx.to_screen(p))
                                    .collect();
                                paint_path_line(painter, points, style);
                            }
                        }
                    }
                    "Polygon" => {
                        self.paint_geojson_polygon(painter, ctx, coordinates, style);
                    }
                    "MultiPolygon" => {
                        if let Some(polygons) = coordinates.as_array() {
                            for polygon in polygons {
                                self.paint_geojson_polygon(painter, ctx, polygon, style);
                            }
                        }
                    }
                    _ => {}
                }
            }
            None => {}
        }
    }

    // Only the outer ring is painted; holes are rare in the documents this
    // viewer targets
    fn paint_geojson_polygon(
        &self,
        painter: &egui::Painter,
        ctx: &PaintCtx,
        rings: &serde_json::Value,
        style: &PathOptions,
    ) {
        let Some(outer) = rings.get(0) else {
            return;
        };
        let points: Vec<Pos2> = geojson_positions(outer)
            .into_iter()
            .map(|p| ctx.to_screen(p))
            .collect();
        paint_path_polygon(painter, points, style);
    }

    fn paint_marker(
        &self,
        painter: &egui::Painter,
        ctx: &PaintCtx,
        marker: &Marker,
        egui_ctx: &egui::Context,
    ) {
        let pos = ctx.to_screen(marker.position);
        if !ctx.rect.expand(64.0).contains(pos) {
            return;
        }
        let alpha = (marker.opacity.clamp(0.0, 1.0) * 255.0) as u8;

        match &marker.icon {
            Icon::Image(options) => {
                let mut painted = false;
                if let Some(url) = options.icon_url.as_deref() {
                    if let Some(texture) = self.tiles.get_image(url, egui_ctx) {
                        let size = match options.icon_size {
                            Some((w, h)) => egui::vec2(w as f32, h as f32),
                            None => texture.size_vec2(),
                        };
                        let anchor = match options.icon_anchor {
                            Some((x, y)) => egui::vec2(x as f32, y as f32),
                            None => size / 2.0,
                        };
                        let icon_rect = Rect::from_min_size(pos - anchor, size);
                        painter.image(
                            texture.id(),
                            icon_rect,
                            Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                            Color32::from_rgba_unmultiplied(255, 255, 255, alpha),
                        );
                        painted = true;
                    }
                }
                if !painted {
                    paint_default_pin(painter, pos, alpha);
                }
            }
            Icon::Div(options) => {
                let text = strip_markup(&options.html);
                let label = if text.is_empty() { "·" } else { text.as_str() };
                let galley =
                    painter.layout_no_wrap(label.to_string(), FontId::proportional(11.0), Color32::WHITE);
                let padding = egui::vec2(4.0, 3.0);
                let box_rect = Rect::from_center_size(pos, galley.size() + padding * 2.0);
                painter.rect_filled(
                    box_rect,
                    CornerRadius::same(3),
                    Color32::from_rgba_unmultiplied(40, 40, 40, alpha.min(220)),
                );
                painter.text(
                    pos,
                    egui::Align2::CENTER_CENTER,
                    label,
                    FontId::proportional(11.0),
                    Color32::from_rgba_unmultiplied(255, 255, 255, alpha),
                );
            }
            Icon::Default => paint_default_pin(painter, pos, alpha),
        }

        if !marker.title.is_empty() {
            let text_pos = pos + egui::vec2(12.0, 0.0);
            let galley = painter.layout_no_wrap(
                marker.title.clone(),
                FontId::proportional(11.0),
                Color32::WHITE,
            );

            let padding = egui::vec2(3.0, 2.0);
            let box_rect = Rect::from_min_size(
                text_pos - egui::vec2(padding.x, galley.size().y / 2.0 + padding.y),
                galley.size() + padding * 2.0,
            );
            painter.rect_filled(
                box_rect,
                CornerRadius::same(2),
                Color32::from_rgba_unmultiplied(0, 0, 0, 180),
            );
            painter.text(
                text_pos,
                egui::Align2::LEFT_CENTER,
                &marker.title,
                FontId::proportional(11.0),
                Color32::WHITE,
            );
        }
    }

    // ------------------------------------------------------------------
    // Controls

    fn paint_controls(
        &self,
        painter: &egui::Painter,
        ctx: &PaintCtx,
        model: &MapModel,
        control_nodes: &HashMap<ControlId, NodeId>,
        control_hits: &mut Vec<(Rect, Action)>,
        egui_ctx: &egui::Context,
    ) {
        // Bottom-right space is reserved for the attribution line
        let attributions = model.attributions();
        let mut cursors = [10.0_f32, 10.0, 10.0, 10.0];
        if !attributions.is_empty() {
            let text = attributions
                .iter()
                .map(|a| strip_markup(a))
                .collect::<Vec<_>>()
                .join(" | ");
            painter.text(
                ctx.rect.right_bottom() + egui::vec2(-10.0, -10.0),
                egui::Align2::RIGHT_BOTTOM,
                text,
                FontId::proportional(10.0),
                Color32::from_black_alpha(180),
            );
            cursors[corner_index(ControlPosition::BottomRight)] += 18.0;
        }

        for (id, control) in model.controls() {
            let node = control_nodes.get(&id).copied();
            match &control.kind {
                ControlKind::Zoom(zoom) => {
                    let size = egui::vec2(28.0, 57.0);
                    let origin = place_control(ctx.rect, control.position, size, &mut cursors);
                    let in_rect = Rect::from_min_size(origin, egui::vec2(28.0, 28.0));
                    let out_rect =
                        Rect::from_min_size(origin + egui::vec2(0.0, 29.0), egui::vec2(28.0, 28.0));
                    paint_control_button(painter, in_rect, &zoom.zoom_in_text);
                    paint_control_button(painter, out_rect, &zoom.zoom_out_text);
                    control_hits.push((in_rect, Action::ZoomIn));
                    control_hits.push((out_rect, Action::ZoomOut));
                }
                ControlKind::Scale(scale) => {
                    self.paint_scale(painter, ctx, control.position, scale, &mut cursors);
                }
                ControlKind::Fullscreen(indicator) => {
                    let size = egui::vec2(28.0, 28.0);
                    let origin = place_control(ctx.rect, control.position, size, &mut cursors);
                    let button = Rect::from_min_size(origin, size);
                    paint_control_button(painter, button, "\u{26f6}");
                    if indicator.is_fullscreen {
                        painter.rect_stroke(
                            button,
                            CornerRadius::same(4),
                            Stroke::new(2.0, Color32::from_rgb(255, 170, 0)),
                            StrokeKind::Inside,
                        );
                    }
                    if let Some(node) = node {
                        control_hits.push((button, Action::ToggleFullscreen(node)));
                    }
                }
                ControlKind::Legend(legend) => {
                    self.paint_legend(
                        painter,
                        ctx,
                        control.position,
                        legend,
                        node,
                        &mut cursors,
                        control_hits,
                        egui_ctx,
                    );
                }
            }
        }
    }

    fn paint_scale(
        &self,
        painter: &egui::Painter,
        ctx: &PaintCtx,
        position: ControlPosition,
        scale: &ScaleControl,
        cursors: &mut [f32; 4],
    ) {
        let meters_per_px = ctx.meters_per_pixel(ctx.view_center.lat);
        let max_meters = scale.max_width * meters_per_px;
        if max_meters <= 0.0 {
            return;
        }

        let mut rows: Vec<(f32, String)> = Vec::new();
        if scale.metric {
            let (ratio, label) = metric_scale(max_meters);
            rows.push(((scale.max_width * ratio) as f32, label));
        }
        if scale.imperial {
            let (ratio, label) = imperial_scale(max_meters);
            rows.push(((scale.max_width * ratio) as f32, label));
        }
        if rows.is_empty() {
            return;
        }

        let row_h = 16.0;
        let size = egui::vec2(scale.max_width as f32 + 4.0, rows.len() as f32 * row_h);
        let origin = place_control(ctx.rect, position, size, cursors);

        for (i, (width, label)) in rows.iter().enumerate() {
            let y = origin.y + i as f32 * row_h + row_h - 3.0;
            let bar = Rect::from_min_max(
                egui::pos2(origin.x, y - 4.0),
                egui::pos2(origin.x + width, y),
            );
            painter.rect_filled(
                bar,
                CornerRadius::ZERO,
                Color32::from_rgba_unmultiplied(255, 255, 255, 140),
            );
            painter.rect_stroke(
                bar,
                CornerRadius::ZERO,
                Stroke::new(1.5, Color32::from_rgb(60, 60, 60)),
                StrokeKind::Inside,
            );
            painter.text(
                egui::pos2(origin.x + 4.0, y - 6.0),
                egui::Align2::LEFT_BOTTOM,
                label,
                FontId::proportional(10.0),
                Color32::from_rgb(40, 40, 40),
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn paint_legend(
        &self,
        painter: &egui::Painter,
        ctx: &PaintCtx,
        position: ControlPosition,
        legend: &LegendControl,
        node: Option<NodeId>,
        cursors: &mut [f32; 4],
        control_hits: &mut Vec<(Rect, Action)>,
        egui_ctx: &egui::Context,
    ) {
        if !legend.expanded {
            let size = egui::vec2(36.0, 36.0);
            let origin = place_control(ctx.rect, position, size, cursors);
            let button = Rect::from_min_size(origin, size);
            paint_control_button(painter, button, "\u{2261}");
            if let Some(node) = node {
                control_hits.push((button, Action::LegendSetExpanded(node, true)));
            }
            return;
        }

        let padding = 8.0;
        let symbol_w = legend.symbol_width.max(1) as f32;
        let symbol_h = legend.symbol_height.max(1) as f32;
        let row_h = symbol_h.max(16.0) + 4.0;
        let title_h = if legend.title.is_empty() { 12.0 } else { 20.0 };
        let column_size = legend.column_size().max(1);

        // Column widths follow the widest label in each column
        let label_font = FontId::proportional(11.0);
        let mut column_widths: Vec<f32> = Vec::new();
        for chunk in legend.entries.chunks(column_size) {
            let mut label_w = 30.0_f32;
            for entry in chunk {
                let galley =
                    painter.layout_no_wrap(entry.label.clone(), label_font.clone(), Color32::WHITE);
                label_w = label_w.max(galley.size().x);
            }
            column_widths.push(symbol_w + 6.0 + label_w);
        }

        let panel_w =
            column_widths.iter().sum::<f32>() + padding * 2.0 + 8.0 * (column_widths.len().saturating_sub(1)) as f32;
        let panel_h = title_h + column_size as f32 * row_h + padding * 2.0;
        let size = egui::vec2(panel_w, panel_h);
        let origin = place_control(ctx.rect, position, size, cursors);
        let panel = Rect::from_min_size(origin, size);

        let alpha = (legend.opacity.unwrap_or(1.0).clamp(0.0, 1.0) * 235.0) as u8;
        painter.rect_filled(
            panel,
            CornerRadius::same(4),
            Color32::from_rgba_unmultiplied(255, 255, 255, alpha),
        );
        painter.rect_stroke(
            panel,
            CornerRadius::same(4),
            Stroke::new(1.0, Color32::from_rgba_unmultiplied(120, 120, 120, 160)),
            StrokeKind::Inside,
        );

        let header = Rect::from_min_size(origin, egui::vec2(panel_w, title_h + padding));
        if !legend.title.is_empty() {
            painter.text(
                origin + egui::vec2(padding, padding),
                egui::Align2::LEFT_TOP,
                &legend.title,
                FontId::proportional(12.0),
                Color32::from_rgb(30, 30, 30),
            );
        }
        if let Some(node) = node {
            control_hits.push((header, Action::LegendSetExpanded(node, false)));
        }

        let mut x = origin.x + padding;
        for (col, chunk) in legend.entries.chunks(column_size).enumerate() {
            for (row, entry) in chunk.iter().enumerate() {
                let index = col * column_size + row;
                let y = origin.y + padding + title_h + row as f32 * row_h;
                let symbol_origin = egui::pos2(x, y + (row_h - 4.0 - symbol_h) / 2.0);
                self.paint_glyph(painter, symbol_origin, symbol_w, entry, egui_ctx);

                let label_color = if entry.inactive {
                    Color32::from_rgb(160, 160, 160)
                } else {
                    Color32::from_rgb(40, 40, 40)
                };
                painter.text(
                    egui::pos2(x + symbol_w + 6.0, y + row_h / 2.0 - 2.0),
                    egui::Align2::LEFT_CENTER,
                    &entry.label,
                    label_font.clone(),
                    label_color,
                );

                if let Some(node) = node {
                    let row_rect = Rect::from_min_size(
                        egui::pos2(x, y),
                        egui::vec2(column_widths[col], row_h),
                    );
                    control_hits.push((row_rect, Action::LegendToggle(node, index)));
                }
            }
            x += column_widths[col] + 8.0;
        }
    }

    fn paint_glyph(
        &self,
        painter: &egui::Painter,
        origin: Pos2,
        width: f32,
        entry: &LegendEntry,
        egui_ctx: &egui::Context,
    ) {
        let style = &entry.style;
        let (stroke_color, fill_color) = if entry.inactive {
            let gray = Color32::from_rgb(170, 170, 170);
            (gray, gray.gamma_multiply(0.4))
        } else {
            (
                path_color(&style.color, style.opacity),
                path_color(style.effective_fill_color(), style.fill_opacity),
            )
        };
        let stroke = Stroke::new((style.weight as f32).clamp(1.0, 6.0), stroke_color);

        match &entry.glyph {
            Glyph::Circle { center, radius } => {
                let pos = origin + egui::vec2(center.0, center.1);
                if style.fill {
                    painter.circle_filled(pos, *radius, fill_color);
                }
                if style.stroke {
                    painter.circle_stroke(pos, *radius, stroke);
                }
            }
            Glyph::Polyline { y } => {
                let a = origin + egui::vec2(0.0, *y);
                let b = origin + egui::vec2(width, *y);
                painter.line_segment([a, b], stroke);
            }
            Glyph::Rectangle { min, max } => {
                let r = Rect::from_min_max(
                    origin + egui::vec2(min.0, min.1),
                    origin + egui::vec2(max.0, max.1),
                );
                if style.fill {
                    painter.rect_filled(r, CornerRadius::ZERO, fill_color);
                }
                if style.stroke {
                    painter.rect_stroke(r, CornerRadius::ZERO, stroke, StrokeKind::Inside);
                }
            }
            Glyph::Polygon { points } => {
                // The vertex list arrives closed; drop the repeat for egui
                let mut screen: Vec<Pos2> = points
                    .iter()
                    .map(|(x, y)| origin + egui::vec2(*x, *y))
                    .collect();
                if screen.len() >= 2 && screen.first() == screen.last() {
                    screen.pop();
                }
                if style.fill && screen.len() >= 3 {
                    painter.add(egui::Shape::convex_polygon(
                        screen.clone(),
                        fill_color,
                        Stroke::NONE,
                    ));
                }
                if style.stroke {
                    painter.add(egui::Shape::closed_line(screen, stroke));
                }
            }
            Glyph::Image { url } => {
                if let Some(texture) = self.tiles.get_image(url, egui_ctx) {
                    let r = Rect::from_min_size(origin, texture.size_vec2().min(egui::vec2(48.0, 48.0)));
                    painter.image(
                        texture.id(),
                        r,
                        Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Popups

    fn paint_popups(
        &self,
        painter: &egui::Painter,
        ctx: &PaintCtx,
        model: &MapModel,
        popup_hits: &mut Vec<(Rect, Rect, LayerId)>,
    ) {
        for (id, layer) in model.layers() {
            let Some(popup) = &layer.popup else {
                continue;
            };
            if !popup.open {
                continue;
            }
            let anchor = match &layer.kind {
                LayerKind::Marker(m) => Some(m.position),
                LayerKind::Circle(c) => Some(c.center),
                _ => model.layer_bounds(id).map(|b| b.center()),
            };
            let Some(anchor) = anchor else {
                continue;
            };
            let pos = ctx.to_screen(anchor) + egui::vec2(0.0, -18.0);

            let text = strip_markup(&popup.content);
            let galley =
                painter.layout_no_wrap(text.clone(), FontId::proportional(12.0), Color32::BLACK);
            let padding = egui::vec2(10.0, 8.0);
            let bubble = Rect::from_center_size(
                pos - egui::vec2(0.0, galley.size().y / 2.0 + padding.y),
                galley.size() + padding * 2.0 + egui::vec2(14.0, 0.0),
            );

            painter.rect_filled(bubble, CornerRadius::same(6), Color32::WHITE);
            painter.rect_stroke(
                bubble,
                CornerRadius::same(6),
                Stroke::new(1.0, Color32::from_rgb(150, 150, 150)),
                StrokeKind::Inside,
            );
            // Stem pointing at the anchor
            painter.add(egui::Shape::convex_polygon(
                vec![
                    bubble.center_bottom() + egui::vec2(-6.0, 0.0),
                    bubble.center_bottom() + egui::vec2(6.0, 0.0),
                    bubble.center_bottom() + egui::vec2(0.0, 8.0),
                ],
                Color32::WHITE,
                Stroke::NONE,
            ));
            painter.text(
                bubble.left_center() + egui::vec2(padding.x, 0.0),
                egui::Align2::LEFT_CENTER,
                &text,
                FontId::proportional(12.0),
                Color32::BLACK,
            );

            let close = Rect::from_center_size(
                bubble.right_top() + egui::vec2(-10.0, 10.0),
                egui::vec2(12.0, 12.0),
            );
            painter.text(
                close.center(),
                egui::Align2::CENTER_CENTER,
                "\u{2715}",
                FontId::proportional(10.0),
                Color32::from_rgb(120, 120, 120),
            );

            popup_hits.push((bubble, close, id));
        }
    }

    // ------------------------------------------------------------------
    // Inspector panel

    fn draw_inspector(&mut self, ui: &mut egui::Ui) {
        let doc = self.engine.document();

        ui.add_space(4.0);
        ui.label(
            egui::RichText::new("\u{25c8} DOCUMENT")
                .color(Color32::from_rgb(100, 200, 100))
                .size(14.0)
                .strong(),
        );
        if self.offline {
            ui.label(
                egui::RichText::new("OFFLINE - cached tiles only")
                    .color(Color32::from_rgb(255, 200, 50))
                    .size(10.0)
                    .monospace(),
            );
        }

        // Collect the element tree first so the borrow is released before
        // the selectable rows mutate the selection
        let mut rows: Vec<(NodeId, usize, String)> = Vec::new();
        collect_tree_rows(doc, doc.root(), 0, &mut rows);
        ui.label(
            egui::RichText::new(format!("ELEMENTS: {}", rows.len()))
                .color(Color32::from_rgb(150, 150, 150))
                .size(10.0)
                .monospace(),
        );
        ui.add_space(4.0);

        egui::ScrollArea::vertical()
            .max_height(220.0)
            .show(ui, |ui| {
                ui.push_id("document_tree", |ui| {
                    for (node, depth, label) in &rows {
                        let text = egui::RichText::new(format!(
                            "{}{}",
                            "  ".repeat(*depth),
                            label
                        ))
                        .size(11.0)
                        .monospace();
                        if ui
                            .selectable_label(self.selected == Some(*node), text)
                            .clicked()
                        {
                            self.selected = Some(*node);
                        }
                    }
                });
            });

        ui.add_space(6.0);
        ui.separator();
        ui.label(
            egui::RichText::new("\u{25c8} SELECTION")
                .color(Color32::from_rgb(100, 200, 100))
                .size(14.0)
                .strong(),
        );
        ui.add_space(2.0);
        self.draw_selection(ui);

        ui.add_space(6.0);
        ui.separator();
        ui.label(
            egui::RichText::new("\u{25c8} EVENTS")
                .color(Color32::from_rgb(100, 200, 100))
                .size(14.0)
                .strong(),
        );
        ui.label(
            egui::RichText::new(format!("TOTAL: {}", self.event_log.len()))
                .color(Color32::from_rgb(150, 150, 150))
                .size(10.0)
                .monospace(),
        );
        ui.add_space(4.0);

        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.push_id("event_log", |ui| {
                let now = Utc::now();
                for entry in self.event_log.iter().rev() {
                    let seconds_ago = (now - entry.at).num_seconds();
                    let name_color = if seconds_ago < 10 {
                        Color32::from_rgb(100, 255, 100)
                    } else if seconds_ago < 60 {
                        Color32::from_rgb(255, 200, 50)
                    } else {
                        Color32::from_rgb(150, 150, 150)
                    };

                    ui.horizontal(|ui| {
                        ui.label(
                            egui::RichText::new(entry.at.format("%H:%M:%S").to_string())
                                .color(Color32::from_rgb(100, 100, 100))
                                .size(9.0)
                                .monospace(),
                        );
                        ui.label(
                            egui::RichText::new(&entry.target)
                                .color(Color32::from_rgb(120, 170, 220))
                                .size(10.0)
                                .monospace(),
                        );
                        ui.label(
                            egui::RichText::new(entry.name)
                                .color(name_color)
                                .size(10.0)
                                .strong(),
                        );
                    });
                    if !entry.detail.is_empty() && entry.detail != "{}" {
                        ui.label(
                            egui::RichText::new(truncate_detail(&entry.detail, 96))
                                .color(Color32::from_rgb(120, 120, 120))
                                .size(9.0)
                                .monospace(),
                        );
                    }
                    ui.add_space(2.0);
                }
            });
        });
    }

    fn draw_selection(&mut self, ui: &mut egui::Ui) {
        let Some(node) = self.selected else {
            ui.label(
                egui::RichText::new("Select an element above")
                    .color(Color32::from_rgb(120, 120, 120))
                    .size(10.0),
            );
            return;
        };
        let doc = self.engine.document();
        let Some(name) = doc.element_name(node) else {
            self.selected = None;
            return;
        };

        ui.label(
            egui::RichText::new(format!("<{}>", name))
                .color(Color32::from_rgb(200, 220, 255))
                .size(11.0)
                .monospace()
                .strong(),
        );
        if let Some(feature) = self.engine.feature_of(node) {
            ui.label(
                egui::RichText::new(format!("{:?}", feature))
                    .color(Color32::from_rgb(130, 130, 130))
                    .size(9.0)
                    .monospace(),
            );
        }
        for (attr_name, value) in doc.attributes(node) {
            ui.horizontal(|ui| {
                ui.label(
                    egui::RichText::new(attr_name)
                        .color(Color32::from_rgb(150, 200, 150))
                        .size(10.0)
                        .monospace(),
                );
                ui.label(
                    egui::RichText::new(truncate_detail(value, 48))
                        .color(Color32::from_rgb(200, 200, 200))
                        .size(10.0)
                        .monospace(),
                );
            });
        }
        if let Some(error) = self.engine.geojson_error(node) {
            ui.label(
                egui::RichText::new(error)
                    .color(Color32::from_rgb(255, 90, 90))
                    .size(10.0),
            );
        }
    }
}

impl eframe::App for LeafmarkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Repaint periodically so background tile loads and watch-mode
        // geolocation show up without input
        ctx.request_repaint_after(Duration::from_millis(250));

        // Detect host fullscreen changes made outside the map's own button
        let host_fullscreen = ctx.input(|i| i.viewport().fullscreen).unwrap_or(false);
        if self.last_fullscreen != Some(host_fullscreen) {
            if self.last_fullscreen.is_some() {
                self.engine.host_fullscreen_changed(host_fullscreen);
            }
            self.last_fullscreen = Some(host_fullscreen);
        }

        // Pseudo fullscreen maximizes the map pane by hiding the inspector
        let pseudo = self
            .engine
            .maps()
            .any(|(_, model)| model.is_pseudo_fullscreen());
        if !pseudo {
            egui::SidePanel::right("inspector")
                .resizable(true)
                .default_width(330.0)
                .show(ctx, |ui| {
                    self.draw_inspector(ui);
                });
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                self.draw_map(ui);
            });

        for command in self.engine.take_host_commands() {
            match command {
                HostCommand::SetFullscreen(on) => {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(on));
                }
            }
        }

        for event in self.engine.take_events() {
            let target = describe_node(self.engine.document(), event.target);
            self.event_log.push_back(LogEntry {
                at: Utc::now(),
                target,
                name: event.name,
                detail: event.detail.to_string(),
            });
        }
        while self.event_log.len() > EVENT_LOG_CAP {
            self.event_log.pop_front();
        }
    }
}

// ----------------------------------------------------------------------
// Free helpers

fn collect_paint_order(
    model: &MapModel,
    ids: &[LayerId],
    tiles: &mut Vec<LayerId>,
    vectors: &mut Vec<LayerId>,
    markers: &mut Vec<LayerId>,
) {
    for id in ids {
        let Some(layer) = model.layer(*id) else {
            continue;
        };
        match &layer.kind {
            LayerKind::Tile(_) => tiles.push(*id),
            LayerKind::Marker(_) => markers.push(*id),
            LayerKind::Group(group) => {
                collect_paint_order(model, &group.members, tiles, vectors, markers);
            }
            _ => vectors.push(*id),
        }
    }
}

fn resolve_click(
    click: Pos2,
    ctx: &PaintCtx,
    popup_hits: &[(Rect, Rect, LayerId)],
    control_hits: &[(Rect, Action)],
    layer_hits: &[LayerHit],
) -> Vec<Action> {
    // Popups are painted last, so they are topmost
    for (bubble, close, id) in popup_hits.iter().rev() {
        if close.contains(click) {
            return vec![Action::ClosePopup(*id)];
        }
        if bubble.contains(click) {
            return Vec::new();
        }
    }
    for (rect, action) in control_hits.iter().rev() {
        if rect.contains(click) {
            return vec![*action];
        }
    }
    let position = ctx.to_latlng(click);
    let nearest = layer_hits
        .iter()
        .filter(|hit| hit.pos.distance(click) <= hit.radius)
        .min_by(|a, b| a.pos.distance(click).total_cmp(&b.pos.distance(click)));
    if let Some(hit) = nearest {
        return vec![Action::LayerClick(hit.layer, position)];
    }
    vec![Action::MapClick(position)]
}

fn corner_index(position: ControlPosition) -> usize {
    match position {
        ControlPosition::TopLeft => 0,
        ControlPosition::TopRight => 1,
        ControlPosition::BottomLeft => 2,
        ControlPosition::BottomRight => 3,
    }
}

/// Anchor a control of the given size in its corner and advance that
/// corner's stacking cursor.
fn place_control(
    rect: Rect,
    position: ControlPosition,
    size: egui::Vec2,
    cursors: &mut [f32; 4],
) -> Pos2 {
    let index = corner_index(position);
    let cursor = cursors[index];
    cursors[index] += size.y + 10.0;
    match position {
        ControlPosition::TopLeft => rect.left_top() + egui::vec2(10.0, cursor),
        ControlPosition::TopRight => rect.right_top() + egui::vec2(-10.0 - size.x, cursor),
        ControlPosition::BottomLeft => {
            rect.left_bottom() + egui::vec2(10.0, -cursor - size.y)
        }
        ControlPosition::BottomRight => {
            rect.right_bottom() + egui::vec2(-10.0 - size.x, -cursor - size.y)
        }
    }
}

fn paint_control_button(painter: &egui::Painter, rect: Rect, glyph: &str) {
    painter.rect_filled(
        rect,
        CornerRadius::same(4),
        Color32::from_rgba_unmultiplied(255, 255, 255, 235),
    );
    painter.rect_stroke(
        rect,
        CornerRadius::same(4),
        Stroke::new(1.0, Color32::from_rgba_unmultiplied(100, 100, 100, 200)),
        StrokeKind::Inside,
    );
    painter.text(
        rect.center(),
        egui::Align2::CENTER_CENTER,
        glyph,
        FontId::proportional(16.0),
        Color32::from_rgb(40, 40, 40),
    );
}

fn paint_default_pin(painter: &egui::Painter, pos: Pos2, alpha: u8) {
    let fill = Color32::from_rgba_unmultiplied(51, 136, 255, alpha);
    let ring = Color32::from_rgba_unmultiplied(255, 255, 255, alpha);
    painter.circle_filled(pos, 7.0, fill);
    painter.circle_stroke(pos, 7.0, Stroke::new(2.0, ring));
    painter.circle_filled(pos, 2.0, ring);
}

fn paint_path_circle(painter: &egui::Painter, pos: Pos2, radius: f32, style: &PathOptions) {
    if style.fill {
        painter.circle_filled(
            pos,
            radius,
            path_color(style.effective_fill_color(), style.fill_opacity),
        );
    }
    if style.stroke {
        painter.circle_stroke(
            pos,
            radius,
            Stroke::new(style.weight as f32, path_color(&style.color, style.opacity)),
        );
    }
}

fn paint_path_line(painter: &egui::Painter, points: Vec<Pos2>, style: &PathOptions) {
    if !style.stroke || points.len() < 2 {
        return;
    }
    painter.add(egui::Shape::line(
        points,
        Stroke::new(style.weight as f32, path_color(&style.color, style.opacity)),
    ));
}

fn paint_path_polygon(painter: &egui::Painter, points: Vec<Pos2>, style: &PathOptions) {
    if points.len() < 3 {
        return;
    }
    if style.fill {
        painter.add(egui::Shape::convex_polygon(
            points.clone(),
            path_color(style.effective_fill_color(), style.fill_opacity),
            Stroke::NONE,
        ));
    }
    if style.stroke {
        painter.add(egui::Shape::closed_line(
            points,
            Stroke::new(style.weight as f32, path_color(&style.color, style.opacity)),
        ));
    }
}

fn paint_status_bubble(painter: &egui::Painter, rect: Rect, message: &str) {
    let is_error = message.contains("Failed");
    let bg_color = if is_error {
        Color32::from_rgb(220, 50, 50)
    } else {
        Color32::from_rgb(255, 200, 100)
    };

    let pos = rect.center_top() + egui::vec2(0.0, 20.0);
    let galley = painter.layout_no_wrap(
        message.to_string(),
        FontId::proportional(12.0),
        Color32::WHITE,
    );
    let padding = egui::vec2(12.0, 6.0);
    let bubble = Rect::from_center_size(pos, galley.size() + padding * 2.0);

    painter.rect_filled(bubble, CornerRadius::same(5), bg_color);
    painter.text(
        pos,
        egui::Align2::CENTER_CENTER,
        message,
        FontId::proportional(12.0),
        Color32::WHITE,
    );
}

fn collect_tree_rows(doc: &Document, node: NodeId, depth: usize, rows: &mut Vec<(NodeId, usize, String)>) {
    for child in doc.children(node) {
        if doc.is_element(*child) {
            rows.push((*child, depth, describe_node(doc, *child)));
            collect_tree_rows(doc, *child, depth + 1, rows);
        }
    }
}

fn describe_node(doc: &Document, node: NodeId) -> String {
    let name = doc.element_name(node).unwrap_or("#text");
    match doc.attr(node, "id") {
        Some(id) => format!("{}#{}", name, id),
        None => name.to_string(),
    }
}

/// GeoJSON positions are `[lng, lat]`
fn geojson_position(value: &serde_json::Value) -> Option<LatLng> {
    let lng = value.get(0)?.as_f64()?;
    let lat = value.get(1)?.as_f64()?;
    Some(LatLng::new(lat, lng))
}

fn geojson_positions(value: &serde_json::Value) -> Vec<LatLng> {
    value
        .as_array()
        .map(|coords| coords.iter().filter_map(geojson_position).collect())
        .unwrap_or_default()
}

fn path_color(css: &str, opacity: f64) -> Color32 {
    let base = parse_css_color(css);
    Color32::from_rgba_unmultiplied(
        base.r(),
        base.g(),
        base.b(),
        (opacity.clamp(0.0, 1.0) * 255.0) as u8,
    )
}

/// Parse the CSS color forms the styling attributes use: `#rgb`,
/// `#rrggbb`, `rgb()` / `rgba()`, and the common named colors. Unknown
/// values fall back to the default path blue.
fn parse_css_color(raw: &str) -> Color32 {
    const FALLBACK: Color32 = Color32::from_rgb(51, 136, 255);

    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#') {
        let nibble = |c: char| c.to_digit(16).map(|v| v as u8);
        let chars: Vec<char> = hex.chars().collect();
        return match chars.len() {
            3 => {
                let mut out = [0_u8; 3];
                for (i, c) in chars.iter().enumerate() {
                    match nibble(*c) {
                        Some(v) => out[i] = v * 16 + v,
                        None => return FALLBACK,
                    }
                }
                Color32::from_rgb(out[0], out[1], out[2])
            }
            6 => {
                let mut out = [0_u8; 3];
                for i in 0..3 {
                    match (nibble(chars[i * 2]), nibble(chars[i * 2 + 1])) {
                        (Some(hi), Some(lo)) => out[i] = hi * 16 + lo,
                        _ => return FALLBACK,
                    }
                }
                Color32::from_rgb(out[0], out[1], out[2])
            }
            _ => FALLBACK,
        };
    }

    if let Some(body) = raw
        .strip_prefix("rgba(")
        .or_else(|| raw.strip_prefix("rgb("))
        .and_then(|s| s.strip_suffix(')'))
    {
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        if parts.len() >= 3 {
            let channel = |s: &str| s.parse::<f64>().ok().map(|v| v.clamp(0.0, 255.0) as u8);
            if let (Some(r), Some(g), Some(b)) =
                (channel(parts[0]), channel(parts[1]), channel(parts[2]))
            {
                return Color32::from_rgb(r, g, b);
            }
        }
        return FALLBACK;
    }

    match raw.to_ascii_lowercase().as_str() {
        "black" => Color32::from_rgb(0, 0, 0),
        "white" => Color32::from_rgb(255, 255, 255),
        "red" => Color32::from_rgb(255, 0, 0),
        "green" => Color32::from_rgb(0, 128, 0),
        "blue" => Color32::from_rgb(0, 0, 255),
        "yellow" => Color32::from_rgb(255, 255, 0),
        "orange" => Color32::from_rgb(255, 165, 0),
        "purple" => Color32::from_rgb(128, 0, 128),
        "cyan" => Color32::from_rgb(0, 255, 255),
        "magenta" => Color32::from_rgb(255, 0, 255),
        "gray" | "grey" => Color32::from_rgb(128, 128, 128),
        "brown" => Color32::from_rgb(165, 42, 42),
        "pink" => Color32::from_rgb(255, 192, 203),
        _ => FALLBACK,
    }
}

/// Flatten markup to plain text: drop tags, decode the common entities,
/// collapse whitespace.
fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    let decoded = out
        .replace("&copy;", "\u{a9}")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_detail(raw: &str, max: usize) -> String {
    if raw.chars().count() > max {
        let mut out: String = raw.chars().take(max).collect();
        out.push('\u{2026}');
        out
    } else {
        raw.to_string()
    }
}

/// Round a scale length down to a 1/2/3/5 multiple of a power of ten.
fn round_scale(num: f64) -> f64 {
    if num <= 0.0 {
        return 0.0;
    }
    let pow10 = 10_f64.powi(num.log10().floor() as i32);
    let d = num / pow10;
    let d = if d >= 10.0 {
        10.0
    } else if d >= 5.0 {
        5.0
    } else if d >= 3.0 {
        3.0
    } else if d >= 2.0 {
        2.0
    } else {
        1.0
    };
    pow10 * d
}

fn fmt_scale(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        (value.round() as i64).to_string()
    } else {
        value.to_string()
    }
}

/// Rounded metric bar: fraction of the max width to draw, and its label.
fn metric_scale(max_meters: f64) -> (f64, String) {
    let meters = round_scale(max_meters);
    let label = if meters < 1000.0 {
        format!("{} m", fmt_scale(meters))
    } else {
        format!("{} km", fmt_scale(meters / 1000.0))
    };
    (meters / max_meters, label)
}

/// Rounded imperial bar, in feet below one mile and miles above.
fn imperial_scale(max_meters: f64) -> (f64, String) {
    let max_feet = max_meters * 3.280_839_9;
    if max_feet > 5280.0 {
        let max_miles = max_feet / 5280.0;
        let miles = round_scale(max_miles);
        (miles / max_miles, format!("{} mi", fmt_scale(miles)))
    } else {
        let feet = round_scale(max_feet);
        (feet / max_feet, format!("{} ft", fmt_scale(feet)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_css_color_forms() {
        assert_eq!(parse_css_color("#03f"), Color32::from_rgb(0, 51, 255));
        assert_eq!(parse_css_color("#3388ff"), Color32::from_rgb(51, 136, 255));
        assert_eq!(parse_css_color("rgb(10, 20, 30)"), Color32::from_rgb(10, 20, 30));
        assert_eq!(
            parse_css_color("rgba(10, 20, 30, 0.5)"),
            Color32::from_rgb(10, 20, 30)
        );
        assert_eq!(parse_css_color("RED"), Color32::from_rgb(255, 0, 0));
        // Unknown names fall back to the path default
        assert_eq!(parse_css_color("mauve-ish"), Color32::from_rgb(51, 136, 255));
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("<b>Eiffel Tower</b><br>Paris"),
            "Eiffel TowerParis"
        );
        assert_eq!(
            strip_markup("Map data &copy; <a href=\"x\">OpenStreetMap</a> contributors"),
            "Map data \u{a9} OpenStreetMap contributors"
        );
        assert_eq!(strip_markup("  a   b  "), "a b");
    }

    #[test]
    fn test_round_scale_steps() {
        assert_eq!(round_scale(1234.0), 1000.0);
        assert_eq!(round_scale(2600.0), 2000.0);
        assert_eq!(round_scale(3500.0), 3000.0);
        assert_eq!(round_scale(7800.0), 5000.0);
        assert_eq!(round_scale(87.0), 50.0);
    }

    #[test]
    fn test_metric_scale_labels() {
        let (_, label) = metric_scale(640.0);
        assert_eq!(label, "500 m");
        let (_, label) = metric_scale(2600.0);
        assert_eq!(label, "2 km");
    }

    #[test]
    fn test_imperial_scale_labels() {
        // 200 m is about 656 ft, rounded down to 500 ft
        let (_, label) = imperial_scale(200.0);
        assert_eq!(label, "500 ft");
        // 10 km is about 6.2 mi, rounded down to 5 mi
        let (_, label) = imperial_scale(10_000.0);
        assert_eq!(label, "5 mi");
    }

    #[test]
    fn test_truncate_detail_keeps_short_strings() {
        assert_eq!(truncate_detail("abc", 10), "abc");
        assert_eq!(truncate_detail("abcdefghij", 4), "abcd\u{2026}");
    }
}
