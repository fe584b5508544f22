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

//! Declarative map engine: binds a [`Document`] of `leaflet-*` elements to
//! live [`MapModel`] instances.
//!
//! The engine owns both sides of the binding. Markup flows one way:
//! element attributes and children describe markers, shapes, tile layers,
//! and controls, and [`Engine::flush`] turns recorded document mutations
//! into model calls. A handful of facts flow the other way, view center
//! and zoom after a move and geolocation fixes, as attribute writes on the
//! source elements. Events emitted by the models are re-dispatched against
//! the elements that registered for them and drained through
//! [`Engine::take_events`].
//!
//! Containers propagate top-down. A map element hands `Container::Map` to
//! its direct children once its model exists; a layer group hands
//! `Container::Group` to its direct children once its own layer exists.
//! Elements that are not part of the vocabulary get no state, so a plain
//! wrapper element breaks the chain below it. An element whose required
//! attributes are incomplete holds its container and builds its feature on
//! the first attribute change that completes the set.

mod controls;
mod data;
mod groups;
mod legend;
mod map_root;
mod marker;
mod shapes;
mod style;
mod tiles;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use log::warn;
use serde_json::Value;

use crate::dom::{Document, Mutation, NodeId, Tag};
use crate::error::Error;
use crate::geo::LatLng;
use crate::locate::Locator;
use crate::map::control::{ControlId, FullscreenAction, FullscreenToggle};
use crate::map::events::{EventTarget, MapEvent, SubscriptionId};
use crate::map::layer::{Layer, LayerId};
use crate::map::{MapId, MapModel};

use data::{GeolocationState, IconCache};
use groups::GeoJsonState;
use map_root::MapRootState;

// Upper bound on mutation/event settle rounds within a single flush
const MAX_FLUSH_ROUNDS: usize = 8;

/// Where a feature-bearing element attaches: directly to a map, or to a
/// layer group nested somewhere under one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Map(MapId),
    Group { map: MapId, group: LayerId },
}

impl Container {
    /// The map at the root of the container chain.
    #[must_use]
    pub fn map(self) -> MapId {
        match self {
            Self::Map(map) | Self::Group { map, .. } => map,
        }
    }
}

/// The engine-side object an element currently drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Map(MapId),
    Layer { map: MapId, layer: LayerId },
    Control { map: MapId, control: ControlId },
}

/// An event re-dispatched on an element, ready for the host to deliver to
/// its listeners.
#[derive(Debug, Clone)]
pub struct DomEvent {
    pub target: NodeId,
    pub name: &'static str,
    pub detail: Value,
}

/// Request for a capability only the embedding window can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    SetFullscreen(bool),
}

/// Extra state carried by elements that are more than a thin feature
/// wrapper.
#[derive(Debug, Default)]
enum ElementData {
    #[default]
    None,
    MapRoot(MapRootState),
    Icon(IconCache),
    GeoJson(GeoJsonState),
    Geolocation(GeolocationState),
    Fullscreen(FullscreenToggle),
}

/// Per-element bookkeeping. Created when a recognized element connects,
/// dropped when it disconnects, so a re-inserted element starts a fresh
/// lifecycle.
#[derive(Debug, Default)]
struct ElementState {
    container: Option<Container>,
    feature: Option<Feature>,
    subscriptions: Vec<SubscriptionId>,
    data: ElementData,
}

/// One registered event forwarding. Model events matching `map`, `target`
/// and `name` are re-dispatched on `node`.
#[derive(Debug)]
struct Forward {
    id: SubscriptionId,
    map: MapId,
    target: EventTarget,
    name: &'static str,
    node: NodeId,
}

/// The binding between one document and the maps it declares.
pub struct Engine {
    doc: Document,
    maps: BTreeMap<MapId, MapModel>,
    states: HashMap<NodeId, ElementState>,
    forwards: Vec<Forward>,
    // Subscriptions of torn-down elements. Kept until after the next event
    // pump so removal events still reach the element that owned them.
    dead_subscriptions: Vec<SubscriptionId>,
    out_events: VecDeque<DomEvent>,
    host_commands: VecDeque<HostCommand>,
    locator: Option<Box<dyn Locator + Send>>,
    host_fullscreen_capable: bool,
    host_fullscreen_target: Option<MapId>,
    next_map: u64,
    next_subscription: u64,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("maps", &self.maps.len())
            .field("states", &self.states.len())
            .field("forwards", &self.forwards.len())
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            doc: Document::new(),
            maps: BTreeMap::new(),
            states: HashMap::new(),
            forwards: Vec::new(),
            dead_subscriptions: Vec::new(),
            out_events: VecDeque::new(),
            host_commands: VecDeque::new(),
            locator: None,
            host_fullscreen_capable: false,
            host_fullscreen_target: None,
            next_map: 1,
            next_subscription: 1,
        }
    }

    /// Parse markup and process the resulting document in one step. Maps
    /// declared in the markup stay dormant until the host reports a
    /// visible viewport through [`Engine::set_map_viewport`].
    pub fn from_markup(markup: &str) -> Result<Self, Error> {
        let mut engine = Self::new();
        engine.doc = Document::from_markup(markup)?;
        engine.flush()?;
        Ok(engine)
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Install the source of geolocation fixes. Without one, geolocation
    /// elements report a position-unavailable error.
    pub fn install_locator(&mut self, locator: impl Locator + Send + 'static) {
        self.locator = Some(Box::new(locator));
    }

    /// Tell the engine whether the embedding window can go fullscreen.
    /// Fullscreen toggles fall back to pseudo-fullscreen when it cannot.
    pub fn set_host_fullscreen_capable(&mut self, capable: bool) {
        self.host_fullscreen_capable = capable;
    }

    // ------------------------------------------------------------------
    // The flush pipeline

    /// Process everything that accumulated since the last call: document
    /// mutations, pending map initializations, geolocation polls, and
    /// model events. Runs repeated rounds until the document and the
    /// models agree, since reacting to an event may write attributes and
    /// writing attributes may emit events.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.poll_locations()?;
        for round in 0.. {
            let mutations = self.doc.take_mutations();
            let had_mutations = !mutations.is_empty();
            self.apply_mutations(mutations)?;
            self.check_map_init()?;
            let pumped = self.pump_map_events()?;
            self.reap_subscriptions();
            if !had_mutations && !pumped {
                break;
            }
            if round + 1 == MAX_FLUSH_ROUNDS {
                warn!("Flush did not settle after {MAX_FLUSH_ROUNDS} rounds, deferring remaining work");
                break;
            }
        }
        Ok(())
    }

    /// Report the rendered size and visibility of a map element. The
    /// map's model is built on the next [`Engine::flush`] after the
    /// element is both connected and visibly sized.
    pub fn set_map_viewport(&mut self, node: NodeId, width: f32, height: f32, visible: bool) {
        let Some(state) = self.states.get_mut(&node) else {
            return;
        };
        let ElementData::MapRoot(root) = &mut state.data else {
            return;
        };
        root.size = (width, height);
        root.visible = visible;
        let feature = state.feature;
        if let Some(Feature::Map(map)) = feature {
            let resized = match self.maps.get_mut(&map) {
                Some(model) => {
                    let before = model.size();
                    model.set_size(width, height);
                    before != (width, height)
                }
                None => false,
            };
            if resized && self.doc.attr_bool(node, "fit-to-markers") {
                map_root::fit_to_layers(self, map, node);
            }
        }
    }

    /// Drain the events re-dispatched on elements since the last call.
    pub fn take_events(&mut self) -> Vec<DomEvent> {
        self.out_events.drain(..).collect()
    }

    /// Drain pending requests to the embedding window.
    pub fn take_host_commands(&mut self) -> Vec<HostCommand> {
        self.host_commands.drain(..).collect()
    }

    // ------------------------------------------------------------------
    // Lookup

    #[must_use]
    pub fn map(&self, id: MapId) -> Option<&MapModel> {
        self.maps.get(&id)
    }

    pub fn map_mut(&mut self, id: MapId) -> Option<&mut MapModel> {
        self.maps.get_mut(&id)
    }

    pub fn maps(&self) -> impl Iterator<Item = (MapId, &MapModel)> {
        self.maps.iter().map(|(id, model)| (*id, model))
    }

    /// The map an element belongs to, through its own feature or through
    /// its container when no feature exists yet.
    #[must_use]
    pub fn map_of(&self, node: NodeId) -> Option<MapId> {
        let state = self.states.get(&node)?;
        match state.feature {
            Some(Feature::Map(map))
            | Some(Feature::Layer { map, .. })
            | Some(Feature::Control { map, .. }) => Some(map),
            None => state.container.map(Container::map),
        }
    }

    #[must_use]
    pub fn feature_of(&self, node: NodeId) -> Option<Feature> {
        self.states.get(&node)?.feature
    }

    #[must_use]
    pub fn container_of(&self, node: NodeId) -> Option<Container> {
        self.states.get(&node)?.container
    }

    /// The parse error of a GeoJSON element's inline data, if its last
    /// parse failed.
    #[must_use]
    pub fn geojson_error(&self, node: NodeId) -> Option<&str> {
        match &self.states.get(&node)?.data {
            ElementData::GeoJson(geo) => geo.parse_error.as_deref(),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Host interactions

    /// Apply a marker drag performed in the host view. The new position
    /// reflects onto the element's `latitude`/`longitude` attributes.
    pub fn marker_dragged(&mut self, node: NodeId, position: LatLng) -> Result<(), Error> {
        let Some(Feature::Layer { map, layer }) = self.feature_of(node) else {
            warn!("Attempted to drag marker with no live feature");
            return Ok(());
        };
        if let Some(model) = self.maps.get_mut(&map) {
            model.set_marker_latlng(layer, position);
        }
        self.doc
            .set_attribute(node, "latitude", &position.lat.to_string())?;
        self.doc
            .set_attribute(node, "longitude", &position.lng.to_string())?;
        Ok(())
    }

    /// Override the data of a GeoJSON element, or clear the override so
    /// it falls back to its inline `<script>` child. The layer is rebuilt
    /// from scratch either way.
    pub fn set_geojson_data(&mut self, node: NodeId, value: Option<Value>) -> Result<(), Error> {
        {
            let Some(state) = self.states.get_mut(&node) else {
                warn!("Attempted to set data on non-existent GeoJSON element");
                return Ok(());
            };
            let ElementData::GeoJson(geo) = &mut state.data else {
                warn!("Attempted to set GeoJSON data on a non-GeoJSON element");
                return Ok(());
            };
            geo.override_data = value;
            geo.parse_error = None;
        }
        self.remove_feature(node)?;
        self.try_create_feature(node)
    }

    /// Toggle fullscreen for the map behind a fullscreen control element.
    /// Uses the embedding window when it is capable and the control does
    /// not force pseudo-fullscreen; otherwise the map maximizes within
    /// its own viewport.
    pub fn toggle_fullscreen(&mut self, node: NodeId) -> Result<(), Error> {
        let Some(state) = self.states.get(&node) else {
            return Ok(());
        };
        let Some(Feature::Control { map, .. }) = state.feature else {
            return Ok(());
        };
        let ElementData::Fullscreen(toggle) = &state.data else {
            return Ok(());
        };
        let toggle = toggle.clone();
        let Some(model) = self.maps.get_mut(&map) else {
            return Ok(());
        };
        let action = toggle.decide(
            model.is_fullscreen(),
            model.is_pseudo_fullscreen(),
            self.host_fullscreen_capable,
        );
        match action {
            FullscreenAction::Pseudo(on) => model.set_pseudo_fullscreen(on),
            FullscreenAction::Host(on) => {
                self.host_commands.push_back(HostCommand::SetFullscreen(on));
                self.host_fullscreen_target = on.then_some(map);
            }
        }
        Ok(())
    }

    /// Report that the embedding window entered or left fullscreen. The
    /// map that requested the change updates its state and notifies its
    /// indicator controls.
    pub fn host_fullscreen_changed(&mut self, fullscreen: bool) {
        let Some(map) = self.host_fullscreen_target else {
            return;
        };
        if let Some(model) = self.maps.get_mut(&map) {
            model.set_fullscreen(fullscreen);
        }
        if !fullscreen {
            self.host_fullscreen_target = None;
        }
    }

    /// Toggle one legend entry between active and inactive. The change
    /// reflects onto the backing symbol element.
    pub fn legend_toggle_entry(&mut self, node: NodeId, index: usize) -> Result<(), Error> {
        legend::toggle_entry(self, node, index)
    }

    /// Expand or collapse a legend. Entries are rebuilt on expansion so
    /// the panel reflects the current symbol children.
    pub fn legend_set_expanded(&mut self, node: NodeId, expanded: bool) -> Result<(), Error> {
        legend::set_expanded(self, node, expanded)
    }

    // ------------------------------------------------------------------
    // Mutation handling

    fn apply_mutations(&mut self, mutations: Vec<Mutation>) -> Result<(), Error> {
        // Child-list and subtree notifications coalesce per flush round;
        // ten point edits rebuild their polyline once
        let mut seen_child_lists = HashSet::new();
        let mut seen_subtrees = HashSet::new();
        for mutation in mutations {
            match mutation {
                Mutation::Connected(node) => self.element_connected(node)?,
                Mutation::Disconnected(node) => self.element_disconnected(node)?,
                Mutation::AttributeChanged { node, name } => {
                    self.attribute_changed(node, &name)?;
                }
                Mutation::ChildListChanged(node) => {
                    if seen_child_lists.insert(node) {
                        self.children_changed(node)?;
                    }
                }
                Mutation::SubtreeChanged(node) => {
                    if seen_subtrees.insert(node) {
                        self.subtree_changed(node)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn element_connected(&mut self, node: NodeId) -> Result<(), Error> {
        let Some(tag) = self.doc.tag(node) else {
            return Ok(());
        };
        if tag == Tag::Other {
            return Ok(());
        }
        let state = self.states.entry(node).or_default();
        state.data = match tag {
            Tag::Map => ElementData::MapRoot(MapRootState::default()),
            Tag::Icon | Tag::DivIcon => ElementData::Icon(IconCache::default()),
            Tag::GeoJson => ElementData::GeoJson(GeoJsonState::default()),
            Tag::Geolocation => ElementData::Geolocation(GeolocationState::default()),
            _ => ElementData::None,
        };
        if let Some(container) = self.inherited_container(node) {
            if let Some(state) = self.states.get_mut(&node) {
                state.container = Some(container);
            }
            self.try_create_feature(node)?;
        }
        Ok(())
    }

    fn element_disconnected(&mut self, node: NodeId) -> Result<(), Error> {
        let Some(state) = self.states.remove(&node) else {
            return Ok(());
        };
        match state.feature {
            Some(Feature::Map(map)) => self.remove_map(map)?,
            Some(Feature::Layer { map, layer }) => {
                if let Some(model) = self.maps.get_mut(&map) {
                    // A parent group disconnecting first already removed
                    // its members from the model
                    if model.layer(layer).is_some() {
                        model.remove_layer(layer);
                    }
                }
            }
            Some(Feature::Control { map, control }) => {
                if let Some(model) = self.maps.get_mut(&map) {
                    model.remove_control(control);
                }
            }
            None => {}
        }
        self.dead_subscriptions.extend(state.subscriptions);
        Ok(())
    }

    fn attribute_changed(&mut self, node: NodeId, name: &str) -> Result<(), Error> {
        match self.doc.tag(node) {
            Some(Tag::Map) => map_root::attribute_changed(self, node, name),
            Some(Tag::Marker) => marker::attribute_changed(self, node, name),
            Some(Tag::Circle) => shapes::circle_attribute_changed(self, node, name),
            Some(tag @ (Tag::TileLayer | Tag::TileLayerWms)) => {
                tiles::attribute_changed(self, node, tag, name)
            }
            Some(Tag::Icon | Tag::DivIcon) => {
                data::icon_changed(self, node);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn children_changed(&mut self, node: NodeId) -> Result<(), Error> {
        match self.doc.tag(node) {
            Some(Tag::Map) => map_root::children_changed(self, node),
            Some(Tag::LayerGroup) => groups::children_changed(self, node),
            Some(Tag::Legend) => legend::refresh(self, node),
            _ => Ok(()),
        }
    }

    fn subtree_changed(&mut self, node: NodeId) -> Result<(), Error> {
        match self.doc.tag(node) {
            Some(Tag::Marker | Tag::Circle) => self.refresh_popup(node),
            Some(Tag::Polyline | Tag::Polygon) => {
                shapes::points_changed(self, node)?;
                self.refresh_popup(node)
            }
            Some(Tag::GeoJson) => groups::content_changed(self, node),
            Some(Tag::Legend) => legend::refresh(self, node),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Containers and features

    /// The container a freshly connected element inherits from its direct
    /// parent. Only live maps and layer groups hand one down; any other
    /// parent, including a plain wrapper element, yields none.
    fn inherited_container(&self, node: NodeId) -> Option<Container> {
        let parent = self.doc.parent(node)?;
        let state = self.states.get(&parent)?;
        match state.feature? {
            Feature::Map(map) => Some(Container::Map(map)),
            Feature::Layer { map, layer } if self.doc.tag(parent) == Some(Tag::LayerGroup) => {
                Some(Container::Group { map, group: layer })
            }
            _ => None,
        }
    }

    /// Hand `container` to every direct child of `parent` that can hold
    /// one. A child already bound elsewhere is torn down and rebuilt in
    /// the new container.
    fn propagate_containers(&mut self, parent: NodeId, container: Container) -> Result<(), Error> {
        let children: Vec<NodeId> = self.doc.children(parent).to_vec();
        for child in children {
            let Some(existing) = self.states.get(&child).map(|s| s.container) else {
                continue;
            };
            if existing == Some(container) {
                continue;
            }
            if existing.is_some() {
                self.remove_feature(child)?;
            }
            if let Some(state) = self.states.get_mut(&child) {
                state.container = Some(container);
            }
            self.try_create_feature(child)?;
        }
        Ok(())
    }

    /// Build the feature for an element whose container is known. Does
    /// nothing when the element already has one or still misses required
    /// attributes.
    fn try_create_feature(&mut self, node: NodeId) -> Result<(), Error> {
        let Some(state) = self.states.get(&node) else {
            return Ok(());
        };
        if state.feature.is_some() {
            return Ok(());
        }
        let Some(container) = state.container else {
            return Ok(());
        };
        let Some(tag) = self.doc.tag(node) else {
            return Ok(());
        };
        match tag {
            Tag::Marker => marker::create(self, node, container),
            Tag::Circle => shapes::create_circle(self, node, container),
            Tag::Polyline => shapes::create_shape(self, node, container, false),
            Tag::Polygon => shapes::create_shape(self, node, container, true),
            Tag::TileLayer => tiles::create(self, node, container, false),
            Tag::TileLayerWms => tiles::create(self, node, container, true),
            Tag::LayerGroup => groups::create_group(self, node, container),
            Tag::GeoJson => groups::create_geojson(self, node, container),
            Tag::Geolocation => data::start_geolocation(self, node, container),
            Tag::ZoomControl | Tag::ScaleControl | Tag::FullscreenControl => {
                controls::create(self, node, tag, container)
            }
            Tag::Legend => legend::create(self, node, container),
            _ => Ok(()),
        }
    }

    /// Place a layer into a container and bind it to `node` as its
    /// feature. Returns the allocated id, or `None` when the container no
    /// longer exists.
    fn place_layer(&mut self, node: NodeId, container: Container, layer: Layer) -> Option<LayerId> {
        let id = match container {
            Container::Map(map) => {
                let model = self.maps.get_mut(&map)?;
                Some(model.add_layer(layer))
            }
            Container::Group { map, group } => {
                let model = self.maps.get_mut(&map)?;
                model.add_layer_in(group, layer)
            }
        }?;
        if let Some(state) = self.states.get_mut(&node) {
            state.feature = Some(Feature::Layer {
                map: container.map(),
                layer: id,
            });
        }
        Some(id)
    }

    /// Tear down an element's feature while keeping its state, so it can
    /// be rebuilt for a new container or from new data.
    fn remove_feature(&mut self, node: NodeId) -> Result<(), Error> {
        let (subscriptions, feature) = {
            let Some(state) = self.states.get_mut(&node) else {
                return Ok(());
            };
            if let ElementData::Geolocation(geo) = &mut state.data {
                geo.active = false;
                geo.pending = false;
            }
            (std::mem::take(&mut state.subscriptions), state.feature.take())
        };
        self.dead_subscriptions.extend(subscriptions);
        match feature {
            Some(Feature::Map(map)) => self.remove_map(map)?,
            Some(Feature::Layer { map, layer }) => {
                if let Some(model) = self.maps.get_mut(&map) {
                    if model.layer(layer).is_some() {
                        model.remove_layer(layer);
                    }
                }
            }
            Some(Feature::Control { map, control }) => {
                if let Some(model) = self.maps.get_mut(&map) {
                    model.remove_control(control);
                }
            }
            None => {}
        }
        Ok(())
    }

    fn remove_map(&mut self, map: MapId) -> Result<(), Error> {
        let Some(mut model) = self.maps.remove(&map) else {
            return Ok(());
        };
        model.emit_map_event("unload", Value::Null);
        let events = model.take_events();
        self.route_events(map, events)?;
        self.forwards.retain(|forward| forward.map != map);
        if self.host_fullscreen_target == Some(map) {
            self.host_fullscreen_target = None;
            self.host_commands
                .push_back(HostCommand::SetFullscreen(false));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Map initialization and events

    /// Build models for map elements that became ready: connected, with a
    /// visible, non-empty viewport.
    fn check_map_init(&mut self) -> Result<(), Error> {
        let ready: Vec<NodeId> = self
            .states
            .iter()
            .filter_map(|(node, state)| {
                if state.feature.is_some() {
                    return None;
                }
                match &state.data {
                    ElementData::MapRoot(root)
                        if root.visible && root.size.0 > 0.0 && root.size.1 > 0.0 =>
                    {
                        Some(*node)
                    }
                    _ => None,
                }
            })
            .collect();
        for node in ready {
            map_root::init_map(self, node)?;
        }
        Ok(())
    }

    /// Drain every model's event queue through the forward registrations.
    /// Returns whether any event was routed.
    fn pump_map_events(&mut self) -> Result<bool, Error> {
        let ids: Vec<MapId> = self.maps.keys().copied().collect();
        let mut pumped = false;
        for map in ids {
            let Some(model) = self.maps.get_mut(&map) else {
                continue;
            };
            let events = model.take_events();
            if events.is_empty() {
                continue;
            }
            pumped = true;
            self.route_events(map, events)?;
        }
        Ok(pumped)
    }

    fn route_events(&mut self, map: MapId, events: VecDeque<MapEvent>) -> Result<(), Error> {
        for event in events {
            for forward in &self.forwards {
                if forward.map == map && forward.target == event.target && forward.name == event.name
                {
                    self.out_events.push_back(DomEvent {
                        target: forward.node,
                        name: event.name,
                        detail: event.data.clone(),
                    });
                }
            }
            self.react(map, &event)?;
        }
        Ok(())
    }

    /// Engine-side reactions to map events, beyond pure forwarding.
    fn react(&mut self, map: MapId, event: &MapEvent) -> Result<(), Error> {
        if event.target != EventTarget::Map {
            return Ok(());
        }
        match event.name {
            "moveend" => map_root::write_back_center(self, map),
            "zoomend" => {
                map_root::write_back_zoom(self, map)?;
                legend::refresh_for_map(self, map)
            }
            _ => Ok(()),
        }
    }

    /// The element bound to a map model.
    fn map_node(&self, map: MapId) -> Option<NodeId> {
        self.states
            .iter()
            .find_map(|(node, state)| (state.feature == Some(Feature::Map(map))).then_some(*node))
    }

    // ------------------------------------------------------------------
    // Subscriptions

    /// Register forwards for `names` on behalf of `node` and remember the
    /// tokens in its state for exact removal later.
    fn forward_events(
        &mut self,
        node: NodeId,
        map: MapId,
        target: EventTarget,
        names: &[&'static str],
    ) {
        for &name in names {
            let id = SubscriptionId(self.next_subscription);
            self.next_subscription += 1;
            self.forwards.push(Forward {
                id,
                map,
                target,
                name,
                node,
            });
            if let Some(state) = self.states.get_mut(&node) {
                state.subscriptions.push(id);
            }
        }
    }

    /// Retire forwards whose elements were torn down, now that any final
    /// events have been routed through them.
    fn reap_subscriptions(&mut self) {
        if self.dead_subscriptions.is_empty() {
            return;
        }
        let dead = std::mem::take(&mut self.dead_subscriptions);
        self.forwards.retain(|forward| !dead.contains(&forward.id));
    }

    // ------------------------------------------------------------------
    // Popups

    /// Rebind a layer's popup from the element's current content. Empty
    /// content unbinds; unchanged content is left alone so an open popup
    /// does not flicker.
    fn refresh_popup(&mut self, node: NodeId) -> Result<(), Error> {
        let Some(state) = self.states.get(&node) else {
            return Ok(());
        };
        let Some(Feature::Layer { map, layer }) = state.feature else {
            return Ok(());
        };
        let content = self.doc.inner_markup(node).trim().to_string();
        let Some(model) = self.maps.get_mut(&map) else {
            return Ok(());
        };
        let Some(bound) = model.layer(layer) else {
            return Ok(());
        };
        let current = bound.popup.as_ref().map(|popup| popup.content.as_str());
        if content.is_empty() {
            if current.is_some() {
                model.unbind_popup(layer);
            }
        } else if current != Some(content.as_str()) {
            model.bind_popup(layer, content);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Geolocation

    fn poll_locations(&mut self) -> Result<(), Error> {
        let waiting: Vec<NodeId> = self
            .states
            .iter()
            .filter_map(|(node, state)| match &state.data {
                ElementData::Geolocation(geo) if geo.active && (geo.pending || geo.options.watch) => {
                    Some(*node)
                }
                _ => None,
            })
            .collect();
        if waiting.is_empty() {
            return Ok(());
        }
        // The locator moves out for the duration of the poll so it can be
        // handed &mut self alongside
        let mut locator = self.locator.take();
        let mut result = Ok(());
        for node in waiting {
            if let Err(err) = data::poll_location(self, locator.as_deref_mut(), node) {
                result = Err(err);
                break;
            }
        }
        self.locator = locator;
        result
    }
}
