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

//! A minimal retained document tree for map elements.
//!
//! The [`Document`] is an arena of nodes with a synthetic root. Every
//! structural or attribute change is recorded as a [`Mutation`] and drained
//! in batches by the engine, so a burst of edits is observed as one set of
//! changes rather than one callback per edit.

mod parse;

use crate::error::Error;

/// Identifier of a node in a document. Stable for the document's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// The element vocabulary this engine understands.
///
/// Unknown elements parse as [`Tag::Other`] and pass through untouched, the
/// way a browser treats elements it has no definition for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Map,
    Marker,
    Circle,
    Polygon,
    Polyline,
    Point,
    TileLayer,
    TileLayerWms,
    Icon,
    DivIcon,
    LayerGroup,
    GeoJson,
    Geolocation,
    ZoomControl,
    ScaleControl,
    FullscreenControl,
    Legend,
    LegendSymbol,
    Other,
}

impl Tag {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "leaflet-map" => Self::Map,
            "leaflet-marker" => Self::Marker,
            "leaflet-circle" => Self::Circle,
            "leaflet-polygon" => Self::Polygon,
            "leaflet-polyline" => Self::Polyline,
            "leaflet-point" => Self::Point,
            "leaflet-tilelayer" => Self::TileLayer,
            "leaflet-tilelayer-wms" => Self::TileLayerWms,
            "leaflet-icon" => Self::Icon,
            "leaflet-divicon" => Self::DivIcon,
            "leaflet-layer-group" => Self::LayerGroup,
            "leaflet-geojson" => Self::GeoJson,
            "leaflet-geolocation" => Self::Geolocation,
            "leaflet-zoom-control" => Self::ZoomControl,
            "leaflet-scale-control" => Self::ScaleControl,
            "leaflet-fullscreen-control" => Self::FullscreenControl,
            "leaflet-legend" => Self::Legend,
            "leaflet-legend-symbol" => Self::LegendSymbol,
            _ => Self::Other,
        }
    }

    /// Whether elements with this tag declare an explicit basemap-grade
    /// layer. Markers and shapes deliberately do not count: a map whose
    /// only children are markers still receives the default basemap.
    #[must_use]
    pub fn is_layer(self) -> bool {
        matches!(self, Self::TileLayer | Self::TileLayerWms | Self::GeoJson)
    }

    /// Whether elements with this tag participate in fit-to-layers.
    #[must_use]
    pub fn is_fit_candidate(self) -> bool {
        matches!(
            self,
            Self::Circle
                | Self::GeoJson
                | Self::LayerGroup
                | Self::Marker
                | Self::Polygon
                | Self::Polyline
        )
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: Tag,
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    connected: bool,
}

/// One observed change to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// A node became reachable from the root.
    Connected(NodeId),
    /// A node was detached from the root.
    Disconnected(NodeId),
    /// An element attribute was set or removed.
    AttributeChanged { node: NodeId, name: String },
    /// The direct child list of a node changed.
    ChildListChanged(NodeId),
    /// Something anywhere under this node changed: descendants were added
    /// or removed, text was edited, or a descendant attribute changed.
    SubtreeChanged(NodeId),
}

/// Arena-backed document tree with mutation recording.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    mutations: Vec<Mutation>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        let root = Node {
            data: NodeData::Element {
                tag: Tag::Other,
                name: "body".to_string(),
                attributes: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
            connected: true,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            mutations: Vec::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn get(&self, id: NodeId) -> Result<&Node, Error> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id))
    }

    /// Create a detached element. Nothing is observed until it is inserted.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        let name = name.to_ascii_lowercase();
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data: NodeData::Element {
                tag: Tag::from_name(&name),
                name,
                attributes: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
            connected: false,
        });
        id
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data: NodeData::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
            connected: false,
        });
        id
    }

    // ------------------------------------------------------------------
    // Structure

    /// Append `child` as the last child of `parent`. A child that already
    /// has a parent is moved, observing a disconnect before the reconnect.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference`, or at the end when
    /// `reference` is `None`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), Error> {
        if !matches!(self.get(parent)?.data, NodeData::Element { .. }) {
            return Err(Error::NotAnElement(parent));
        }
        self.get(child)?;

        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(Error::CircularHierarchy(child));
            }
            cursor = self.nodes[ancestor.0].parent;
        }

        self.detach(child);

        let index = match reference {
            Some(r) => self.nodes[parent.0]
                .children
                .iter()
                .position(|c| *c == r)
                .ok_or(Error::UnknownNode(r))?,
            None => self.nodes[parent.0].children.len(),
        };
        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        self.mutations.push(Mutation::ChildListChanged(parent));
        self.mark_subtree_changed(parent);
        if self.nodes[parent.0].connected {
            self.set_connected(child, true);
        }
        Ok(())
    }

    /// Remove `child` from `parent`. The subtree stays alive detached and
    /// may be inserted again later.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        self.get(parent)?;
        if self.get(child)?.parent != Some(parent) {
            return Err(Error::UnknownNode(child));
        }
        self.detach(child);
        Ok(())
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.nodes[child.0].parent else {
            return;
        };
        self.nodes[parent.0].children.retain(|c| *c != child);
        self.nodes[child.0].parent = None;
        self.mutations.push(Mutation::ChildListChanged(parent));
        self.mark_subtree_changed(parent);
        if self.nodes[child.0].connected {
            self.set_connected(child, false);
        }
    }

    fn set_connected(&mut self, id: NodeId, connected: bool) {
        // A detached subtree shares one flag, so the first node decides
        if self.nodes[id.0].connected == connected {
            return;
        }
        self.nodes[id.0].connected = connected;
        self.mutations.push(if connected {
            Mutation::Connected(id)
        } else {
            Mutation::Disconnected(id)
        });
        let children = self.nodes[id.0].children.clone();
        for child in children {
            self.set_connected(child, connected);
        }
    }

    fn mark_subtree_changed(&mut self, from: NodeId) {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            self.mutations.push(Mutation::SubtreeChanged(id));
            cursor = self.nodes[id.0].parent;
        }
    }

    // ------------------------------------------------------------------
    // Attributes

    /// Set an attribute. Setting an attribute to its current value is a
    /// no-op and observes nothing.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), Error> {
        let name = name.to_ascii_lowercase();
        let NodeData::Element { attributes, .. } = &mut self
            .nodes
            .get_mut(node.0)
            .ok_or(Error::UnknownNode(node))?
            .data
        else {
            return Err(Error::NotAnElement(node));
        };

        match attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => {
                if *v == value {
                    return Ok(());
                }
                *v = value.to_string();
            }
            None => attributes.push((name.clone(), value.to_string())),
        }
        self.mutations.push(Mutation::AttributeChanged { node, name });
        if let Some(parent) = self.nodes[node.0].parent {
            self.mark_subtree_changed(parent);
        }
        Ok(())
    }

    /// Remove an attribute if present.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), Error> {
        let name = name.to_ascii_lowercase();
        let NodeData::Element { attributes, .. } = &mut self
            .nodes
            .get_mut(node.0)
            .ok_or(Error::UnknownNode(node))?
            .data
        else {
            return Err(Error::NotAnElement(node));
        };

        let before = attributes.len();
        attributes.retain(|(k, _)| *k != name);
        if attributes.len() == before {
            return Ok(());
        }
        self.mutations.push(Mutation::AttributeChanged { node, name });
        if let Some(parent) = self.nodes[node.0].parent {
            self.mark_subtree_changed(parent);
        }
        Ok(())
    }

    #[must_use]
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeData::Text(_) => None,
        }
    }

    /// Numeric attribute, `None` when absent or unparseable.
    #[must_use]
    pub fn attr_f64(&self, node: NodeId, name: &str) -> Option<f64> {
        self.attr(node, name)?.trim().parse().ok()
    }

    /// Presence-based boolean: any value, even `"false"`, means true.
    #[must_use]
    pub fn attr_bool(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    #[must_use]
    pub fn attributes(&self, node: NodeId) -> &[(String, String)] {
        match self.nodes.get(node.0).map(|n| &n.data) {
            Some(NodeData::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    // ------------------------------------------------------------------
    // Text

    /// Replace the text of a text node.
    pub fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), Error> {
        let NodeData::Text(current) = &mut self
            .nodes
            .get_mut(node.0)
            .ok_or(Error::UnknownNode(node))?
            .data
        else {
            return Err(Error::NotText(node));
        };
        if current == text {
            return Ok(());
        }
        *current = text.to_string();
        if let Some(parent) = self.nodes[node.0].parent {
            self.mark_subtree_changed(parent);
        }
        Ok(())
    }

    /// Replace all children of an element with a single text node.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<(), Error> {
        if !matches!(self.get(node)?.data, NodeData::Element { .. }) {
            return Err(Error::NotAnElement(node));
        }
        let children = self.nodes[node.0].children.clone();
        for child in children {
            self.detach(child);
        }
        let text_node = self.create_text(text);
        self.append_child(node, text_node)
    }

    // ------------------------------------------------------------------
    // Queries

    #[must_use]
    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(
            self.nodes.get(node.0).map(|n| &n.data),
            Some(NodeData::Element { .. })
        )
    }

    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<Tag> {
        match self.nodes.get(node.0)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    #[must_use]
    pub fn element_name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Element { name, .. } => Some(name),
            NodeData::Text(_) => None,
        }
    }

    #[must_use]
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node.0).map_or(&[], |n| &n.children)
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }

    #[must_use]
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).is_some_and(|n| n.connected)
    }

    /// The subtree rooted at `node` in document order, `node` first.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(node, &mut out);
        out
    }

    fn collect_descendants(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if self.nodes.get(node.0).is_none() {
            return;
        }
        out.push(node);
        for child in &self.nodes[node.0].children {
            self.collect_descendants(*child, out);
        }
    }

    /// First connected element with the given `id` attribute, in document
    /// order.
    #[must_use]
    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.attr(*id, "id") == Some(value))
    }

    /// Serialized markup of the node's children. Point elements carry
    /// shape geometry rather than content and are skipped.
    #[must_use]
    pub fn inner_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_markup(*child, &mut out);
        }
        out
    }

    fn write_markup(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => escape_text(out, text),
            NodeData::Element { tag, name, attributes } => {
                if *tag == Tag::Point {
                    return;
                }
                out.push('<');
                out.push_str(name);
                for (key, value) in attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    escape_attr(out, value);
                    out.push('"');
                }
                out.push('>');
                for child in &self.nodes[node.0].children {
                    self.write_markup(*child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn inner_text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes.get(node.0).map(|n| &n.data) {
            Some(NodeData::Text(text)) => out.push_str(text),
            Some(NodeData::Element { .. }) => {
                for child in &self.nodes[node.0].children {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }

    /// Drain all recorded mutations.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.mutations)
    }
}

fn escape_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_records_connected_in_tree_order() {
        let mut doc = Document::new();
        let map = doc.create_element("leaflet-map");
        let marker = doc.create_element("leaflet-marker");
        doc.append_child(map, marker).unwrap();

        // Nothing observed while the subtree is detached
        assert!(!doc
            .take_mutations()
            .iter()
            .any(|m| matches!(m, Mutation::Connected(_))));

        doc.append_child(doc.root(), map).unwrap();
        let connected: Vec<NodeId> = doc
            .take_mutations()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::Connected(id) => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(connected, vec![map, marker]);
        assert!(doc.is_connected(marker));
    }

    #[test]
    fn test_move_disconnects_then_reconnects() {
        let mut doc = Document::new();
        let a = doc.create_element("leaflet-map");
        let b = doc.create_element("leaflet-map");
        let marker = doc.create_element("leaflet-marker");
        doc.append_child(doc.root(), a).unwrap();
        doc.append_child(doc.root(), b).unwrap();
        doc.append_child(a, marker).unwrap();
        doc.take_mutations();

        doc.append_child(b, marker).unwrap();
        let mutations = doc.take_mutations();
        assert!(mutations.contains(&Mutation::Disconnected(marker)));
        assert!(mutations.contains(&Mutation::Connected(marker)));
        assert!(mutations.contains(&Mutation::ChildListChanged(a)));
        assert!(mutations.contains(&Mutation::ChildListChanged(b)));
        assert_eq!(doc.parent(marker), Some(b));
    }

    #[test]
    fn test_insert_before_reorders_children() {
        let mut doc = Document::new();
        let line = doc.create_element("leaflet-polyline");
        let p1 = doc.create_element("leaflet-point");
        let p2 = doc.create_element("leaflet-point");
        let p3 = doc.create_element("leaflet-point");
        doc.append_child(doc.root(), line).unwrap();
        for p in [p1, p2, p3] {
            doc.append_child(line, p).unwrap();
        }

        doc.insert_before(line, p3, Some(p1)).unwrap();
        assert_eq!(doc.children(line), &[p3, p1, p2]);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut doc = Document::new();
        let outer = doc.create_element("leaflet-layer-group");
        let inner = doc.create_element("leaflet-layer-group");
        doc.append_child(outer, inner).unwrap();

        assert!(matches!(
            doc.append_child(inner, outer),
            Err(Error::CircularHierarchy(_))
        ));
        assert!(matches!(
            doc.append_child(outer, outer),
            Err(Error::CircularHierarchy(_))
        ));
    }

    #[test]
    fn test_set_attribute_observes_changes_only() {
        let mut doc = Document::new();
        let map = doc.create_element("leaflet-map");
        doc.append_child(doc.root(), map).unwrap();
        doc.take_mutations();

        doc.set_attribute(map, "zoom", "13").unwrap();
        assert!(doc.take_mutations().iter().any(|m| matches!(
            m,
            Mutation::AttributeChanged { name, .. } if name == "zoom"
        )));

        // Same value again is silent
        doc.set_attribute(map, "zoom", "13").unwrap();
        assert!(doc.take_mutations().is_empty());

        doc.remove_attribute(map, "zoom").unwrap();
        assert_eq!(doc.attr(map, "zoom"), None);
        assert!(!doc.take_mutations().is_empty());
    }

    #[test]
    fn test_attr_parsing() {
        let mut doc = Document::new();
        let marker = doc.create_element("leaflet-marker");
        doc.set_attribute(marker, "latitude", "51.5").unwrap();
        doc.set_attribute(marker, "longitude", "not-a-number").unwrap();
        doc.set_attribute(marker, "draggable", "false").unwrap();

        assert_eq!(doc.attr_f64(marker, "latitude"), Some(51.5));
        assert_eq!(doc.attr_f64(marker, "longitude"), None);
        assert_eq!(doc.attr_f64(marker, "missing"), None);
        // Presence wins, whatever the value says
        assert!(doc.attr_bool(marker, "draggable"));
        assert!(!doc.attr_bool(marker, "keyboard"));
    }

    #[test]
    fn test_inner_markup_skips_point_elements() {
        let mut doc = Document::new();
        let polygon = doc.create_element("leaflet-polygon");
        let point = doc.create_element("leaflet-point");
        doc.set_attribute(point, "latitude", "1").unwrap();
        let label = doc.create_element("b");
        let text = doc.create_text("Area & more");
        doc.append_child(label, text).unwrap();
        doc.append_child(polygon, point).unwrap();
        doc.append_child(polygon, label).unwrap();

        let markup = doc.inner_markup(polygon);
        assert_eq!(markup, "<b>Area &amp; more</b>");
    }

    #[test]
    fn test_element_by_id_in_document_order() {
        let mut doc = Document::new();
        let first = doc.create_element("leaflet-icon");
        let second = doc.create_element("leaflet-icon");
        doc.set_attribute(first, "id", "pin").unwrap();
        doc.set_attribute(second, "id", "pin").unwrap();
        doc.append_child(doc.root(), first).unwrap();
        doc.append_child(doc.root(), second).unwrap();

        assert_eq!(doc.element_by_id("pin"), Some(first));
        assert_eq!(doc.element_by_id("other"), None);

        // A detached element is not found
        doc.remove_child(doc.root(), first).unwrap();
        assert_eq!(doc.element_by_id("pin"), Some(second));
    }

    #[test]
    fn test_subtree_changed_reaches_ancestors() {
        let mut doc = Document::new();
        let marker = doc.create_element("leaflet-marker");
        let bold = doc.create_element("b");
        let text = doc.create_text("hello");
        doc.append_child(doc.root(), marker).unwrap();
        doc.append_child(marker, bold).unwrap();
        doc.append_child(bold, text).unwrap();
        doc.take_mutations();

        doc.set_text(text, "changed").unwrap();
        let mutations = doc.take_mutations();
        assert!(mutations.contains(&Mutation::SubtreeChanged(marker)));
        assert!(mutations.contains(&Mutation::SubtreeChanged(bold)));

        // An attribute change on the marker itself is not content
        doc.set_attribute(marker, "latitude", "2").unwrap();
        let mutations = doc.take_mutations();
        assert!(!mutations.contains(&Mutation::SubtreeChanged(marker)));
    }

    #[test]
    fn test_set_text_content_replaces_children() {
        let mut doc = Document::new();
        let tile = doc.create_element("leaflet-tilelayer");
        let old = doc.create_text("old attribution");
        doc.append_child(doc.root(), tile).unwrap();
        doc.append_child(tile, old).unwrap();

        doc.set_text_content(tile, "new attribution").unwrap();
        assert_eq!(doc.inner_text(tile), "new attribution");
        assert_eq!(doc.children(tile).len(), 1);
    }

    #[test]
    fn test_tag_vocabulary() {
        assert_eq!(Tag::from_name("leaflet-map"), Tag::Map);
        assert_eq!(Tag::from_name("leaflet-scale-control"), Tag::ScaleControl);
        assert_eq!(Tag::from_name("div"), Tag::Other);

        assert!(Tag::TileLayer.is_layer());
        assert!(!Tag::TileLayer.is_fit_candidate());
        assert!(Tag::Marker.is_fit_candidate());
        assert!(!Tag::Marker.is_layer());
        assert!(!Tag::ZoomControl.is_layer());
    }
}
