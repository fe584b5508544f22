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

//! Loading a [`Document`] from HTML markup.

use ego_tree::NodeRef;
use scraper::{Html, Selector};

use crate::error::Error;

use super::{Document, NodeData, NodeId};

impl Document {
    /// Parse HTML markup into a document.
    ///
    /// The parser is lenient the way browsers are: it recovers from malformed
    /// markup and synthesizes the missing scaffolding. Everything under
    /// `<body>` becomes children of the document root, with connect mutations
    /// recorded for the engine to pick up on its next flush. Comments and
    /// whitespace-only text are dropped.
    pub fn from_markup(markup: &str) -> Result<Self, Error> {
        let html = Html::parse_document(markup);
        let body = Selector::parse("body")
            .ok()
            .and_then(|selector| html.select(&selector).next())
            .ok_or(Error::EmptyDocument)?;

        let mut doc = Self::new();
        let root = doc.root();
        for child in body.children() {
            convert(&mut doc, root, child)?;
        }
        Ok(doc)
    }
}

fn convert(doc: &mut Document, parent: NodeId, node: NodeRef<'_, scraper::Node>) -> Result<(), Error> {
    if let Some(element) = node.value().as_element() {
        let id = doc.create_element(element.name());
        let mut attrs: Vec<(String, String)> = element
            .attrs()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();
        attrs.sort_by(|a, b| a.0.cmp(&b.0));
        if let NodeData::Element { attributes, .. } = &mut doc.nodes[id.0].data {
            *attributes = attrs;
        }
        doc.append_child(parent, id)?;
        for child in node.children() {
            convert(doc, id, child)?;
        }
    } else if let Some(text) = node.value().as_text() {
        if !text.trim().is_empty() {
            let id = doc.create_text(text);
            doc.append_child(parent, id)?;
        }
    }
    Ok(())
}
