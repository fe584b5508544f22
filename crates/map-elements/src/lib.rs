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

//! Custom map elements: declarative markup that drives Leaflet-style maps.
//!
//! This library keeps a document of custom elements (`<leaflet-map>`,
//! `<leaflet-marker>`, and friends) in sync with retained map state. It is
//! split into layers that can be used independently or composed together:
//!
//! - **Document layer**: Custom-element markup, normalized attributes, and
//!   batched mutation records ([`dom`])
//! - **Map layer**: View state, layers, controls, and event emission, usable
//!   without any document attached ([`map`])
//! - **Element layer**: The engine that creates, updates, and tears down map
//!   state as the document changes ([`elements`])
//!
//! # Quick Start
//!
//! Use the [`Engine`] type for full-stack operation:
//!
//! ```
//! use map_elements::Engine;
//!
//! # fn main() -> Result<(), map_elements::Error> {
//! let mut engine = Engine::from_markup(
//!     r#"<leaflet-map latitude="48.8584" longitude="2.2945" zoom="13">
//!          <leaflet-marker latitude="48.8584" longitude="2.2945"
//!                          title="Eiffel Tower"></leaflet-marker>
//!        </leaflet-map>"#,
//! )?;
//!
//! // Maps stay dormant until the host reports a visible viewport.
//! let map = engine.document().children(engine.document().root())[0];
//! engine.set_map_viewport(map, 800.0, 600.0, true);
//! engine.flush()?;
//!
//! for event in engine.take_events() {
//!     println!("{}: {}", event.name, event.detail);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Using Individual Layers
//!
//! Each layer can be used independently for custom integrations:
//!
//! ## Document Layer Only
//!
//! ```
//! use map_elements::dom::Document;
//!
//! # fn main() -> Result<(), map_elements::Error> {
//! let mut doc = Document::from_markup(r#"<leaflet-circle radius="250"></leaflet-circle>"#)?;
//! let circle = doc.children(doc.root())[0];
//! doc.take_mutations(); // discard the connect records from parsing
//!
//! doc.set_attribute(circle, "radius", "500")?;
//! for change in doc.take_mutations() {
//!     println!("{change:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Map Layer Only
//!
//! ```
//! use map_elements::geo::LatLng;
//! use map_elements::map::{MapModel, MapOptions};
//!
//! let mut map = MapModel::new(MapOptions::default());
//! map.set_size(800.0, 600.0);
//! map.set_view(LatLng::new(51.505, -0.09), 13.0);
//!
//! for event in map.take_events() {
//!     println!("{}: {}", event.name, event.data);
//! }
//! ```

pub mod dom;
pub mod elements;
pub mod error;
pub mod geo;
pub mod locate;
pub mod map;

pub use dom::{Document, Mutation, NodeId, Tag};
pub use elements::{DomEvent, Engine, Feature, HostCommand};
pub use error::Error;
pub use geo::{LatLng, LatLngBounds};
pub use locate::{LocateFailure, LocateOptions, LocationFix, Locator};
pub use map::{MapId, MapModel, MapOptions, View};
