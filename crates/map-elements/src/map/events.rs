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

//! Map event plumbing: [`MapEvent`] records emitted by the model and
//! [`SubscriptionId`] tokens for exact listener deregistration.

use serde_json::Value;

use super::layer::LayerId;

/// Token identifying one event forwarding registration.
///
/// Unsubscribing by token is exact: dropping a token removes that
/// registration and no other, so repeated register/unregister cycles cannot
/// orphan listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// What a map event was emitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    /// The map itself.
    Map,
    /// A specific layer (marker, shape, tile layer, group).
    Layer(LayerId),
}

/// One event emitted by a map model, drained and routed by the engine.
#[derive(Debug, Clone)]
pub struct MapEvent {
    pub target: EventTarget,
    pub name: &'static str,
    pub data: Value,
}

impl MapEvent {
    #[must_use]
    pub fn new(target: EventTarget, name: &'static str, data: Value) -> Self {
        Self { target, name, data }
    }
}
