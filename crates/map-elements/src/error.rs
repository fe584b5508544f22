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

//! Error types for the engine.

use thiserror::Error;

use crate::dom::NodeId;

/// Errors that can occur while loading markup or driving the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("document has no usable content")]
    EmptyDocument,

    #[error("unknown node: {0:?}")]
    UnknownNode(NodeId),

    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("node {0:?} is not a text node")]
    NotText(NodeId),

    #[error("node {0:?} cannot be inserted into its own subtree")]
    CircularHierarchy(NodeId),
}
