// Copyright 2025 eraflo
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

//! XR session identity.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Unique identifier of one XR session, used to reject samples that arrive
/// after their session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XrSessionId(Uuid);

impl XrSessionId {
    /// Generates a new random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for XrSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for XrSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of XR session the host acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum XrSessionMode {
    /// A headset session rendering a fully virtual scene.
    ImmersiveVr,
    /// A passthrough / see-through session.
    ImmersiveAr,
    /// A non-immersive session rendered in a regular view.
    Inline,
}

/// What the host knows about a session when it hands it to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrSessionInfo {
    /// The session id.
    pub id: XrSessionId,
    /// The session mode.
    pub mode: XrSessionMode,
    /// When the host requested the session, in milliseconds on the engine clock.
    pub requested_at_ms: f64,
}

impl XrSessionInfo {
    /// Describes a session requested at `requested_at_ms`, assigning it a fresh id.
    pub fn new(mode: XrSessionMode, requested_at_ms: f64) -> Self {
        Self {
            id: XrSessionId::new(),
            mode,
            requested_at_ms,
        }
    }
}
