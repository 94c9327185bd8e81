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

//! Provides an RAII guard around the CPU work of a frame.

use crate::engine::TelemetryEngine;
use std::ops::{Deref, DerefMut};

/// Marks the start of a frame when created and its end when dropped.
///
/// This leverages the RAII pattern to ensure that the end mark is always
/// recorded, even in the case of early returns. The engine stays reachable
/// through the guard for the duration of the frame.
pub struct FrameScope<'a> {
    engine: &'a mut TelemetryEngine,
}

impl<'a> FrameScope<'a> {
    /// Records the frame start and returns the guard.
    pub fn new(engine: &'a mut TelemetryEngine) -> Self {
        engine.record_frame_start();
        Self { engine }
    }
}

impl Deref for FrameScope<'_> {
    type Target = TelemetryEngine;

    fn deref(&self) -> &Self::Target {
        self.engine
    }
}

impl DerefMut for FrameScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine
    }
}

/// When the scope ends, the CPU frame time is recorded.
impl Drop for FrameScope<'_> {
    fn drop(&mut self) {
        self.engine.record_frame_end();
    }
}
