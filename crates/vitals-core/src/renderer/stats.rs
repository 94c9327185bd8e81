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

/// Renderer counters pushed once per rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RendererStats {
    /// A sequential counter for rendered frames, as seen by the renderer.
    pub frame_number: u64,
    /// The number of draw calls issued for the frame.
    pub draw_calls: u32,
    /// The number of triangles submitted for the frame.
    pub triangles: u64,
    /// The number of points submitted for the frame.
    pub points: u64,
    /// The number of lines submitted for the frame.
    pub lines: u64,
    /// Live geometry objects held by the renderer.
    pub geometries: u32,
    /// Live texture objects bound by the renderer.
    pub textures: u32,
    /// Live shader programs.
    pub programs: u32,
    /// A proxy for fragment shader cost (e.g. summed instruction estimate).
    pub fragment_complexity: f64,
}

impl RendererStats {
    /// Returns `true` if every floating-point field is finite.
    pub fn is_valid(&self) -> bool {
        self.fragment_complexity.is_finite() && self.fragment_complexity >= 0.0
    }
}
