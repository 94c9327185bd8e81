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

//! Load-based GPU frame-time estimate, used when timer queries cannot be.

use crate::window::smooth;
use vitals_core::renderer::RendererStats;

/// Fixed per-frame GPU overhead, and the floor of every estimate.
pub const BASE_OVERHEAD_MS: f64 = 0.5;
/// The estimate never exceeds this share of the observed frame time.
pub const MAX_FRAME_SHARE: f64 = 0.8;

const DRAW_CALL_COST_MS: f64 = 0.1;
const COST_PER_KILO_TRIANGLE_MS: f64 = 0.05;
const COST_PER_HUNDRED_COMPLEXITY_MS: f64 = 0.2;
const TEXTURE_COST_MS: f64 = 0.02;

/// Raw GPU cost estimate of a frame, in milliseconds.
///
/// Deterministic and monotone in every load input.
pub fn estimate(stats: &RendererStats) -> f64 {
    let complexity = if stats.fragment_complexity.is_finite() {
        stats.fragment_complexity.max(0.0)
    } else {
        0.0
    };
    BASE_OVERHEAD_MS
        + f64::from(stats.draw_calls) * DRAW_CALL_COST_MS
        + (stats.triangles as f64 / 1000.0) * COST_PER_KILO_TRIANGLE_MS
        + (complexity / 100.0) * COST_PER_HUNDRED_COMPLEXITY_MS
        + f64::from(stats.textures) * TEXTURE_COST_MS
}

/// Clamps a GPU time into `[BASE_OVERHEAD_MS, frame_time_ms * MAX_FRAME_SHARE]`.
///
/// Without a positive frame time only the floor applies. When the frame is so
/// short that the ceiling falls under the floor, the floor wins.
pub fn clamp_to_budget(gpu_time_ms: f64, frame_time_ms: f64) -> f64 {
    let floored = if gpu_time_ms.is_finite() {
        gpu_time_ms.max(BASE_OVERHEAD_MS)
    } else {
        BASE_OVERHEAD_MS
    };
    if frame_time_ms > 0.0 && frame_time_ms.is_finite() {
        let ceiling = (frame_time_ms * MAX_FRAME_SHARE).max(BASE_OVERHEAD_MS);
        floored.min(ceiling)
    } else {
        floored
    }
}

/// Folds a new raw estimate into the running GPU time, then clamps it.
pub fn smooth_and_clamp(previous_ms: f64, estimate_ms: f64, frame_time_ms: f64, factor: f64) -> f64 {
    clamp_to_budget(smooth(previous_ms, estimate_ms, factor), frame_time_ms)
}
