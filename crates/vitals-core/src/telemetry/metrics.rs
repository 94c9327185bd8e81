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

//! Metric keys, severity grades and change events.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// Identifies one tracked metric of the snapshot.
///
/// Every key maps to exactly one numeric field of the metrics snapshot, so a
/// key can be used both to route samples into rolling windows and to address
/// the change detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    /// Instantaneous frames per second of the main render loop.
    Fps,
    /// Instantaneous frame time of the main render loop, in milliseconds.
    FrameTime,
    /// Mean frame time over the frame window.
    AverageFrameTime,
    /// FPS derived from the mean frame time.
    AverageFps,
    /// Shortest frame time in the frame window.
    MinFrameTime,
    /// Longest frame time in the frame window.
    MaxFrameTime,
    /// Standard deviation of the frame window.
    FrameTimeJitter,
    /// CPU time between a frame-start and a frame-end mark.
    CpuFrameTime,
    /// GPU frame time, measured by timer queries or estimated.
    GpuFrameTime,
    /// Draw calls issued in the last frame.
    DrawCalls,
    /// Triangles submitted in the last frame.
    Triangles,
    /// Points submitted in the last frame.
    Points,
    /// Lines submitted in the last frame.
    Lines,
    /// Live geometry objects.
    Geometries,
    /// Live texture objects.
    Textures,
    /// Live shader programs.
    Programs,
    /// Heap in use, in megabytes.
    HeapUsed,
    /// Heap reserved by the runtime, in megabytes.
    HeapTotal,
    /// Heap limit reported by the runtime, in megabytes.
    HeapLimit,
    /// Garbage collections observed since the engine started.
    GcCount,
    /// Duration of the last observed garbage collection, in milliseconds.
    LastGcPause,
    /// Frame rate of the XR compositor callbacks.
    XrFrameRate,
    /// Delay between the XR session request and its first frame, in milliseconds.
    XrSessionInitTime,
    /// Mean pose-to-display latency over the motion history, in milliseconds.
    MotionToPhoton,
    /// Mean controller input-to-processing latency, in milliseconds.
    ControllerInputLag,
    /// Mean of the latency probe window, in milliseconds.
    NetworkLatency,
}

impl MetricKey {
    /// Every key, in snapshot order.
    pub const ALL: [MetricKey; 26] = [
        MetricKey::Fps,
        MetricKey::FrameTime,
        MetricKey::AverageFrameTime,
        MetricKey::AverageFps,
        MetricKey::MinFrameTime,
        MetricKey::MaxFrameTime,
        MetricKey::FrameTimeJitter,
        MetricKey::CpuFrameTime,
        MetricKey::GpuFrameTime,
        MetricKey::DrawCalls,
        MetricKey::Triangles,
        MetricKey::Points,
        MetricKey::Lines,
        MetricKey::Geometries,
        MetricKey::Textures,
        MetricKey::Programs,
        MetricKey::HeapUsed,
        MetricKey::HeapTotal,
        MetricKey::HeapLimit,
        MetricKey::GcCount,
        MetricKey::LastGcPause,
        MetricKey::XrFrameRate,
        MetricKey::XrSessionInitTime,
        MetricKey::MotionToPhoton,
        MetricKey::ControllerInputLag,
        MetricKey::NetworkLatency,
    ];

    /// Returns the stable, snake_case name of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Fps => "fps",
            MetricKey::FrameTime => "frame_time",
            MetricKey::AverageFrameTime => "average_frame_time",
            MetricKey::AverageFps => "average_fps",
            MetricKey::MinFrameTime => "min_frame_time",
            MetricKey::MaxFrameTime => "max_frame_time",
            MetricKey::FrameTimeJitter => "frame_time_jitter",
            MetricKey::CpuFrameTime => "cpu_frame_time",
            MetricKey::GpuFrameTime => "gpu_frame_time",
            MetricKey::DrawCalls => "draw_calls",
            MetricKey::Triangles => "triangles",
            MetricKey::Points => "points",
            MetricKey::Lines => "lines",
            MetricKey::Geometries => "geometries",
            MetricKey::Textures => "textures",
            MetricKey::Programs => "programs",
            MetricKey::HeapUsed => "heap_used",
            MetricKey::HeapTotal => "heap_total",
            MetricKey::HeapLimit => "heap_limit",
            MetricKey::GcCount => "gc_count",
            MetricKey::LastGcPause => "last_gc_pause",
            MetricKey::XrFrameRate => "xr_frame_rate",
            MetricKey::XrSessionInitTime => "xr_session_init_time",
            MetricKey::MotionToPhoton => "motion_to_photon",
            MetricKey::ControllerInputLag => "controller_input_lag",
            MetricKey::NetworkLatency => "network_latency",
        }
    }

    /// Returns the unit of measurement (e.g. "ms", "MB").
    pub fn unit(&self) -> &'static str {
        match self {
            MetricKey::Fps | MetricKey::AverageFps | MetricKey::XrFrameRate => "fps",
            MetricKey::HeapUsed | MetricKey::HeapTotal | MetricKey::HeapLimit => "MB",
            MetricKey::DrawCalls
            | MetricKey::Triangles
            | MetricKey::Points
            | MetricKey::Lines
            | MetricKey::Geometries
            | MetricKey::Textures
            | MetricKey::Programs
            | MetricKey::GcCount => "count",
            _ => "ms",
        }
    }

    /// Returns which way of moving counts as an improvement for this metric.
    pub fn direction(&self) -> MetricDirection {
        match self {
            MetricKey::FrameTime | MetricKey::DrawCalls | MetricKey::Triangles => {
                MetricDirection::LowerIsBetter
            }
            MetricKey::Fps => MetricDirection::HigherIsBetter,
            _ => MetricDirection::Neutral,
        }
    }
}

impl Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which direction of change is an improvement for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricDirection {
    /// Growth is a regression (frame time, draw calls, triangles).
    LowerIsBetter,
    /// Growth is an improvement (FPS).
    HigherIsBetter,
    /// No preferred direction; only the magnitude of a change matters.
    Neutral,
}

/// A discrete grade applied to a metric value or to a change of that value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Clearly better than the target.
    Excellent,
    /// Within the target.
    #[default]
    Good,
    /// Noticeably degraded.
    Warning,
    /// Strongly degraded.
    Critical,
    /// Degraded past the point of usability.
    Danger,
}

impl Severity {
    /// Returns the lowercase name of the grade.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Excellent => "excellent",
            Severity::Good => "good",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Danger => "danger",
        }
    }

    /// Grades a frame rate against a 60 FPS target.
    pub fn for_fps(fps: f64) -> Self {
        match fps {
            f if f >= 55.0 => Severity::Excellent,
            f if f >= 45.0 => Severity::Good,
            f if f >= 30.0 => Severity::Warning,
            f if f >= 20.0 => Severity::Critical,
            _ => Severity::Danger,
        }
    }

    /// Grades a frame time (ms) against a 16.7 ms budget.
    pub fn for_frame_time(frame_time_ms: f64) -> Self {
        match frame_time_ms {
            t if t <= 16.7 => Severity::Excellent,
            t if t <= 22.2 => Severity::Good,
            t if t <= 33.3 => Severity::Warning,
            t if t <= 50.0 => Severity::Critical,
            _ => Severity::Danger,
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw sample for one metric, as produced by a sample source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    /// The metric the sample belongs to.
    pub key: MetricKey,
    /// The sampled value.
    pub value: f64,
    /// Arrival time, in milliseconds on the engine clock.
    pub timestamp_ms: f64,
}

impl MetricSample {
    /// Creates a new sample.
    pub fn new(key: MetricKey, value: f64, timestamp_ms: f64) -> Self {
        Self {
            key,
            value,
            timestamp_ms,
        }
    }

    /// Returns `true` if the sample may enter a window. Every metric is a
    /// duration, a rate or a count, so negative values are rejected too.
    pub fn is_valid(&self) -> bool {
        self.value.is_finite() && self.value >= 0.0
    }
}

/// A significant movement of one metric between two consecutive updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// When the change was observed, in milliseconds on the engine clock.
    pub timestamp_ms: f64,
    /// The metric that moved.
    pub metric: MetricKey,
    /// Value before the update.
    pub old_value: f64,
    /// Value after the update.
    pub new_value: f64,
    /// `new_value - old_value`.
    pub delta: f64,
    /// `delta / old_value * 100`.
    pub delta_percent: f64,
    /// Direction-aware grade of the change.
    pub severity: Severity,
}
