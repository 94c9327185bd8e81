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

//! Samples pushed by asynchronous producers.

use crate::telemetry::monitoring::HeapReport;
use crate::xr::XrSessionId;

/// A sample produced off the render path (probe threads, XR compositor,
/// GC hooks) and consumed by the engine during its next frame pass.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// A latency probe resolved.
    LatencyProbe {
        /// Measured latency, in milliseconds.
        latency_ms: f64,
    },
    /// The runtime reported a garbage collection.
    GcPause {
        /// Pause duration, in milliseconds.
        duration_ms: f64,
    },
    /// A heap reading pushed by the host instead of polled.
    Heap(HeapReport),
    /// The XR compositor invoked its frame callback.
    XrFrame {
        /// Session the callback belongs to.
        session: XrSessionId,
        /// Callback timestamp, in milliseconds on the engine clock.
        timestamp_ms: f64,
    },
    /// A tracked pose change reached the display.
    XrPose {
        /// Session the pose belongs to.
        session: XrSessionId,
        /// When the pose changed.
        event_ms: f64,
        /// When the change was processed for display.
        processed_ms: f64,
    },
    /// A controller input source changed.
    XrControllerInput {
        /// Session the input belongs to.
        session: XrSessionId,
        /// When the input happened.
        event_ms: f64,
        /// When the input was processed.
        processed_ms: f64,
    },
}
