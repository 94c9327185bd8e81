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

//! # Vitals Telemetry
//!
//! The metrics aggregation and classification engine. It ingests samples from
//! the render loop and from asynchronous producers, windows and smooths them,
//! estimates what cannot be measured, detects significant changes and
//! publishes an immutable [`MetricsSnapshot`] once per frame.

#![warn(missing_docs)]

pub mod aggregator;
pub mod change;
pub mod config;
pub mod engine;
pub mod gpu;
pub mod memory;
pub mod monitoring;
pub mod probe;
pub mod snapshot;
pub mod utils;
pub mod window;
pub mod xr;

pub use aggregator::{FrameRateTracker, FrameTiming, WindowedAggregator};
pub use change::{ChangeDetector, ChangeLog};
pub use config::EngineConfig;
pub use engine::{TelemetryEngine, TelemetryEngineBuilder};
pub use gpu::{GpuTimingManager, GpuTimingSource, GpuTimingState};
pub use memory::MemoryTracker;
pub use monitoring::MonitorRegistry;
pub use probe::ProbeScheduler;
pub use snapshot::{MetricsSnapshot, SnapshotStore};
pub use utils::FrameScope;
pub use window::RollingWindow;
pub use xr::{XrReadings, XrTracker};
