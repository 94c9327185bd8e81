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

//! # Vitals Core
//!
//! Foundational crate containing the metric vocabulary, sample contracts and
//! capability traits shared by the telemetry engine and its sample sources.

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod renderer;
pub mod telemetry;
pub mod utils;
pub mod xr;

pub use error::{TelemetryError, TelemetryResult};
pub use utils::clock::{Clock, ManualClock, MonotonicClock};
pub use utils::timer::Stopwatch;
