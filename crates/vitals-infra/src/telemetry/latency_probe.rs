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

//! Synthetic responsiveness probe standing in for a network round-trip.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::borrow::Cow;
use vitals_core::telemetry::LatencyMeasure;
use vitals_core::Stopwatch;

/// Estimates latency as the time the probe thread takes to be scheduled
/// again, plus a base delay and random jitter.
///
/// It measures the host's responsiveness, not a real network path. A real
/// round-trip probe can replace it behind the same `LatencyMeasure` trait.
#[derive(Debug, Clone)]
pub struct SyntheticLatencyProbe {
    rng: StdRng,
    base_ms: f64,
    jitter_ms: f64,
}

impl SyntheticLatencyProbe {
    /// Default base delay, in milliseconds.
    pub const DEFAULT_BASE_MS: f64 = 10.0;
    /// Default jitter amplitude, in milliseconds.
    pub const DEFAULT_JITTER_MS: f64 = 40.0;

    /// Creates a probe seeded from the operating system.
    pub fn new(base_ms: f64, jitter_ms: f64) -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            base_ms: base_ms.max(0.0),
            jitter_ms: jitter_ms.max(0.0),
        }
    }

    /// Creates a reproducible probe.
    pub fn with_seed(base_ms: f64, jitter_ms: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_ms: base_ms.max(0.0),
            jitter_ms: jitter_ms.max(0.0),
        }
    }
}

impl Default for SyntheticLatencyProbe {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_MS, Self::DEFAULT_JITTER_MS)
    }
}

impl LatencyMeasure for SyntheticLatencyProbe {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("synthetic_latency")
    }

    fn measure(&mut self) -> Option<f64> {
        let stopwatch = Stopwatch::new();
        std::thread::yield_now();
        let responsiveness = stopwatch.elapsed_ms_f64();

        let jitter = if self.jitter_ms > 0.0 {
            self.rng.random_range(0.0..self.jitter_ms)
        } else {
            0.0
        };
        let latency = self.base_ms + responsiveness + jitter;
        latency.is_finite().then_some(latency)
    }
}
