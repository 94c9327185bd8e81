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

//! Windowed aggregation of raw samples into stable per-metric values.

use crate::config::EngineConfig;
use crate::window::RollingWindow;
use std::collections::HashMap;
use vitals_core::telemetry::{MetricKey, MetricSample};
use vitals_core::{TelemetryError, TelemetryResult};

/// Capacity used for metrics without a dedicated window size.
pub const DEFAULT_WINDOW_CAPACITY: usize = 60;

/// Keeps one rolling window per metric and answers aggregate queries on them.
#[derive(Debug, Default)]
pub struct WindowedAggregator {
    windows: HashMap<MetricKey, RollingWindow<f64>>,
    capacities: HashMap<MetricKey, usize>,
}

impl WindowedAggregator {
    /// Creates an aggregator where every metric uses `DEFAULT_WINDOW_CAPACITY`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an aggregator with the metric-specific capacities of `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new()
            .with_capacity(MetricKey::FrameTime, config.frame_window)
            .with_capacity(MetricKey::NetworkLatency, config.latency_window)
            .with_capacity(MetricKey::GpuFrameTime, config.gpu_window)
    }

    /// Sets the window capacity of `key`. Must be called before the first sample.
    pub fn with_capacity(mut self, key: MetricKey, capacity: usize) -> Self {
        self.capacities.insert(key, capacity);
        self
    }

    /// Returns the window capacity configured for `key`.
    pub fn capacity_of(&self, key: MetricKey) -> usize {
        self.capacities
            .get(&key)
            .copied()
            .unwrap_or(DEFAULT_WINDOW_CAPACITY)
    }

    /// Appends a sample to the window of `key`, evicting the oldest if full.
    ///
    /// Non-finite samples are dropped and leave the window untouched.
    /// Returns `true` if the sample was recorded.
    pub fn record(&mut self, key: MetricKey, value: f64) -> bool {
        if !value.is_finite() {
            log::trace!("Dropping non-finite sample {value} for {key}.");
            return false;
        }
        let capacity = self.capacity_of(key);
        self.windows
            .entry(key)
            .or_insert_with(|| RollingWindow::new(capacity))
            .push(value);
        true
    }

    /// Records a producer sample, rejecting it if its value is not finite.
    pub fn record_sample(&mut self, sample: &MetricSample) -> TelemetryResult<()> {
        if !sample.is_valid() || !self.record(sample.key, sample.value) {
            return Err(TelemetryError::InvalidSample {
                key: sample.key,
                value: sample.value,
            });
        }
        Ok(())
    }

    /// Returns the arithmetic mean of the window of `key`, or 0.0 if empty.
    pub fn average(&self, key: MetricKey) -> f64 {
        self.windows.get(&key).map(|w| w.average()).unwrap_or(0.0)
    }

    /// Returns the trend of the window of `key`, or 0.0 if not found.
    pub fn trend(&self, key: MetricKey) -> f64 {
        self.windows.get(&key).map(|w| w.trend()).unwrap_or(0.0)
    }

    /// Returns the number of samples held for `key`.
    pub fn sample_count(&self, key: MetricKey) -> usize {
        self.windows.get(&key).map(|w| w.len()).unwrap_or(0)
    }

    /// Returns the window of `key`, if any sample was recorded.
    pub fn window(&self, key: MetricKey) -> Option<&RollingWindow<f64>> {
        self.windows.get(&key)
    }

    /// Drops every sample of `key`.
    pub fn clear(&mut self, key: MetricKey) {
        if let Some(window) = self.windows.get_mut(&key) {
            window.clear();
        }
    }
}

/// The timing of one sampled frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Time since the previous sampled frame, in milliseconds.
    pub frame_time_ms: f64,
    /// `1000 / frame_time_ms`.
    pub fps: f64,
}

/// Derives frame time and FPS from the time between consecutive samples.
#[derive(Debug, Clone, Default)]
pub struct FrameRateTracker {
    last_sample_ms: Option<f64>,
    frame_time_ms: f64,
    fps: f64,
}

impl FrameRateTracker {
    /// Creates a tracker that has not seen any frame yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples a frame at `now_ms`.
    ///
    /// Returns the new timing, or `None` on the first frame and whenever the
    /// delta is not strictly positive, in which case the previous frame time
    /// and FPS are retained.
    pub fn sample(&mut self, now_ms: f64) -> Option<FrameTiming> {
        if !now_ms.is_finite() {
            return None;
        }
        let previous = self.last_sample_ms.replace(now_ms)?;
        let delta = now_ms - previous;
        if delta > 0.0 {
            self.frame_time_ms = delta;
            self.fps = 1000.0 / delta;
            Some(FrameTiming {
                frame_time_ms: self.frame_time_ms,
                fps: self.fps,
            })
        } else {
            log::trace!("Non-positive frame delta ({delta} ms), keeping previous timing.");
            None
        }
    }

    /// Last computed frame time, in milliseconds.
    pub fn frame_time_ms(&self) -> f64 {
        self.frame_time_ms
    }

    /// Last computed FPS.
    pub fn fps(&self) -> f64 {
        self.fps
    }
}
