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

//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vitals_core::{TelemetryError, TelemetryResult};

/// Tunables of the telemetry engine. Every field has a default, so a
/// partial JSON document is enough to override a few of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the frame-time window.
    pub frame_window: usize,
    /// Capacity of the latency-probe window.
    pub latency_window: usize,
    /// Capacity of the XR motion-to-photon history.
    pub motion_window: usize,
    /// Capacity of the XR controller input-lag history.
    pub controller_window: usize,
    /// Capacity of the heap-used history.
    pub heap_history: usize,
    /// Capacity of the resolved GPU timing window.
    pub gpu_window: usize,
    /// Capacity of the change-event ring.
    pub change_log_capacity: usize,
    /// A change must exceed this magnitude (percent) to be reported.
    pub change_threshold_percent: f64,
    /// Maximum number of GPU timer queries in flight.
    pub gpu_query_pool: usize,
    /// Smoothing factor of the GPU frame-time estimator.
    pub gpu_smoothing: f64,
    /// Frames between two heap checks.
    pub memory_check_interval_frames: u64,
    /// Heap growth factor over the baseline that raises the leak flag.
    pub leak_factor: f64,
    /// Cadence of the latency probes.
    pub latency_probe_interval_ms: u64,
    /// Maximum number of producer samples buffered between two frame passes.
    /// If the buffer is full, new samples are dropped.
    pub sample_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_window: 60,
            latency_window: 10,
            motion_window: 10,
            controller_window: 20,
            heap_history: 60,
            gpu_window: 60,
            change_log_capacity: 100,
            change_threshold_percent: 5.0,
            gpu_query_pool: 5,
            gpu_smoothing: 0.3,
            memory_check_interval_frames: 60,
            leak_factor: 2.0,
            latency_probe_interval_ms: 5000,
            sample_buffer_size: 1024,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON and validates it.
    pub fn from_json_str(json: &str) -> TelemetryResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> TelemetryResult<()> {
        let capacities = [
            ("frame_window", self.frame_window),
            ("latency_window", self.latency_window),
            ("motion_window", self.motion_window),
            ("controller_window", self.controller_window),
            ("heap_history", self.heap_history),
            ("gpu_window", self.gpu_window),
            ("change_log_capacity", self.change_log_capacity),
            ("gpu_query_pool", self.gpu_query_pool),
            ("sample_buffer_size", self.sample_buffer_size),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(TelemetryError::InvalidConfig(format!(
                "{name} must be greater than zero"
            )));
        }
        if !(self.gpu_smoothing > 0.0 && self.gpu_smoothing <= 1.0) {
            return Err(TelemetryError::InvalidConfig(format!(
                "gpu_smoothing must be in (0, 1], got {}",
                self.gpu_smoothing
            )));
        }
        if !(self.change_threshold_percent.is_finite() && self.change_threshold_percent >= 0.0) {
            return Err(TelemetryError::InvalidConfig(format!(
                "change_threshold_percent must be a non-negative number, got {}",
                self.change_threshold_percent
            )));
        }
        if !(self.leak_factor.is_finite() && self.leak_factor > 1.0) {
            return Err(TelemetryError::InvalidConfig(format!(
                "leak_factor must be greater than 1, got {}",
                self.leak_factor
            )));
        }
        if self.memory_check_interval_frames == 0 {
            return Err(TelemetryError::InvalidConfig(
                "memory_check_interval_frames must be greater than zero".into(),
            ));
        }
        if self.latency_probe_interval_ms == 0 {
            return Err(TelemetryError::InvalidConfig(
                "latency_probe_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Returns the probe cadence as a `Duration`.
    pub fn latency_probe_interval(&self) -> Duration {
        Duration::from_millis(self.latency_probe_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_window, 60);
        assert_eq!(config.gpu_query_pool, 5);
        assert_eq!(config.change_log_capacity, 100);
        assert_eq!(config.latency_probe_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "frame_window": 120, "leak_factor": 3.0 }"#).unwrap();
        assert_eq!(config.frame_window, 120);
        assert_eq!(config.leak_factor, 3.0);
        assert_eq!(config.latency_window, 10);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "gpu_query_pool": 0 }"#).unwrap_err();
        assert_eq!(
            err,
            TelemetryError::InvalidConfig("gpu_query_pool must be greater than zero".into())
        );
    }

    #[test]
    fn test_out_of_range_factors_are_rejected() {
        let config = EngineConfig {
            gpu_smoothing: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            leak_factor: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(TelemetryError::InvalidConfig(_))
        ));
    }
}
