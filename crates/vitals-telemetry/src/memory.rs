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

//! Heap tracking and the leak heuristic.

use crate::window::RollingWindow;
use vitals_core::telemetry::HeapReport;

/// Follows heap usage against a baseline and flags runaway growth.
///
/// The leak flag is raised while `used > leak_factor * baseline` and clears
/// on its own once usage falls back under that line. The baseline is the
/// first non-zero reading, normally taken at engine construction.
#[derive(Debug, Clone)]
pub struct MemoryTracker {
    baseline_bytes: Option<u64>,
    latest: HeapReport,
    history: RollingWindow<f64>,
    leak_factor: f64,
    leak_suspected: bool,
    gc_count: u64,
    last_gc_pause_ms: f64,
}

impl MemoryTracker {
    /// Creates a tracker. `baseline` is the reading at construction, if the
    /// host could provide one.
    pub fn new(leak_factor: f64, history_capacity: usize, baseline: Option<HeapReport>) -> Self {
        let mut tracker = Self {
            baseline_bytes: None,
            latest: HeapReport::default(),
            history: RollingWindow::new(history_capacity),
            leak_factor,
            leak_suspected: false,
            gc_count: 0,
            last_gc_pause_ms: 0.0,
        };
        if let Some(report) = baseline {
            tracker.latest = report;
            tracker.set_baseline_if_missing(report.used_bytes);
        }
        tracker
    }

    fn set_baseline_if_missing(&mut self, used_bytes: u64) {
        if self.baseline_bytes.is_none() && used_bytes > 0 {
            log::debug!("Heap baseline set to {used_bytes} bytes.");
            self.baseline_bytes = Some(used_bytes);
        }
    }

    /// Records one periodic heap reading and re-evaluates the leak flag.
    ///
    /// Returns the flag after the update.
    pub fn record(&mut self, report: HeapReport) -> bool {
        self.set_baseline_if_missing(report.used_bytes);
        self.latest = report;
        self.history.push(report.used_mb());

        let suspected = self
            .leak_threshold_bytes()
            .is_some_and(|threshold| report.used_bytes as f64 > threshold);
        if suspected != self.leak_suspected {
            if suspected {
                log::warn!(
                    "Possible memory leak: heap at {:.1} MB is over {}x the baseline.",
                    report.used_mb(),
                    self.leak_factor
                );
            } else {
                log::info!("Heap back under the leak threshold ({:.1} MB).", report.used_mb());
            }
        }
        self.leak_suspected = suspected;
        suspected
    }

    /// Records a garbage collection pause.
    pub fn record_gc(&mut self, duration_ms: f64) -> bool {
        if !(duration_ms.is_finite() && duration_ms >= 0.0) {
            return false;
        }
        self.gc_count += 1;
        self.last_gc_pause_ms = duration_ms;
        true
    }

    /// Heap usage above which the leak flag is raised, once a baseline exists.
    pub fn leak_threshold_bytes(&self) -> Option<f64> {
        self.baseline_bytes
            .map(|baseline| baseline as f64 * self.leak_factor)
    }

    /// Baseline heap usage, in bytes.
    pub fn baseline_bytes(&self) -> Option<u64> {
        self.baseline_bytes
    }

    /// Latest reading.
    pub fn latest(&self) -> HeapReport {
        self.latest
    }

    /// Heap-used history, in MB, oldest first.
    pub fn history(&self) -> &RollingWindow<f64> {
        &self.history
    }

    /// Current state of the leak flag.
    pub fn leak_suspected(&self) -> bool {
        self.leak_suspected
    }

    /// Number of garbage collections reported.
    pub fn gc_count(&self) -> u64 {
        self.gc_count
    }

    /// Duration of the last garbage collection, in milliseconds.
    pub fn last_gc_pause_ms(&self) -> f64 {
        self.last_gc_pause_ms
    }
}
