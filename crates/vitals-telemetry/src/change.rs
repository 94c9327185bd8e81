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

//! Detection and classification of significant metric movement.

use std::collections::VecDeque;
use vitals_core::telemetry::{ChangeEvent, MetricDirection, MetricKey, Severity};

const WARNING_PERCENT: f64 = 10.0;
const CRITICAL_PERCENT: f64 = 25.0;
const DANGER_PERCENT: f64 = 50.0;
const NEUTRAL_WARNING_PERCENT: f64 = 20.0;

/// Grades a relative change of `key` according to its direction.
///
/// `delta_percent` is positive when the value grew.
pub fn classify_change(key: MetricKey, delta_percent: f64) -> Severity {
    let worsening = match key.direction() {
        MetricDirection::LowerIsBetter => delta_percent,
        MetricDirection::HigherIsBetter => -delta_percent,
        MetricDirection::Neutral => {
            return if delta_percent.abs() > NEUTRAL_WARNING_PERCENT {
                Severity::Warning
            } else {
                Severity::Good
            };
        }
    };

    match worsening {
        w if w > DANGER_PERCENT => Severity::Danger,
        w if w > CRITICAL_PERCENT => Severity::Critical,
        w if w > WARNING_PERCENT => Severity::Warning,
        w if w < -WARNING_PERCENT => Severity::Excellent,
        _ => Severity::Good,
    }
}

/// Compares each new metric value with the previous one and reports the
/// moves that exceed the significance threshold.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    threshold_percent: f64,
}

impl ChangeDetector {
    /// Creates a detector reporting changes strictly above `threshold_percent`.
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }

    /// Returns the significance threshold, in percent.
    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    /// Observes one update of `key` from `old_value` to `new_value`.
    ///
    /// Returns an event only if `old_value != 0` and the relative change
    /// exceeds the threshold. A zero baseline never produces an event.
    pub fn observe(
        &self,
        key: MetricKey,
        old_value: f64,
        new_value: f64,
        timestamp_ms: f64,
    ) -> Option<ChangeEvent> {
        if old_value == 0.0 || !old_value.is_finite() || !new_value.is_finite() {
            return None;
        }
        let delta = new_value - old_value;
        let delta_percent = delta / old_value * 100.0;
        if delta_percent.abs() <= self.threshold_percent {
            return None;
        }
        Some(ChangeEvent {
            timestamp_ms,
            metric: key,
            old_value,
            new_value,
            delta,
            delta_percent,
            severity: classify_change(key, delta_percent),
        })
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(5.0)
    }
}

/// Bounded, newest-first log of change events.
///
/// Keeps two rings: the history consumers may browse at any time, and the
/// events not yet handed out by `drain`. Each ring drops its oldest entry on
/// overflow.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    history: VecDeque<ChangeEvent>,
    pending: VecDeque<ChangeEvent>,
    capacity: usize,
}

impl ChangeLog {
    /// Creates an empty log. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            pending: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts an event at the front of both rings.
    pub fn record(&mut self, event: ChangeEvent) {
        log::debug!(
            "{} changed {:.1}% ({:.3} -> {:.3}): {}",
            event.metric,
            event.delta_percent,
            event.old_value,
            event.new_value,
            event.severity
        );
        Self::push_front_bounded(&mut self.pending, event.clone(), self.capacity);
        Self::push_front_bounded(&mut self.history, event, self.capacity);
    }

    fn push_front_bounded(ring: &mut VecDeque<ChangeEvent>, event: ChangeEvent, capacity: usize) {
        ring.push_front(event);
        ring.truncate(capacity);
    }

    /// Returns and clears the events recorded since the last drain, newest first.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        self.pending.drain(..).collect()
    }

    /// Returns the retained history, newest first.
    pub fn history(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.history.iter()
    }

    /// Number of events retained in the history.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns `true` if nothing was ever recorded (or everything was cleared).
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Number of events waiting for the next drain.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Maximum number of events held by each ring.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_small_change_is_ignored() {
        let detector = ChangeDetector::default();
        assert!(detector.observe(MetricKey::DrawCalls, 100.0, 101.0, 0.0).is_none());
        assert!(detector.observe(MetricKey::DrawCalls, 100.0, 105.0, 0.0).is_none());
    }

    #[test]
    fn test_zero_baseline_is_ignored() {
        let detector = ChangeDetector::default();
        assert!(detector.observe(MetricKey::Fps, 0.0, 60.0, 0.0).is_none());
    }

    #[test]
    fn test_significant_change_is_reported() {
        let detector = ChangeDetector::default();
        let event = detector
            .observe(MetricKey::DrawCalls, 100.0, 120.0, 42.0)
            .unwrap();
        assert_eq!(event.metric, MetricKey::DrawCalls);
        assert_eq!(event.timestamp_ms, 42.0);
        assert_relative_eq!(event.delta, 20.0);
        assert_relative_eq!(event.delta_percent, 20.0);
        assert_eq!(event.severity, Severity::Warning);
    }

    #[test]
    fn test_lower_is_better_table() {
        let key = MetricKey::FrameTime;
        assert_eq!(classify_change(key, 60.0), Severity::Danger);
        assert_eq!(classify_change(key, 30.0), Severity::Critical);
        assert_eq!(classify_change(key, 15.0), Severity::Warning);
        assert_eq!(classify_change(key, 7.0), Severity::Good);
        assert_eq!(classify_change(key, -7.0), Severity::Good);
        assert_eq!(classify_change(key, -15.0), Severity::Excellent);
    }

    #[test]
    fn test_higher_is_better_is_inverted() {
        let key = MetricKey::Fps;
        let drop = (28.0 - 60.0) / 60.0 * 100.0;
        assert_eq!(classify_change(key, drop), Severity::Danger);
        assert_eq!(classify_change(key, -30.0), Severity::Critical);
        assert_eq!(classify_change(key, -15.0), Severity::Warning);
        assert_eq!(classify_change(key, 15.0), Severity::Excellent);
    }

    #[test]
    fn test_neutral_metrics_split_at_twenty_percent() {
        assert_eq!(classify_change(MetricKey::HeapUsed, 15.0), Severity::Good);
        assert_eq!(classify_change(MetricKey::HeapUsed, -25.0), Severity::Warning);
        assert_eq!(classify_change(MetricKey::NetworkLatency, 21.0), Severity::Warning);
    }

    fn event(value: f64) -> ChangeEvent {
        ChangeEvent {
            timestamp_ms: value,
            metric: MetricKey::Fps,
            old_value: 1.0,
            new_value: value,
            delta: value - 1.0,
            delta_percent: (value - 1.0) * 100.0,
            severity: Severity::Good,
        }
    }

    #[test]
    fn test_log_is_bounded_and_newest_first() {
        let mut log = ChangeLog::new(100);
        for i in 0..250 {
            log.record(event(i as f64));
            assert!(log.len() <= 100);
        }
        assert_eq!(log.len(), 100);
        let newest: Vec<f64> = log.history().take(3).map(|e| e.timestamp_ms).collect();
        assert_eq!(newest, vec![249.0, 248.0, 247.0]);
        assert_eq!(log.history().last().unwrap().timestamp_ms, 150.0);
    }

    #[test]
    fn test_drain_is_at_most_once() {
        let mut log = ChangeLog::new(10);
        log.record(event(2.0));
        log.record(event(3.0));

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].timestamp_ms, 3.0);
        assert!(log.drain().is_empty());
        // History survives a drain.
        assert_eq!(log.len(), 2);

        log.record(event(4.0));
        assert_eq!(log.drain(), vec![event(4.0)]);
    }
}
