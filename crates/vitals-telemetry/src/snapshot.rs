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

//! The metrics snapshot and the store that publishes it.

use crate::change::{ChangeDetector, ChangeLog};
use serde::Serialize;
use std::sync::Arc;
use vitals_core::telemetry::{ChangeEvent, MetricKey, Severity};

/// Heap metrics, in megabytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryMetrics {
    /// Heap in use.
    pub used: f64,
    /// Heap reserved.
    pub total: f64,
    /// Heap limit.
    pub limit: f64,
    /// Garbage collections reported so far.
    pub gc_count: u64,
    /// Duration of the last garbage collection, in milliseconds.
    pub last_gc_pause: f64,
    /// Whether heap usage is over the leak threshold.
    pub leak_suspected: bool,
}

/// Renderer counters of the last ingested frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RendererMetrics {
    /// Draw calls.
    pub draw_calls: u64,
    /// Triangles.
    pub triangles: u64,
    /// Points.
    pub points: u64,
    /// Lines.
    pub lines: u64,
    /// Live geometries.
    pub geometries: u64,
    /// Live textures.
    pub textures: u64,
    /// Compiled shader programs.
    pub programs: u64,
}

/// XR metrics, holding their last values when no session is active.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct XrMetrics {
    /// Whether a session is attached.
    pub active: bool,
    /// Compositor frame rate.
    pub frame_rate: f64,
    /// Time from session request to first frame, in milliseconds.
    pub session_init_time: f64,
    /// Mean motion-to-photon delay, in milliseconds.
    pub motion_to_photon: f64,
    /// Mean controller input lag, in milliseconds.
    pub controller_input_lag: f64,
}

/// A point-in-time copy of every tracked metric.
///
/// Every field is always a number: metrics that cannot be measured hold their
/// last measured or estimated value, and 0 before the first one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was published, in milliseconds on the engine clock.
    pub timestamp_ms: f64,
    /// Renderer updates ingested so far.
    pub frame_count: u64,
    /// Instantaneous frames per second.
    pub fps: f64,
    /// Last frame time, in milliseconds.
    pub frame_time: f64,
    /// Mean frame time over the frame window.
    pub average_frame_time: f64,
    /// FPS derived from the mean frame time.
    pub average_fps: f64,
    /// Shortest frame time in the window.
    pub min_frame_time: f64,
    /// Longest frame time in the window.
    pub max_frame_time: f64,
    /// Standard deviation of the frame time window.
    pub frame_time_jitter: f64,
    /// CPU time between frame start and end marks.
    pub cpu_frame_time: f64,
    /// GPU frame time, measured or estimated.
    pub gpu_frame_time: f64,
    /// Whether `gpu_frame_time` comes from a resolved timer query.
    pub gpu_timing_measured: bool,
    /// Mean of the latency probe window.
    pub network_latency: f64,
    /// Grade of the current FPS. `Good` until the first frame is timed.
    pub performance_grade: Severity,
    /// Grade of the current frame time. `Good` until the first frame is timed.
    pub frame_time_grade: Severity,
    /// Heap metrics.
    pub memory: MemoryMetrics,
    /// Renderer counters.
    pub renderer: RendererMetrics,
    /// XR metrics.
    pub xr: XrMetrics,
}

fn to_count(value: f64) -> u64 {
    value.max(0.0).round() as u64
}

impl MetricsSnapshot {
    /// Reads the value of `key` as a float.
    pub fn get(&self, key: MetricKey) -> f64 {
        match key {
            MetricKey::Fps => self.fps,
            MetricKey::FrameTime => self.frame_time,
            MetricKey::AverageFrameTime => self.average_frame_time,
            MetricKey::AverageFps => self.average_fps,
            MetricKey::MinFrameTime => self.min_frame_time,
            MetricKey::MaxFrameTime => self.max_frame_time,
            MetricKey::FrameTimeJitter => self.frame_time_jitter,
            MetricKey::CpuFrameTime => self.cpu_frame_time,
            MetricKey::GpuFrameTime => self.gpu_frame_time,
            MetricKey::DrawCalls => self.renderer.draw_calls as f64,
            MetricKey::Triangles => self.renderer.triangles as f64,
            MetricKey::Points => self.renderer.points as f64,
            MetricKey::Lines => self.renderer.lines as f64,
            MetricKey::Geometries => self.renderer.geometries as f64,
            MetricKey::Textures => self.renderer.textures as f64,
            MetricKey::Programs => self.renderer.programs as f64,
            MetricKey::HeapUsed => self.memory.used,
            MetricKey::HeapTotal => self.memory.total,
            MetricKey::HeapLimit => self.memory.limit,
            MetricKey::GcCount => self.memory.gc_count as f64,
            MetricKey::LastGcPause => self.memory.last_gc_pause,
            MetricKey::XrFrameRate => self.xr.frame_rate,
            MetricKey::XrSessionInitTime => self.xr.session_init_time,
            MetricKey::MotionToPhoton => self.xr.motion_to_photon,
            MetricKey::ControllerInputLag => self.xr.controller_input_lag,
            MetricKey::NetworkLatency => self.network_latency,
        }
    }

    /// Writes `value` into the field of `key`. Counters are rounded and
    /// clamped at zero.
    pub fn set(&mut self, key: MetricKey, value: f64) {
        match key {
            MetricKey::Fps => self.fps = value,
            MetricKey::FrameTime => self.frame_time = value,
            MetricKey::AverageFrameTime => self.average_frame_time = value,
            MetricKey::AverageFps => self.average_fps = value,
            MetricKey::MinFrameTime => self.min_frame_time = value,
            MetricKey::MaxFrameTime => self.max_frame_time = value,
            MetricKey::FrameTimeJitter => self.frame_time_jitter = value,
            MetricKey::CpuFrameTime => self.cpu_frame_time = value,
            MetricKey::GpuFrameTime => self.gpu_frame_time = value,
            MetricKey::DrawCalls => self.renderer.draw_calls = to_count(value),
            MetricKey::Triangles => self.renderer.triangles = to_count(value),
            MetricKey::Points => self.renderer.points = to_count(value),
            MetricKey::Lines => self.renderer.lines = to_count(value),
            MetricKey::Geometries => self.renderer.geometries = to_count(value),
            MetricKey::Textures => self.renderer.textures = to_count(value),
            MetricKey::Programs => self.renderer.programs = to_count(value),
            MetricKey::HeapUsed => self.memory.used = value,
            MetricKey::HeapTotal => self.memory.total = value,
            MetricKey::HeapLimit => self.memory.limit = value,
            MetricKey::GcCount => self.memory.gc_count = to_count(value),
            MetricKey::LastGcPause => self.memory.last_gc_pause = value,
            MetricKey::XrFrameRate => self.xr.frame_rate = value,
            MetricKey::XrSessionInitTime => self.xr.session_init_time = value,
            MetricKey::MotionToPhoton => self.xr.motion_to_photon = value,
            MetricKey::ControllerInputLag => self.xr.controller_input_lag = value,
            MetricKey::NetworkLatency => self.network_latency = value,
        }
    }
}

/// Owns the working snapshot and the change log, and publishes immutable
/// copies of the snapshot.
///
/// Only the engine's frame pass writes; readers get an `Arc` to the last
/// published copy and never observe a half-updated frame.
#[derive(Debug)]
pub struct SnapshotStore {
    working: MetricsSnapshot,
    published: Arc<MetricsSnapshot>,
    detector: ChangeDetector,
    changes: ChangeLog,
}

impl SnapshotStore {
    /// Creates a store with an all-zero snapshot.
    pub fn new(detector: ChangeDetector, change_log_capacity: usize) -> Self {
        Self {
            working: MetricsSnapshot::default(),
            published: Arc::new(MetricsSnapshot::default()),
            detector,
            changes: ChangeLog::new(change_log_capacity),
        }
    }

    /// Updates one metric, recording a change event if the move is significant.
    ///
    /// Non-finite values are dropped and the previous value is kept.
    pub fn update(&mut self, key: MetricKey, value: f64, now_ms: f64) -> Option<ChangeEvent> {
        if !value.is_finite() {
            log::trace!("Dropping non-finite value {value} for {key}.");
            return None;
        }
        let old_value = self.working.get(key);
        self.working.set(key, value);
        let event = self
            .detector
            .observe(key, old_value, self.working.get(key), now_ms)?;
        self.changes.record(event.clone());
        Some(event)
    }

    /// Sets the number of frames ingested.
    pub fn set_frame_count(&mut self, frame_count: u64) {
        self.working.frame_count = frame_count;
    }

    /// Sets whether the GPU frame time is measured.
    pub fn set_gpu_timing_measured(&mut self, measured: bool) {
        self.working.gpu_timing_measured = measured;
    }

    /// Sets the leak flag.
    pub fn set_leak_suspected(&mut self, suspected: bool) {
        self.working.memory.leak_suspected = suspected;
    }

    /// Sets whether an XR session is attached.
    pub fn set_xr_active(&mut self, active: bool) {
        self.working.xr.active = active;
    }

    /// Publishes the working snapshot and returns the published copy.
    pub fn publish(&mut self, now_ms: f64) -> Arc<MetricsSnapshot> {
        self.working.timestamp_ms = now_ms;
        if self.working.fps > 0.0 {
            self.working.performance_grade = Severity::for_fps(self.working.fps);
            self.working.frame_time_grade = Severity::for_frame_time(self.working.frame_time);
        }
        self.published = Arc::new(self.working.clone());
        Arc::clone(&self.published)
    }

    /// Returns a copy of the last published snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        (*self.published).clone()
    }

    /// Returns a shared handle to the last published snapshot.
    pub fn shared(&self) -> Arc<MetricsSnapshot> {
        Arc::clone(&self.published)
    }

    /// Returns the working snapshot, including updates not yet published.
    pub fn working(&self) -> &MetricsSnapshot {
        &self.working
    }

    /// Returns and clears the change events recorded since the last drain.
    pub fn drain_changes(&mut self) -> Vec<ChangeEvent> {
        self.changes.drain()
    }

    /// Returns the retained change history, newest first.
    pub fn recent_changes(&self) -> Vec<ChangeEvent> {
        self.changes.history().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SnapshotStore {
        SnapshotStore::new(ChangeDetector::default(), 100)
    }

    #[test]
    fn every_key_round_trips_through_the_snapshot() {
        let mut snapshot = MetricsSnapshot::default();
        for (i, key) in MetricKey::ALL.iter().enumerate() {
            snapshot.set(*key, (i + 1) as f64);
        }
        for (i, key) in MetricKey::ALL.iter().enumerate() {
            assert_eq!(snapshot.get(*key), (i + 1) as f64, "{key}");
        }
    }

    #[test]
    fn counters_are_clamped() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.set(MetricKey::DrawCalls, -3.0);
        assert_eq!(snapshot.renderer.draw_calls, 0);
    }

    #[test]
    fn updates_are_invisible_until_published() {
        let mut store = store();
        store.update(MetricKey::Fps, 60.0, 0.0);
        assert_eq!(store.snapshot().fps, 0.0);

        let published = store.publish(16.0);
        assert_eq!(published.fps, 60.0);
        assert_eq!(published.timestamp_ms, 16.0);
        assert_eq!(published.performance_grade, Severity::Excellent);
        assert_eq!(store.snapshot().fps, 60.0);
    }

    #[test]
    fn grades_wait_for_the_first_timed_frame() {
        let mut store = store();
        let published = store.publish(0.0);
        assert_eq!(published.performance_grade, Severity::Good);
        assert_eq!(published.frame_time_grade, Severity::Good);

        store.update(MetricKey::Fps, 25.0, 40.0);
        store.update(MetricKey::FrameTime, 40.0, 40.0);
        let published = store.publish(40.0);
        assert_eq!(published.performance_grade, Severity::Critical);
        assert_eq!(published.frame_time_grade, Severity::Critical);
    }

    #[test]
    fn published_copies_are_immutable() {
        let mut store = store();
        store.update(MetricKey::Fps, 60.0, 0.0);
        let before = store.publish(0.0);
        store.update(MetricKey::Fps, 30.0, 1.0);
        store.publish(1.0);
        assert_eq!(before.fps, 60.0);
        assert_eq!(store.shared().fps, 30.0);
    }

    #[test]
    fn updates_feed_the_change_log() {
        let mut store = store();
        assert!(store.update(MetricKey::DrawCalls, 100.0, 0.0).is_none());
        assert!(store.update(MetricKey::DrawCalls, 101.0, 1.0).is_none());
        let event = store.update(MetricKey::DrawCalls, 160.0, 2.0).unwrap();
        assert_eq!(event.severity, Severity::Danger);
        assert_eq!(store.recent_changes(), vec![event.clone()]);
        assert_eq!(store.drain_changes(), vec![event]);
        assert!(store.drain_changes().is_empty());
    }

    #[test]
    fn non_finite_updates_keep_previous_value() {
        let mut store = store();
        store.update(MetricKey::NetworkLatency, 20.0, 0.0);
        assert!(store.update(MetricKey::NetworkLatency, f64::NAN, 1.0).is_none());
        assert_eq!(store.working().network_latency, 20.0);
    }

    #[test]
    fn snapshot_serializes_every_field() {
        let mut store = store();
        store.update(MetricKey::HeapUsed, 48.5, 0.0);
        store.set_xr_active(true);
        let json = serde_json::to_value(&*store.publish(0.0)).unwrap();
        assert_eq!(json["memory"]["used"], 48.5);
        assert_eq!(json["xr"]["active"], true);
        assert_eq!(json["performance_grade"], "good");
        assert_eq!(json["frame_time_grade"], "good");
        assert!(json["renderer"]["draw_calls"].is_u64());
    }
}
