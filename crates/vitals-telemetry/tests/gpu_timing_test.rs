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

use approx::assert_relative_eq;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use vitals_core::renderer::{GpuQueryId, GpuTimerBackend, GpuTimerCapability, RendererStats};
use vitals_core::xr::{XrSessionInfo, XrSessionMode};
use vitals_core::{ManualClock, TelemetryError, TelemetryResult};
use vitals_telemetry::{EngineConfig, GpuTimingState, TelemetryEngine};

#[derive(Debug, Default)]
struct TimerState {
    next_id: u64,
    live: BTreeSet<GpuQueryId>,
    ended: BTreeSet<GpuQueryId>,
    created: u64,
    /// Once set, every ended query resolves with this many nanoseconds.
    resolve_ns: Option<u64>,
    fail_results: bool,
}

/// A scripted timer extension shared between the test and the engine.
#[derive(Debug, Clone, Default)]
struct MockGpuTimer(Arc<Mutex<TimerState>>);

impl MockGpuTimer {
    fn state(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.0.lock().unwrap()
    }
}

impl GpuTimerBackend for MockGpuTimer {
    fn create_query(&mut self) -> TelemetryResult<GpuQueryId> {
        let mut state = self.state();
        state.next_id += 1;
        state.created += 1;
        let id = GpuQueryId(state.next_id);
        state.live.insert(id);
        Ok(id)
    }

    fn begin_query(&mut self, _id: GpuQueryId) -> TelemetryResult<()> {
        Ok(())
    }

    fn end_query(&mut self, id: GpuQueryId) -> TelemetryResult<()> {
        self.state().ended.insert(id);
        Ok(())
    }

    fn result_available(&mut self, id: GpuQueryId) -> TelemetryResult<bool> {
        let state = self.state();
        if state.fail_results {
            return Err(TelemetryError::QueryFailed("context lost".into()));
        }
        Ok(state.resolve_ns.is_some() && state.ended.contains(&id))
    }

    fn result_ns(&mut self, _id: GpuQueryId) -> TelemetryResult<u64> {
        self.state()
            .resolve_ns
            .ok_or_else(|| TelemetryError::QueryFailed("not ready".into()))
    }

    fn delete_query(&mut self, id: GpuQueryId) -> TelemetryResult<()> {
        let mut state = self.state();
        state.live.remove(&id);
        state.ended.remove(&id);
        Ok(())
    }
}

fn engine_with_timer(timer: &MockGpuTimer) -> (TelemetryEngine, ManualClock) {
    let clock = ManualClock::new(0.0);
    let engine = TelemetryEngine::builder()
        .config(EngineConfig::default())
        .clock(Arc::new(clock.clone()))
        .gpu_timer(GpuTimerCapability::Available(Box::new(timer.clone())))
        .build()
        .unwrap();
    (engine, clock)
}

#[test]
fn test_pool_is_bounded_when_results_never_arrive() {
    let timer = MockGpuTimer::default();
    let (mut engine, clock) = engine_with_timer(&timer);

    for _ in 0..200 {
        clock.advance_ms(16.0);
        engine.ingest_renderer_stats(&RendererStats::default());
        assert!(engine.gpu_queries_in_flight() <= 5);
        assert!(timer.state().live.len() <= 5);
    }
    assert_eq!(engine.gpu_timing_state(), GpuTimingState::ExtensionAvailable);
    assert!(!engine.snapshot().gpu_timing_measured);
}

#[test]
fn test_resolved_queries_replace_the_estimate() {
    let timer = MockGpuTimer::default();
    let (mut engine, clock) = engine_with_timer(&timer);
    let stats = RendererStats {
        draw_calls: 50,
        ..Default::default()
    };

    for _ in 0..3 {
        clock.advance_ms(16.0);
        engine.ingest_renderer_stats(&stats);
    }
    assert!(!engine.snapshot().gpu_timing_measured);

    timer.state().resolve_ns = Some(6_500_000);
    clock.advance_ms(16.0);
    let snapshot = engine.ingest_renderer_stats(&stats);

    assert!(snapshot.gpu_timing_measured);
    assert_relative_eq!(snapshot.gpu_frame_time, 6.5);
}

#[test]
fn test_queries_pause_during_xr_presentation() {
    let timer = MockGpuTimer::default();
    let (mut engine, clock) = engine_with_timer(&timer);

    clock.advance_ms(16.0);
    engine.ingest_renderer_stats(&RendererStats::default());
    engine.attach_xr_session(XrSessionInfo::new(XrSessionMode::ImmersiveVr, 16.0));

    let created = timer.state().created;
    for _ in 0..20 {
        clock.advance_ms(11.0);
        let snapshot = engine.ingest_renderer_stats(&RendererStats::default());
        assert!(!snapshot.gpu_timing_measured);
    }
    assert_eq!(timer.state().created, created);

    engine.detach_xr_session();
    clock.advance_ms(16.0);
    engine.ingest_renderer_stats(&RendererStats::default());
    assert_eq!(timer.state().created, created + 1);
}

#[test]
fn test_measurement_restarts_after_xr_session_ends() {
    let timer = MockGpuTimer::default();
    timer.state().resolve_ns = Some(2_000_000);
    let (mut engine, clock) = engine_with_timer(&timer);
    let stats = RendererStats {
        draw_calls: 80,
        ..Default::default()
    };

    for _ in 0..4 {
        clock.advance_ms(16.0);
        engine.ingest_renderer_stats(&stats);
    }
    let snapshot = engine.snapshot();
    assert!(snapshot.gpu_timing_measured);
    assert_relative_eq!(snapshot.gpu_frame_time, 2.0);

    engine.attach_xr_session(XrSessionInfo::new(XrSessionMode::ImmersiveVr, 64.0));
    for _ in 0..30 {
        clock.advance_ms(11.0);
        let snapshot = engine.ingest_renderer_stats(&stats);
        assert!(!snapshot.gpu_timing_measured);
    }
    assert_eq!(engine.gpu_queries_in_flight(), 0);
    assert!(timer.state().live.is_empty());

    engine.detach_xr_session();
    clock.advance_ms(16.0);
    let snapshot = engine.ingest_renderer_stats(&stats);
    assert!(!snapshot.gpu_timing_measured);
    // Still the load estimate (0.5 + 80 * 0.1), not the pre-session timing.
    assert!(snapshot.gpu_frame_time > 2.0);

    // The query issued after the session resolves on the next update.
    clock.advance_ms(16.0);
    let snapshot = engine.ingest_renderer_stats(&stats);
    assert!(snapshot.gpu_timing_measured);
    assert_relative_eq!(snapshot.gpu_frame_time, 2.0);
}

#[test]
fn test_extension_failure_falls_back_for_the_session() {
    let timer = MockGpuTimer::default();
    let (mut engine, clock) = engine_with_timer(&timer);

    for _ in 0..3 {
        clock.advance_ms(16.0);
        engine.ingest_renderer_stats(&RendererStats::default());
    }
    timer.state().fail_results = true;
    clock.advance_ms(16.0);
    let snapshot = engine.ingest_renderer_stats(&RendererStats::default());

    assert_eq!(engine.gpu_timing_state(), GpuTimingState::ExtensionUnavailable);
    assert_eq!(engine.gpu_queries_in_flight(), 0);
    assert!(timer.state().live.is_empty());
    assert!(snapshot.gpu_frame_time >= 0.5);

    timer.state().fail_results = false;
    let created = timer.state().created;
    clock.advance_ms(16.0);
    engine.ingest_renderer_stats(&RendererStats::default());
    assert_eq!(timer.state().created, created);
}

#[test]
fn test_dispose_releases_queries_once() {
    let timer = MockGpuTimer::default();
    let (mut engine, clock) = engine_with_timer(&timer);
    for _ in 0..4 {
        clock.advance_ms(16.0);
        engine.ingest_renderer_stats(&RendererStats::default());
    }
    assert!(!timer.state().live.is_empty());

    engine.dispose();
    assert!(timer.state().live.is_empty());
    engine.dispose();
    drop(engine);
    assert!(timer.state().live.is_empty());
}

#[test]
fn test_gpu_time_never_exceeds_frame_budget_when_estimated() {
    let (mut engine, clock) = {
        let clock = ManualClock::new(0.0);
        let engine = TelemetryEngine::builder()
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        (engine, clock)
    };
    let mut frame_times = BTreeMap::new();
    for (i, frame_ms) in [8.0, 11.0, 16.0, 33.0, 5.0].iter().enumerate() {
        for load in [0u32, 10, 100, 1000] {
            clock.advance_ms(*frame_ms);
            let snapshot = engine.ingest_renderer_stats(&RendererStats {
                draw_calls: load,
                triangles: u64::from(load) * 1000,
                ..Default::default()
            });
            if snapshot.frame_time > 0.0 {
                assert!(snapshot.gpu_frame_time <= snapshot.frame_time * 0.8 + 1e-9);
            }
            assert!(snapshot.gpu_frame_time >= 0.5);
            frame_times.insert((i, load), snapshot.gpu_frame_time);
        }
    }
    assert_eq!(frame_times.len(), 20);
}
