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
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vitals_core::renderer::RendererStats;
use vitals_core::telemetry::{
    HeapProvider, HeapReport, MetricKey, MonitoredResourceType, ResourceMonitor, Severity,
    TelemetryEvent,
};
use vitals_core::xr::{XrSessionInfo, XrSessionMode};
use vitals_core::{ManualClock, TelemetryError};
use vitals_telemetry::{EngineConfig, TelemetryEngine};

const MB: u64 = 1024 * 1024;

fn engine_with(config: EngineConfig) -> (TelemetryEngine, ManualClock) {
    let clock = ManualClock::new(0.0);
    let engine = TelemetryEngine::builder()
        .config(config)
        .clock(Arc::new(clock.clone()))
        .build()
        .expect("default config is valid");
    (engine, clock)
}

/// A heap source the test can move by hand.
#[derive(Debug)]
struct ScriptedHeap {
    used: AtomicU64,
}

impl ScriptedHeap {
    fn new(used: u64) -> Arc<Self> {
        Arc::new(Self {
            used: AtomicU64::new(used),
        })
    }

    fn set(&self, used: u64) {
        self.used.store(used, Ordering::SeqCst);
    }
}

impl ResourceMonitor for ScriptedHeap {
    fn monitor_id(&self) -> Cow<'static, str> {
        Cow::Borrowed("scripted_heap")
    }

    fn resource_type(&self) -> MonitoredResourceType {
        MonitoredResourceType::Heap
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl HeapProvider for ScriptedHeap {
    fn heap_report(&self) -> Option<HeapReport> {
        Some(HeapReport::new(
            self.used.load(Ordering::SeqCst),
            1024 * MB,
            4096 * MB,
        ))
    }
}

#[test]
fn test_fps_drop_raises_danger_event() {
    // --- 1. ARRANGE ---
    let (mut engine, clock) = engine_with(EngineConfig::default());
    assert_eq!(engine.snapshot().performance_grade, Severity::Good);
    let stats = RendererStats::default();
    let first = engine.ingest_renderer_stats(&stats);
    assert_eq!(first.performance_grade, Severity::Good);

    // Ten frames at 60 FPS.
    for _ in 0..10 {
        clock.advance_ms(1000.0 / 60.0);
        engine.ingest_renderer_stats(&stats);
    }
    assert_relative_eq!(engine.snapshot().fps, 60.0, epsilon = 1e-6);
    assert!(
        engine
            .drain_change_events()
            .iter()
            .all(|e| e.metric != MetricKey::Fps),
        "A steady frame rate must not produce FPS events"
    );

    // --- 2. ACT ---
    clock.advance_ms(1000.0 / 28.0);
    let snapshot = engine.ingest_renderer_stats(&stats);

    // --- 3. ASSERT ---
    assert_relative_eq!(snapshot.fps, 28.0, epsilon = 1e-6);
    assert_eq!(snapshot.performance_grade, Severity::Critical);
    assert_eq!(snapshot.frame_time_grade, Severity::Critical);
    let events = engine.drain_change_events();
    let fps_event = events
        .iter()
        .find(|e| e.metric == MetricKey::Fps)
        .expect("FPS drop should be reported");
    assert_eq!(fps_event.severity, Severity::Danger);
    assert_eq!(fps_event.metric.as_str(), "fps");
    assert_relative_eq!(fps_event.delta_percent, -53.333, epsilon = 1e-2);

    let frame_time_event = events
        .iter()
        .find(|e| e.metric == MetricKey::FrameTime)
        .expect("Frame time spike should be reported");
    assert_eq!(frame_time_event.severity, Severity::Danger);
}

#[test]
fn test_gpu_estimate_without_timer_extension() {
    let (mut engine, clock) = engine_with(EngineConfig::default());
    let stats = RendererStats {
        draw_calls: 200,
        triangles: 50_000,
        fragment_complexity: 300.0,
        textures: 10,
        ..Default::default()
    };

    let mut snapshot = engine.ingest_renderer_stats(&stats);
    for _ in 0..100 {
        clock.advance_ms(16.0);
        snapshot = engine.ingest_renderer_stats(&stats);
    }

    assert_relative_eq!(snapshot.gpu_frame_time, 12.8, epsilon = 1e-9);
    assert!(!snapshot.gpu_timing_measured);
    assert_eq!(engine.gpu_queries_in_flight(), 0);
}

#[test]
fn test_leak_flag_follows_heap() {
    let config = EngineConfig {
        memory_check_interval_frames: 1,
        ..Default::default()
    };
    let heap = ScriptedHeap::new(100 * MB);
    let clock = ManualClock::new(0.0);
    let mut engine = TelemetryEngine::builder()
        .config(config)
        .clock(Arc::new(clock.clone()))
        .with_heap_source(heap.clone())
        .build()
        .unwrap();
    assert_relative_eq!(engine.snapshot().memory.used, 100.0);
    assert_eq!(engine.monitors().len(), 1);

    let stats = RendererStats::default();
    heap.set(200 * MB);
    assert!(!engine.ingest_renderer_stats(&stats).memory.leak_suspected);

    heap.set(200 * MB + 1);
    assert!(engine.ingest_renderer_stats(&stats).memory.leak_suspected);

    heap.set(150 * MB);
    assert!(!engine.ingest_renderer_stats(&stats).memory.leak_suspected);
}

#[test]
fn test_heap_checked_every_interval() {
    let heap = ScriptedHeap::new(64 * MB);
    let mut engine = TelemetryEngine::builder()
        .config(EngineConfig {
            memory_check_interval_frames: 3,
            ..Default::default()
        })
        .clock(Arc::new(ManualClock::new(0.0)))
        .with_heap_source(heap.clone())
        .build()
        .unwrap();

    heap.set(80 * MB);
    let stats = RendererStats::default();
    assert_relative_eq!(engine.ingest_renderer_stats(&stats).memory.used, 64.0);
    assert_relative_eq!(engine.ingest_renderer_stats(&stats).memory.used, 64.0);
    assert_relative_eq!(engine.ingest_renderer_stats(&stats).memory.used, 80.0);
}

#[test]
fn test_change_ring_is_bounded_and_newest_first() {
    let (mut engine, clock) = engine_with(EngineConfig::default());
    // Alternate the draw-call count so every frame yields an event.
    for frame in 0..300u32 {
        clock.advance_ms(16.0);
        let stats = RendererStats {
            draw_calls: if frame % 2 == 0 { 100 } else { 200 },
            ..Default::default()
        };
        engine.ingest_renderer_stats(&stats);
    }

    let history = engine.recent_changes();
    assert_eq!(history.len(), 100);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].timestamp_ms >= pair[1].timestamp_ms));

    let drained = engine.drain_change_events();
    assert_eq!(drained.len(), 100);
    assert!(engine.drain_change_events().is_empty());
}

#[test]
fn test_small_moves_are_not_reported() {
    let (mut engine, clock) = engine_with(EngineConfig::default());
    for frame in 0..20u32 {
        clock.advance_ms(16.0);
        engine.ingest_renderer_stats(&RendererStats {
            draw_calls: 100 + frame % 2,
            ..Default::default()
        });
    }
    assert!(engine
        .drain_change_events()
        .iter()
        .all(|e| e.metric != MetricKey::DrawCalls));
}

#[test]
fn test_producer_samples_fold_into_next_frame() {
    let (mut engine, clock) = engine_with(EngineConfig::default());
    let sender = engine.sample_sender();

    sender
        .submit(TelemetryEvent::LatencyProbe { latency_ms: 20.0 })
        .unwrap();
    sender
        .submit(TelemetryEvent::LatencyProbe { latency_ms: 30.0 })
        .unwrap();
    sender
        .submit(TelemetryEvent::GcPause { duration_ms: 4.0 })
        .unwrap();

    // Not visible before the frame pass.
    assert_eq!(engine.snapshot().network_latency, 0.0);

    clock.advance_ms(16.0);
    let snapshot = engine.ingest_renderer_stats(&RendererStats::default());
    assert_relative_eq!(snapshot.network_latency, 25.0);
    assert_eq!(snapshot.memory.gc_count, 1);
    assert_relative_eq!(snapshot.memory.last_gc_pause, 4.0);
}

#[test]
fn test_xr_session_lifecycle() {
    let (mut engine, clock) = engine_with(EngineConfig::default());
    let sender = engine.sample_sender();

    let info = XrSessionInfo::new(XrSessionMode::ImmersiveVr, 0.0);
    clock.advance_ms(5.0);
    let session = engine.attach_xr_session(info);
    assert!(engine.snapshot().xr.active);

    // The compositor runs at 90 Hz on its own thread.
    sender
        .submit(TelemetryEvent::XrFrame {
            session,
            timestamp_ms: 120.0,
        })
        .unwrap();
    sender
        .submit(TelemetryEvent::XrFrame {
            session,
            timestamp_ms: 120.0 + 1000.0 / 90.0,
        })
        .unwrap();
    engine.record_xr_pose(session, 100.0, 118.0);
    engine.record_controller_input(session, 100.0, 108.0);

    clock.advance_ms(16.0);
    let snapshot = engine.ingest_renderer_stats(&RendererStats::default());
    assert_relative_eq!(snapshot.xr.session_init_time, 120.0);
    assert_relative_eq!(snapshot.xr.frame_rate, 90.0, epsilon = 1e-6);
    assert_relative_eq!(snapshot.xr.motion_to_photon, 18.0);
    assert_relative_eq!(snapshot.xr.controller_input_lag, 8.0);

    assert_eq!(engine.detach_xr_session(), Some(session));
    assert_eq!(engine.detach_xr_session(), None);

    // Late callbacks from the ended session are ignored; values hold.
    engine.record_xr_pose(session, 200.0, 900.0);
    engine.on_xr_frame(session, 500.0);
    clock.advance_ms(16.0);
    let snapshot = engine.ingest_renderer_stats(&RendererStats::default());
    assert!(!snapshot.xr.active);
    assert_relative_eq!(snapshot.xr.motion_to_photon, 18.0);
    assert_relative_eq!(snapshot.xr.frame_rate, 90.0, epsilon = 1e-6);
}

#[test]
fn test_snapshot_json_export() {
    let (mut engine, clock) = engine_with(EngineConfig::default());
    engine.ingest_renderer_stats(&RendererStats::default());
    clock.advance_ms(20.0);
    engine.ingest_renderer_stats(&RendererStats {
        draw_calls: 12,
        ..Default::default()
    });

    let json: serde_json::Value = serde_json::from_str(&engine.snapshot_json().unwrap()).unwrap();
    assert_eq!(json["frame_count"], 2);
    assert_eq!(json["fps"], 50.0);
    assert_eq!(json["renderer"]["draw_calls"], 12);
    assert_eq!(json["performance_grade"], "good");
    assert_eq!(json["frame_time_grade"], "good");
    assert_eq!(json["gpu_timing_measured"], false);
}

#[test]
fn test_dispose_is_idempotent() {
    let (mut engine, clock) = engine_with(EngineConfig::default());
    let sender = engine.sample_sender();
    engine.attach_xr_session(XrSessionInfo::new(XrSessionMode::Inline, 0.0));
    engine.ingest_renderer_stats(&RendererStats::default());

    engine.dispose();
    engine.dispose();

    assert!(!engine.xr_active());
    assert!(!engine.snapshot().xr.active);
    assert_eq!(
        sender.submit(TelemetryEvent::GcPause { duration_ms: 1.0 }),
        Err(TelemetryError::ChannelClosed)
    );

    // Frames after dispose leave the snapshot untouched.
    let frames = engine.frame_count();
    clock.advance_ms(16.0);
    engine.ingest_renderer_stats(&RendererStats::default());
    assert_eq!(engine.frame_count(), frames);
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = TelemetryEngine::new(EngineConfig {
        frame_window: 0,
        ..Default::default()
    });
    assert!(matches!(result, Err(TelemetryError::InvalidConfig(_))));
}
