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

// Vitals Sandbox
// Drives the telemetry engine from a simulated 60 Hz render loop with an XR session.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use vitals_core::event::SampleSender;
use vitals_core::renderer::{GpuTimerCapability, RendererStats};
use vitals_core::telemetry::TelemetryEvent;
use vitals_core::xr::{XrSessionId, XrSessionInfo, XrSessionMode};
use vitals_core::{Clock, MonotonicClock};
use vitals_infra::{ProcessHeapMonitor, SimulatedGpuTimer, SyntheticLatencyProbe};
use vitals_telemetry::{EngineConfig, MetricsSnapshot, TelemetryEngine};

const FRAMES: u64 = 300;
const FRAME_BUDGET: Duration = Duration::from_micros(16_667);
const XR_START_FRAME: u64 = 90;
const XR_END_FRAME: u64 = 210;

/// The XR compositor, running at 90 Hz on its own thread.
struct XrCompositor {
    stop_tx: flume::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl XrCompositor {
    fn start(session: XrSessionId, clock: Arc<MonotonicClock>, sender: SampleSender) -> Result<Self> {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("xr-compositor".into())
            .spawn(move || {
                let mut frame = 0u64;
                while stop_rx.recv_timeout(Duration::from_micros(11_111)).is_err() {
                    let now_ms = clock.now_ms();
                    let pose_lag = 12.0 + (frame % 5) as f64;
                    let mut events = vec![
                        TelemetryEvent::XrFrame {
                            session,
                            timestamp_ms: now_ms,
                        },
                        TelemetryEvent::XrPose {
                            session,
                            event_ms: now_ms - pose_lag,
                            processed_ms: now_ms,
                        },
                    ];
                    if frame % 30 == 0 {
                        events.push(TelemetryEvent::XrControllerInput {
                            session,
                            event_ms: now_ms - 8.0,
                            processed_ms: now_ms,
                        });
                    }
                    for event in events {
                        if sender.submit(event).is_err() {
                            return;
                        }
                    }
                    frame += 1;
                }
            })?;
        Ok(Self { stop_tx, handle })
    }

    fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            log::warn!("XR compositor thread panicked.");
        }
    }
}

fn scene_stats(frame: u64) -> RendererStats {
    // A heavier scene is loaded for a short while to trigger change events.
    let heavy = (150..170).contains(&frame);
    RendererStats {
        frame_number: frame,
        draw_calls: if heavy { 480 } else { 120 },
        triangles: if heavy { 600_000 } else { 85_000 },
        points: 0,
        lines: 24,
        geometries: 64,
        textures: if heavy { 48 } else { 18 },
        programs: 9,
        fragment_complexity: if heavy { 900.0 } else { 250.0 },
    }
}

fn log_snapshot(snapshot: &MetricsSnapshot) {
    log::info!(
        "frame {:>4} | {:>5.1} fps ({}) | frame {:>5.2} ms ({}) | cpu {:>5.2} ms | gpu {:>5.2} ms{} | heap {:.1} MB{} | net {:.1} ms",
        snapshot.frame_count,
        snapshot.fps,
        snapshot.performance_grade,
        snapshot.frame_time,
        snapshot.frame_time_grade,
        snapshot.cpu_frame_time,
        snapshot.gpu_frame_time,
        if snapshot.gpu_timing_measured { "" } else { " (est.)" },
        snapshot.memory.used,
        if snapshot.memory.leak_suspected { " LEAK?" } else { "" },
        snapshot.network_latency,
    );
    if snapshot.xr.active {
        log::info!(
            "  xr {:.1} fps | init {:.1} ms | motion-to-photon {:.1} ms | controller lag {:.1} ms",
            snapshot.xr.frame_rate,
            snapshot.xr.session_init_time,
            snapshot.xr.motion_to_photon,
            snapshot.xr.controller_input_lag,
        );
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let clock = Arc::new(MonotonicClock::new());
    let config = EngineConfig {
        latency_probe_interval_ms: 500,
        ..Default::default()
    };
    let mut engine = TelemetryEngine::builder()
        .config(config)
        .clock(clock.clone())
        .gpu_timer(GpuTimerCapability::Available(Box::new(
            SimulatedGpuTimer::default(),
        )))
        .with_heap_source(Arc::new(ProcessHeapMonitor::default()))
        .build()?;
    engine.spawn_latency_probe(SyntheticLatencyProbe::default())?;

    let sender = engine.sample_sender();
    let mut compositor = None;

    for frame in 0..FRAMES {
        if frame == XR_START_FRAME {
            let info = XrSessionInfo::new(XrSessionMode::ImmersiveVr, clock.now_ms());
            // Headsets take a moment before the first frame callback.
            thread::sleep(Duration::from_millis(40));
            let session = engine.attach_xr_session(info);
            compositor = Some(XrCompositor::start(session, clock.clone(), sender.clone())?);
        }
        if frame == XR_END_FRAME {
            if let Some(compositor) = compositor.take() {
                compositor.stop();
            }
            engine.detach_xr_session();
        }
        if frame % 100 == 0 {
            let _ = sender.submit(TelemetryEvent::GcPause { duration_ms: 2.5 });
        }

        let stats = scene_stats(frame);
        let mut scope = engine.frame_scope();
        // CPU side of the frame, roughly proportional to the draw calls.
        thread::sleep(Duration::from_micros(u64::from(stats.draw_calls) * 10));
        let snapshot = scope.ingest_renderer_stats(&stats);
        drop(scope);

        for event in engine.drain_change_events() {
            log::debug!(
                "{} {} {:+.1}% ({:.2} -> {:.2})",
                event.severity,
                event.metric,
                event.delta_percent,
                event.old_value,
                event.new_value
            );
        }
        if frame % 60 == 0 {
            log_snapshot(&snapshot);
        }

        thread::sleep(FRAME_BUDGET.saturating_sub(Duration::from_micros(
            u64::from(stats.draw_calls) * 10,
        )));
    }

    if let Some(compositor) = compositor.take() {
        compositor.stop();
    }
    log::info!("Final snapshot: {}", engine.snapshot_json()?);
    log::info!("{} change events recorded.", engine.recent_changes().len());
    engine.dispose();
    Ok(())
}
