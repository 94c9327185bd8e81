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

//! The telemetry engine: one aggregation pass per rendered frame over every
//! sample source, publishing an immutable metrics snapshot.

use crate::aggregator::{FrameRateTracker, WindowedAggregator};
use crate::change::ChangeDetector;
use crate::config::EngineConfig;
use crate::gpu::{GpuTimingManager, GpuTimingSource, GpuTimingState};
use crate::memory::MemoryTracker;
use crate::monitoring::MonitorRegistry;
use crate::probe::ProbeScheduler;
use crate::snapshot::{MetricsSnapshot, SnapshotStore};
use crate::utils::FrameScope;
use crate::xr::{InputTiming, XrTracker};
use std::sync::Arc;
use vitals_core::event::{sample_channel, SampleReceiver, SampleSender};
use vitals_core::renderer::{GpuTimerCapability, RendererStats};
use vitals_core::telemetry::{
    ChangeEvent, HeapProvider, HeapReport, LatencyMeasure, MetricKey, MetricSample,
    ResourceMonitor, TelemetryEvent,
};
use vitals_core::xr::{XrSessionId, XrSessionInfo};
use vitals_core::{Clock, MonotonicClock, TelemetryError, TelemetryResult};

/// CPU cost assumed per frame when a frame end arrives without its start.
const CPU_FALLBACK_BASE_MS: f64 = 0.5;
const CPU_FALLBACK_PER_DRAW_MS: f64 = 0.05;

/// Builds a [`TelemetryEngine`].
#[derive(Debug, Default)]
pub struct TelemetryEngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    gpu: GpuTimerCapability,
    heap_source: Option<Arc<dyn HeapProvider>>,
    monitors: Vec<Arc<dyn ResourceMonitor>>,
}

impl TelemetryEngineBuilder {
    /// Uses `config` instead of the defaults.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Stamps every sample with `clock`. Defaults to a [`MonotonicClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the GPU timer capability of the host.
    pub fn gpu_timer(mut self, capability: GpuTimerCapability) -> Self {
        self.gpu = capability;
        self
    }

    /// Polls `monitor` for heap readings. It is also registered as a
    /// resource monitor, so it is refreshed before each read.
    pub fn with_heap_source<M>(mut self, monitor: Arc<M>) -> Self
    where
        M: ResourceMonitor + HeapProvider,
    {
        self.monitors.push(monitor.clone());
        self.heap_source = Some(monitor);
        self
    }

    /// Registers an additional resource monitor.
    pub fn with_monitor(mut self, monitor: Arc<dyn ResourceMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }

    /// Validates the configuration and creates the engine. The heap baseline
    /// is read now.
    ///
    /// ## Returns
    /// The engine, with an initial snapshot already published, or
    /// `TelemetryError::InvalidConfig` if the configuration is rejected.
    pub fn build(self) -> TelemetryResult<TelemetryEngine> {
        self.config.validate()?;
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let monitors = MonitorRegistry::new();
        for monitor in self.monitors {
            monitors.register(monitor);
        }
        monitors.update_all();
        let baseline = self.heap_source.as_ref().and_then(|s| s.heap_report());
        if self.heap_source.is_some() && baseline.is_none() {
            log::info!("Heap introspection unavailable, heap metrics will hold at zero.");
        }

        let (sample_tx, sample_rx) = sample_channel(config.sample_buffer_size);
        let mut engine = TelemetryEngine {
            aggregator: WindowedAggregator::from_config(&config),
            frame_rate: FrameRateTracker::new(),
            gpu: GpuTimingManager::new(self.gpu, config.gpu_query_pool, config.gpu_smoothing),
            xr: XrTracker::new(config.motion_window, config.controller_window),
            memory: MemoryTracker::new(config.leak_factor, config.heap_history, baseline),
            store: SnapshotStore::new(
                ChangeDetector::new(config.change_threshold_percent),
                config.change_log_capacity,
            ),
            monitors,
            heap_source: self.heap_source,
            sample_tx,
            sample_rx: Some(sample_rx),
            probes: Vec::new(),
            frame_started_ms: None,
            frame_count: 0,
            clock,
            config,
        };
        if let Some(report) = baseline {
            engine.apply_heap(report);
        }
        let now_ms = engine.now_ms();
        engine.store.publish(now_ms);
        log::info!("Telemetry engine created.");
        Ok(engine)
    }
}

/// The metrics aggregation and classification engine.
///
/// Driven by the host's render loop: call [`record_frame_start`] and
/// [`record_frame_end`] around the frame (or use [`frame_scope`]), then
/// [`ingest_renderer_stats`] once per rendered frame. Asynchronous producers
/// (latency probes, GC hooks, the XR compositor) push through
/// [`sample_sender`]; their samples are folded in during the next frame pass.
///
/// [`record_frame_start`]: TelemetryEngine::record_frame_start
/// [`record_frame_end`]: TelemetryEngine::record_frame_end
/// [`frame_scope`]: TelemetryEngine::frame_scope
/// [`ingest_renderer_stats`]: TelemetryEngine::ingest_renderer_stats
/// [`sample_sender`]: TelemetryEngine::sample_sender
#[derive(Debug)]
pub struct TelemetryEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    aggregator: WindowedAggregator,
    frame_rate: FrameRateTracker,
    gpu: GpuTimingManager,
    xr: XrTracker,
    memory: MemoryTracker,
    store: SnapshotStore,
    monitors: MonitorRegistry,
    heap_source: Option<Arc<dyn HeapProvider>>,
    sample_tx: SampleSender,
    sample_rx: Option<SampleReceiver>,
    probes: Vec<ProbeScheduler>,
    frame_started_ms: Option<f64>,
    frame_count: u64,
}

impl TelemetryEngine {
    /// Returns a builder with the default configuration.
    pub fn builder() -> TelemetryEngineBuilder {
        TelemetryEngineBuilder::default()
    }

    /// Creates an engine with `config`, the monotonic clock, no GPU timer
    /// and no heap source.
    /// ## Arguments
    /// * `config` - The engine configuration, validated before use.
    /// ## Returns
    /// The engine, or `TelemetryError::InvalidConfig`.
    pub fn new(config: EngineConfig) -> TelemetryResult<Self> {
        Self::builder().config(config).build()
    }

    /// Current time on the engine clock, in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    fn is_disposed(&self) -> bool {
        self.sample_rx.is_none()
    }

    /// Marks the start of the CPU work of a frame.
    pub fn record_frame_start(&mut self) {
        self.frame_started_ms = Some(self.now_ms());
    }

    /// Marks the end of the CPU work of a frame and returns its duration.
    ///
    /// Without a matching start, the duration is estimated from the draw-call
    /// count and bounded by the current frame time.
    ///
    /// ## Returns
    /// The CPU frame time in milliseconds, as written to the working snapshot.
    pub fn record_frame_end(&mut self) -> f64 {
        let now_ms = self.now_ms();
        let cpu_ms = match self.frame_started_ms.take() {
            Some(start_ms) => (now_ms - start_ms).max(0.0),
            None => {
                let draw_calls = self.store.working().renderer.draw_calls as f64;
                let estimate = CPU_FALLBACK_BASE_MS + draw_calls * CPU_FALLBACK_PER_DRAW_MS;
                let frame_time = self.frame_rate.frame_time_ms();
                log::trace!("Frame end without start, estimating CPU time.");
                if frame_time > 0.0 {
                    estimate.min(frame_time)
                } else {
                    estimate
                }
            }
        };
        self.store.update(MetricKey::CpuFrameTime, cpu_ms, now_ms);
        cpu_ms
    }

    /// Returns a guard that marks the frame start now and the frame end on drop.
    pub fn frame_scope(&mut self) -> FrameScope<'_> {
        FrameScope::new(self)
    }

    /// Runs the aggregation pass of one rendered frame and returns the
    /// snapshot it published.
    ///
    /// Order within the pass is fixed: renderer counters and frame timing,
    /// GPU drain or estimate, queued producer samples, the periodic heap
    /// check, then publish. Change detection runs on every update.
    ///
    /// ## Arguments
    /// * `stats` - The renderer counters of the frame. Invalid stats are dropped.
    ///
    /// ## Returns
    /// The published snapshot. After `dispose`, or for dropped stats, the
    /// previous snapshot is returned unchanged.
    pub fn ingest_renderer_stats(&mut self, stats: &RendererStats) -> Arc<MetricsSnapshot> {
        if self.is_disposed() {
            log::trace!("Renderer stats ingested after dispose, ignoring.");
            return self.store.shared();
        }
        if !stats.is_valid() {
            log::warn!("Dropping invalid renderer stats for frame {}.", stats.frame_number);
            return self.store.shared();
        }

        let now_ms = self.now_ms();
        self.frame_count += 1;

        self.update_renderer(stats, now_ms);
        self.update_frame_timing(now_ms);
        self.update_gpu(stats, now_ms);
        self.pump();
        if self.frame_count % self.config.memory_check_interval_frames == 0 {
            self.check_memory();
        }

        self.store.set_frame_count(self.frame_count);
        self.store.publish(now_ms)
    }

    fn update_renderer(&mut self, stats: &RendererStats, now_ms: f64) {
        let counters = [
            (MetricKey::DrawCalls, f64::from(stats.draw_calls)),
            (MetricKey::Triangles, stats.triangles as f64),
            (MetricKey::Points, stats.points as f64),
            (MetricKey::Lines, stats.lines as f64),
            (MetricKey::Geometries, f64::from(stats.geometries)),
            (MetricKey::Textures, f64::from(stats.textures)),
            (MetricKey::Programs, f64::from(stats.programs)),
        ];
        for (key, value) in counters {
            self.store.update(key, value, now_ms);
        }
    }

    fn update_frame_timing(&mut self, now_ms: f64) {
        let Some(timing) = self.frame_rate.sample(now_ms) else {
            return;
        };
        self.aggregator.record(MetricKey::FrameTime, timing.frame_time_ms);
        self.store.update(MetricKey::FrameTime, timing.frame_time_ms, now_ms);
        self.store.update(MetricKey::Fps, timing.fps, now_ms);

        let Some(window) = self.aggregator.window(MetricKey::FrameTime) else {
            return;
        };
        let average = window.average();
        let derived = [
            (MetricKey::AverageFrameTime, average),
            (MetricKey::AverageFps, if average > 0.0 { 1000.0 / average } else { 0.0 }),
            (MetricKey::MinFrameTime, window.min()),
            (MetricKey::MaxFrameTime, window.max()),
            (MetricKey::FrameTimeJitter, window.std_dev()),
        ];
        for (key, value) in derived {
            self.store.update(key, value, now_ms);
        }
    }

    fn update_gpu(&mut self, stats: &RendererStats, now_ms: f64) {
        let reading = self.gpu.update(
            stats,
            self.frame_rate.frame_time_ms(),
            self.xr.is_active(),
            now_ms,
            &mut self.aggregator,
        );
        self.store
            .update(MetricKey::GpuFrameTime, reading.gpu_frame_time_ms, now_ms);
        self.store
            .set_gpu_timing_measured(reading.source == GpuTimingSource::Measured);
    }

    /// Applies every sample queued by producers since the last pass.
    /// Returns the number of samples taken from the channel.
    pub fn pump(&mut self) -> usize {
        let Some(receiver) = self.sample_rx.as_ref() else {
            return 0;
        };
        let events = receiver.drain();
        let count = events.len();
        for event in events {
            self.apply_event(event);
        }
        count
    }

    fn apply_event(&mut self, event: TelemetryEvent) {
        let now_ms = self.now_ms();
        match event {
            TelemetryEvent::LatencyProbe { latency_ms } => {
                let sample = MetricSample::new(MetricKey::NetworkLatency, latency_ms, now_ms);
                match self.aggregator.record_sample(&sample) {
                    Ok(()) => {
                        let average = self.aggregator.average(MetricKey::NetworkLatency);
                        self.store.update(MetricKey::NetworkLatency, average, now_ms);
                    }
                    Err(e) => log::debug!("{e}"),
                }
            }
            TelemetryEvent::GcPause { duration_ms } => {
                if self.memory.record_gc(duration_ms) {
                    self.store
                        .update(MetricKey::GcCount, self.memory.gc_count() as f64, now_ms);
                    self.store.update(MetricKey::LastGcPause, duration_ms, now_ms);
                }
            }
            TelemetryEvent::Heap(report) => self.apply_heap(report),
            TelemetryEvent::XrFrame {
                session,
                timestamp_ms,
            } => {
                if self.xr.on_frame(session, timestamp_ms) {
                    let readings = self.xr.readings();
                    self.store
                        .update(MetricKey::XrFrameRate, readings.frame_rate, now_ms);
                    self.store.update(
                        MetricKey::XrSessionInitTime,
                        readings.session_init_time_ms,
                        now_ms,
                    );
                }
            }
            TelemetryEvent::XrPose {
                session,
                event_ms,
                processed_ms,
            } => {
                let timing = InputTiming {
                    event_ms,
                    processed_ms,
                };
                if self.xr.record_pose(session, timing) {
                    let mtp = self.xr.readings().motion_to_photon_ms;
                    self.store.update(MetricKey::MotionToPhoton, mtp, now_ms);
                }
            }
            TelemetryEvent::XrControllerInput {
                session,
                event_ms,
                processed_ms,
            } => {
                let timing = InputTiming {
                    event_ms,
                    processed_ms,
                };
                if self.xr.record_controller_input(session, timing) {
                    let lag = self.xr.readings().controller_input_lag_ms;
                    self.store.update(MetricKey::ControllerInputLag, lag, now_ms);
                }
            }
        }
    }

    fn check_memory(&mut self) {
        self.monitors.update_all();
        let report = self.heap_source.as_ref().and_then(|s| s.heap_report());
        if let Some(report) = report {
            self.apply_heap(report);
        }
    }

    fn apply_heap(&mut self, report: HeapReport) {
        let now_ms = self.now_ms();
        let leak = self.memory.record(report);
        self.store.update(MetricKey::HeapUsed, report.used_mb(), now_ms);
        self.store.update(MetricKey::HeapTotal, report.total_mb(), now_ms);
        self.store.update(MetricKey::HeapLimit, report.limit_mb(), now_ms);
        self.store.set_leak_suspected(leak);
    }

    /// Returns a copy of the last published snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.store.snapshot()
    }

    /// Returns a shared handle to the last published snapshot.
    pub fn shared_snapshot(&self) -> Arc<MetricsSnapshot> {
        self.store.shared()
    }

    /// Returns the last published snapshot as JSON.
    /// ## Returns
    /// The JSON text, or `TelemetryError::Serialization`.
    pub fn snapshot_json(&self) -> TelemetryResult<String> {
        serde_json::to_string(&*self.store.shared())
            .map_err(|e| TelemetryError::Serialization(e.to_string()))
    }

    /// Returns and clears the change events recorded since the last call,
    /// newest first. Each event is returned by exactly one call.
    pub fn drain_change_events(&mut self) -> Vec<ChangeEvent> {
        self.store.drain_changes()
    }

    /// Returns the retained change history, newest first, without draining it.
    pub fn recent_changes(&self) -> Vec<ChangeEvent> {
        self.store.recent_changes()
    }

    /// Starts tracking an XR session. GPU timer queries are suspended while
    /// it is attached.
    ///
    /// ## Arguments
    /// * `info` - The session to track. Replaces any session still attached.
    ///
    /// ## Returns
    /// The id to tag the session's frame and input samples with.
    pub fn attach_xr_session(&mut self, info: XrSessionInfo) -> XrSessionId {
        let now_ms = self.now_ms();
        self.xr.attach(info, now_ms);
        self.store.set_xr_active(true);
        self.store.publish(now_ms);
        info.id
    }

    /// Ends the XR session, if any. XR metrics keep their last values.
    /// ## Returns
    /// The id of the session that ended, or `None` if none was attached.
    pub fn detach_xr_session(&mut self) -> Option<XrSessionId> {
        let ended = self.xr.detach()?;
        let now_ms = self.now_ms();
        self.store.set_xr_active(false);
        self.store.publish(now_ms);
        Some(ended)
    }

    /// Handles an XR frame callback on the calling thread.
    pub fn on_xr_frame(&mut self, session: XrSessionId, timestamp_ms: f64) {
        self.apply_event(TelemetryEvent::XrFrame {
            session,
            timestamp_ms,
        });
    }

    /// Records a tracked pose change reaching the display.
    /// ## Arguments
    /// * `session` - The session the pose belongs to. Stale ids are ignored.
    /// * `event_ms` - When the pose changed.
    /// * `processed_ms` - When the change was processed for display.
    pub fn record_xr_pose(&mut self, session: XrSessionId, event_ms: f64, processed_ms: f64) {
        self.apply_event(TelemetryEvent::XrPose {
            session,
            event_ms,
            processed_ms,
        });
    }

    /// Records a controller input being processed.
    pub fn record_controller_input(
        &mut self,
        session: XrSessionId,
        event_ms: f64,
        processed_ms: f64,
    ) {
        self.apply_event(TelemetryEvent::XrControllerInput {
            session,
            event_ms,
            processed_ms,
        });
    }

    /// Returns a sender for asynchronous producers.
    pub fn sample_sender(&self) -> SampleSender {
        self.sample_tx.clone()
    }

    /// Runs `measure` on a background thread every
    /// `latency_probe_interval_ms`, until the engine is disposed.
    ///
    /// ## Arguments
    /// * `measure` - The latency source, moved onto the probe thread.
    ///
    /// ## Returns
    /// `TelemetryError::ChannelClosed` once disposed, or
    /// `TelemetryError::ProbeSpawnFailed` if the thread cannot start.
    pub fn spawn_latency_probe<M: LatencyMeasure>(&mut self, measure: M) -> TelemetryResult<()> {
        if self.is_disposed() {
            return Err(TelemetryError::ChannelClosed);
        }
        let scheduler = ProbeScheduler::spawn(
            measure,
            self.config.latency_probe_interval(),
            self.sample_tx.clone(),
        )?;
        self.probes.push(scheduler);
        Ok(())
    }

    /// The registry of resource monitors polled on heap checks.
    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    /// The configuration the engine runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Capability state of the GPU timer.
    pub fn gpu_timing_state(&self) -> GpuTimingState {
        self.gpu.state()
    }

    /// Number of GPU timer queries currently owned.
    pub fn gpu_queries_in_flight(&self) -> usize {
        self.gpu.in_flight_count()
    }

    /// Number of frames ingested.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns `true` while an XR session is attached.
    pub fn xr_active(&self) -> bool {
        self.xr.is_active()
    }

    /// Stops the probes, releases the GPU queries, ends the XR session and
    /// closes the sample channel. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        for probe in &mut self.probes {
            probe.stop();
        }
        self.probes.clear();
        self.gpu.dispose();
        if self.xr.detach().is_some() {
            self.store.set_xr_active(false);
        }
        self.sample_rx = None;
        let now_ms = self.now_ms();
        self.store.publish(now_ms);
        log::info!("Telemetry engine disposed after {} frames.", self.frame_count);
    }
}

impl Drop for TelemetryEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
