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

use super::estimator;
use crate::aggregator::WindowedAggregator;
use std::collections::VecDeque;
use vitals_core::renderer::{GpuQueryId, GpuTimerBackend, GpuTimerCapability, RendererStats};
use vitals_core::telemetry::MetricKey;
use vitals_core::{TelemetryError, TelemetryResult};

/// Capability state of the GPU timer extension for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuTimingState {
    /// The capability has not been looked at yet.
    Unprobed,
    /// Timer queries are issued and drained every renderer update.
    ExtensionAvailable,
    /// Absent or failed; only the estimator runs for the rest of the session.
    ExtensionUnavailable,
}

/// Where the current GPU frame time comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuTimingSource {
    /// The latest resolved timer query.
    Measured,
    /// The load-based estimator.
    Estimated,
}

/// A timer query object the manager owns until it is retired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuQueryHandle {
    /// The native query.
    pub id: GpuQueryId,
    /// When the query was issued, in milliseconds on the engine clock.
    pub issued_at_ms: f64,
}

/// The GPU frame time reported for one renderer update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuFrameReading {
    /// GPU frame time, in milliseconds.
    pub gpu_frame_time_ms: f64,
    /// Whether it was measured or estimated.
    pub source: GpuTimingSource,
}

/// Owns the pool of in-flight GPU timer queries and the fallback estimator.
///
/// Frame-lag model: the query begun at update N spans the GPU work submitted
/// until update N+1, where it is ended and joins the in-flight pool. Results
/// are picked up a few updates later by `process_completed`.
#[derive(Debug)]
pub struct GpuTimingManager {
    capability: Option<GpuTimerCapability>,
    backend: Option<Box<dyn GpuTimerBackend>>,
    state: GpuTimingState,
    in_flight: VecDeque<GpuQueryHandle>,
    active: Option<GpuQueryHandle>,
    pool_capacity: usize,
    smoothing: f64,
    gpu_frame_time_ms: f64,
    source: GpuTimingSource,
    fresh_result: bool,
    resolved: u64,
    evicted: u64,
}

impl GpuTimingManager {
    /// Creates a manager. The capability is probed on first use.
    pub fn new(capability: GpuTimerCapability, pool_capacity: usize, smoothing: f64) -> Self {
        Self {
            capability: Some(capability),
            backend: None,
            state: GpuTimingState::Unprobed,
            in_flight: VecDeque::with_capacity(pool_capacity.max(1)),
            active: None,
            pool_capacity: pool_capacity.max(1),
            smoothing,
            gpu_frame_time_ms: 0.0,
            source: GpuTimingSource::Estimated,
            fresh_result: false,
            resolved: 0,
            evicted: 0,
        }
    }

    /// Resolves the capability once. Later calls are no-ops.
    pub fn probe(&mut self) -> GpuTimingState {
        if let Some(capability) = self.capability.take() {
            self.backend = capability.into_backend();
            self.state = if self.backend.is_some() {
                log::info!("GPU timer extension available, measuring GPU frame time.");
                GpuTimingState::ExtensionAvailable
            } else {
                log::info!("GPU timer extension unavailable, estimating GPU frame time.");
                GpuTimingState::ExtensionUnavailable
            };
        }
        self.state
    }

    /// Runs one renderer update and returns the GPU frame time to publish.
    ///
    /// While an XR session presents, every owned query is retired, none is
    /// issued and the estimator is used. Once presentation ends, the reading
    /// stays estimated until a query issued afterwards resolves. Any extension
    /// failure disables timing for the rest of the session.
    pub fn update(
        &mut self,
        stats: &RendererStats,
        frame_time_ms: f64,
        xr_presenting: bool,
        now_ms: f64,
        aggregator: &mut WindowedAggregator,
    ) -> GpuFrameReading {
        if self.probe() == GpuTimingState::ExtensionAvailable {
            let result = if xr_presenting {
                self.retire_queries()
            } else {
                self.cycle_queries(now_ms, aggregator)
            };
            if let Err(e) = result {
                self.disable(&e);
            }
        }

        let measured = self.state == GpuTimingState::ExtensionAvailable
            && !xr_presenting
            && self.fresh_result;
        if measured {
            self.source = GpuTimingSource::Measured;
        } else {
            self.gpu_frame_time_ms = estimator::smooth_and_clamp(
                self.gpu_frame_time_ms,
                estimator::estimate(stats),
                frame_time_ms,
                self.smoothing,
            );
            self.source = GpuTimingSource::Estimated;
            self.fresh_result = false;
        }

        GpuFrameReading {
            gpu_frame_time_ms: self.gpu_frame_time_ms,
            source: self.source,
        }
    }

    fn cycle_queries(
        &mut self,
        now_ms: f64,
        aggregator: &mut WindowedAggregator,
    ) -> TelemetryResult<()> {
        self.close_active_span()?;
        self.process_completed(aggregator)?;
        self.issue_query(now_ms)
    }

    /// Ends the query spanning the previous frame and moves it to the pool.
    fn close_active_span(&mut self) -> TelemetryResult<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(());
        };
        if let Some(handle) = self.active {
            backend.end_query(handle.id)?;
            self.active = None;
            self.in_flight.push_back(handle);
        }
        Ok(())
    }

    /// Ends and deletes every owned query without reading its result.
    fn retire_queries(&mut self) -> TelemetryResult<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(());
        };
        if let Some(handle) = self.active.take() {
            backend.end_query(handle.id)?;
            self.in_flight.push_back(handle);
        }
        while let Some(handle) = self.in_flight.front().copied() {
            backend.delete_query(handle.id)?;
            self.in_flight.pop_front();
            log::trace!("Retired GPU query {:?} for XR presentation.", handle.id);
        }
        Ok(())
    }

    /// Retires every in-flight query whose result is available, feeding the
    /// elapsed time (converted from ns to ms) into the aggregator as the
    /// authoritative GPU frame time. Never waits on a pending query.
    ///
    /// Results drained while the backend reports a disjoint operation are
    /// discarded. Returns the number of retired queries.
    pub fn process_completed(
        &mut self,
        aggregator: &mut WindowedAggregator,
    ) -> TelemetryResult<usize> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(0);
        };
        if self.in_flight.is_empty() {
            return Ok(0);
        }

        let disjoint = backend.is_disjoint()?;
        let mut retired = 0;
        let mut index = 0;
        while index < self.in_flight.len() {
            let handle = self.in_flight[index];
            if !backend.result_available(handle.id)? {
                index += 1;
                continue;
            }
            let elapsed_ns = backend.result_ns(handle.id)?;
            backend.delete_query(handle.id)?;
            self.in_flight.remove(index);
            retired += 1;

            if disjoint {
                log::debug!("Discarding GPU timing of {:?}: disjoint operation.", handle.id);
                continue;
            }
            let elapsed_ms = elapsed_ns as f64 / 1_000_000.0;
            if aggregator.record(MetricKey::GpuFrameTime, elapsed_ms) {
                self.gpu_frame_time_ms = elapsed_ms;
                self.fresh_result = true;
                self.resolved += 1;
            }
        }
        Ok(retired)
    }

    /// Issues a new query, first evicting the oldest in-flight ones if the
    /// pool is full so that native usage stays bounded even when results
    /// never arrive.
    pub fn issue_query(&mut self, now_ms: f64) -> TelemetryResult<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(TelemetryError::CapabilityUnavailable("gpu timer"));
        };
        while self.in_flight.len() + usize::from(self.active.is_some()) >= self.pool_capacity {
            let Some(oldest) = self.in_flight.front().copied() else {
                break;
            };
            backend.delete_query(oldest.id)?;
            self.in_flight.pop_front();
            self.evicted += 1;
            log::trace!("GPU query pool full, evicted {:?}.", oldest.id);
        }
        if self.active.is_some() {
            return Ok(());
        }

        let id = backend.create_query()?;
        self.active = Some(GpuQueryHandle {
            id,
            issued_at_ms: now_ms,
        });
        backend.begin_query(id)
    }

    fn disable(&mut self, error: &TelemetryError) {
        log::warn!("GPU timing disabled for this session after failure: {error}");
        self.release_queries();
        self.backend = None;
        self.state = GpuTimingState::ExtensionUnavailable;
    }

    /// Deletes every query the manager still owns.
    fn release_queries(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            self.active = None;
            self.in_flight.clear();
            return;
        };
        if let Some(handle) = self.active.take() {
            // An active query must be ended before it can be deleted.
            let _ = backend.end_query(handle.id);
            self.in_flight.push_back(handle);
        }
        for handle in self.in_flight.drain(..) {
            if let Err(e) = backend.delete_query(handle.id) {
                log::debug!("Failed to delete GPU query {:?}: {e}", handle.id);
            }
        }
    }

    /// Releases all GPU resources. Safe to call repeatedly, and when the
    /// extension was never available.
    pub fn dispose(&mut self) {
        if self.backend.is_some() {
            log::debug!("Releasing GPU timer queries.");
        }
        self.release_queries();
        self.backend = None;
        self.capability = None;
        if self.state != GpuTimingState::Unprobed {
            self.state = GpuTimingState::ExtensionUnavailable;
        }
    }

    /// Current capability state.
    pub fn state(&self) -> GpuTimingState {
        self.state
    }

    /// Number of queries owned: in flight plus the one currently spanning a frame.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len() + usize::from(self.active.is_some())
    }

    /// Number of queries whose result was fed to the aggregator.
    pub fn resolved_count(&self) -> u64 {
        self.resolved
    }

    /// Number of queries evicted because the pool was full.
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    /// Current GPU frame time, in milliseconds.
    pub fn gpu_frame_time_ms(&self) -> f64 {
        self.gpu_frame_time_ms
    }

    /// Source of the current GPU frame time.
    pub fn source(&self) -> GpuTimingSource {
        self.source
    }
}

impl Drop for GpuTimingManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
