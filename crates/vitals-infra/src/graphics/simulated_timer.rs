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

//! A software stand-in for a GPU timer-query extension.

use std::collections::HashMap;
use vitals_core::renderer::{GpuQueryId, GpuTimerBackend};
use vitals_core::{Stopwatch, TelemetryError, TelemetryResult};

#[derive(Debug)]
enum QueryState {
    Created,
    Running(Stopwatch),
    Ended { elapsed_ns: u64, polls_left: u32 },
}

/// Times each query span on the CPU clock and scales it by a fixed GPU share.
///
/// Results only become available after `latency_polls` availability checks,
/// which mimics the few frames of lag of real timer queries.
#[derive(Debug)]
pub struct SimulatedGpuTimer {
    queries: HashMap<GpuQueryId, QueryState>,
    active: Option<GpuQueryId>,
    next_id: u64,
    gpu_share: f64,
    latency_polls: u32,
}

impl SimulatedGpuTimer {
    /// Creates a timer reporting `gpu_share` of each span, available after
    /// `latency_polls` polls.
    pub fn new(gpu_share: f64, latency_polls: u32) -> Self {
        Self {
            queries: HashMap::new(),
            active: None,
            next_id: 0,
            gpu_share: gpu_share.clamp(0.0, 1.0),
            latency_polls,
        }
    }

    /// Number of live query objects.
    pub fn live_queries(&self) -> usize {
        self.queries.len()
    }

    fn unknown(id: GpuQueryId) -> TelemetryError {
        TelemetryError::QueryFailed(format!("unknown query {}", id.0))
    }
}

impl Default for SimulatedGpuTimer {
    fn default() -> Self {
        Self::new(0.6, 2)
    }
}

impl GpuTimerBackend for SimulatedGpuTimer {
    fn create_query(&mut self) -> TelemetryResult<GpuQueryId> {
        self.next_id += 1;
        let id = GpuQueryId(self.next_id);
        self.queries.insert(id, QueryState::Created);
        Ok(id)
    }

    fn begin_query(&mut self, id: GpuQueryId) -> TelemetryResult<()> {
        if let Some(active) = self.active {
            return Err(TelemetryError::QueryFailed(format!(
                "query {} is already active",
                active.0
            )));
        }
        let state = self.queries.get_mut(&id).ok_or_else(|| Self::unknown(id))?;
        *state = QueryState::Running(Stopwatch::new());
        self.active = Some(id);
        Ok(())
    }

    fn end_query(&mut self, id: GpuQueryId) -> TelemetryResult<()> {
        let state = self.queries.get_mut(&id).ok_or_else(|| Self::unknown(id))?;
        let QueryState::Running(stopwatch) = state else {
            return Err(TelemetryError::QueryFailed(format!("query {} is not running", id.0)));
        };
        let elapsed_ns = (stopwatch.elapsed().as_nanos() as f64 * self.gpu_share) as u64;
        *state = QueryState::Ended {
            elapsed_ns,
            polls_left: self.latency_polls,
        };
        self.active = None;
        Ok(())
    }

    fn result_available(&mut self, id: GpuQueryId) -> TelemetryResult<bool> {
        match self.queries.get_mut(&id) {
            Some(QueryState::Ended { polls_left, .. }) => {
                if *polls_left == 0 {
                    Ok(true)
                } else {
                    *polls_left -= 1;
                    Ok(false)
                }
            }
            Some(_) => Ok(false),
            None => Err(Self::unknown(id)),
        }
    }

    fn result_ns(&mut self, id: GpuQueryId) -> TelemetryResult<u64> {
        match self.queries.get(&id) {
            Some(QueryState::Ended {
                elapsed_ns,
                polls_left: 0,
            }) => Ok(*elapsed_ns),
            Some(_) => Err(TelemetryError::QueryFailed(format!(
                "result of query {} is not available",
                id.0
            ))),
            None => Err(Self::unknown(id)),
        }
    }

    fn delete_query(&mut self, id: GpuQueryId) -> TelemetryResult<()> {
        if self.active == Some(id) {
            self.active = None;
        }
        self.queries.remove(&id).map(|_| ()).ok_or_else(|| Self::unknown(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn results_arrive_after_latency() {
        let mut timer = SimulatedGpuTimer::new(0.5, 2);
        let id = timer.create_query().unwrap();
        timer.begin_query(id).unwrap();
        thread::sleep(Duration::from_millis(4));
        timer.end_query(id).unwrap();

        assert!(!timer.result_available(id).unwrap());
        assert!(!timer.result_available(id).unwrap());
        assert!(timer.result_available(id).unwrap());
        let elapsed = timer.result_ns(id).unwrap();
        assert!(elapsed >= 2_000_000, "{elapsed} ns");

        timer.delete_query(id).unwrap();
        assert_eq!(timer.live_queries(), 0);
    }

    #[test]
    fn only_one_query_may_be_active() {
        let mut timer = SimulatedGpuTimer::default();
        let first = timer.create_query().unwrap();
        let second = timer.create_query().unwrap();
        timer.begin_query(first).unwrap();
        assert!(timer.begin_query(second).is_err());
        timer.end_query(first).unwrap();
        assert!(timer.begin_query(second).is_ok());
    }

    #[test]
    fn unknown_queries_are_errors() {
        let mut timer = SimulatedGpuTimer::default();
        assert!(timer.result_available(GpuQueryId(99)).is_err());
        assert!(timer.delete_query(GpuQueryId(99)).is_err());
        assert!(timer.result_ns(GpuQueryId(99)).is_err());
    }
}
