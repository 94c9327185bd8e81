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

use crate::error::TelemetryResult;
use std::fmt::Debug;

/// An opaque handle to a native timer query object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuQueryId(pub u64);

/// The native GPU timer-query extension.
///
/// Results are asynchronous: a query ended during frame N typically becomes
/// available a few frames later. Callers must poll `result_available` and
/// never block on a result.
pub trait GpuTimerBackend: Send + Debug {
    /// Allocates a new query object.
    fn create_query(&mut self) -> TelemetryResult<GpuQueryId>;

    /// Starts measuring elapsed GPU time into `id`.
    fn begin_query(&mut self, id: GpuQueryId) -> TelemetryResult<()>;

    /// Stops measuring into `id`. Only one query may be active at a time.
    fn end_query(&mut self, id: GpuQueryId) -> TelemetryResult<()>;

    /// Returns `true` once the result of `id` can be read without stalling.
    fn result_available(&mut self, id: GpuQueryId) -> TelemetryResult<bool>;

    /// Reads the elapsed GPU time of `id`, in nanoseconds.
    fn result_ns(&mut self, id: GpuQueryId) -> TelemetryResult<u64>;

    /// Returns `true` if a disjoint operation (clock change, context loss)
    /// invalidated the results currently pending.
    fn is_disjoint(&mut self) -> TelemetryResult<bool> {
        Ok(false)
    }

    /// Releases the query object.
    fn delete_query(&mut self, id: GpuQueryId) -> TelemetryResult<()>;
}

/// Whether the host exposes a GPU timer extension, checked once at startup.
#[derive(Debug, Default)]
pub enum GpuTimerCapability {
    /// The extension is present.
    Available(Box<dyn GpuTimerBackend>),
    /// The extension is absent; GPU time will be estimated.
    #[default]
    Unavailable,
}

impl GpuTimerCapability {
    /// Consumes the capability, returning the backend if any.
    pub fn into_backend(self) -> Option<Box<dyn GpuTimerBackend>> {
        match self {
            GpuTimerCapability::Available(backend) => Some(backend),
            GpuTimerCapability::Unavailable => None,
        }
    }
}
