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

//! Provides traits and data structures for polled sample sources.
//!
//! "Monitoring" is distinct from pushed samples in that it involves actively
//! polling a host resource (like the process heap) to get a reading, whereas
//! pushed samples arrive on their own cadence through the sample channel.

use std::borrow::Cow;
use std::fmt::Debug;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// The core trait for a polled resource monitor.
///
/// The telemetry engine holds a collection of these and calls `update` on
/// each periodic resource check, before reading the providers it knows about.
pub trait ResourceMonitor: Send + Sync + Debug + 'static {
    /// Returns a unique, human-readable identifier for this monitor instance.
    fn monitor_id(&self) -> Cow<'static, str>;

    /// Returns the general type of resource being monitored.
    fn resource_type(&self) -> MonitoredResourceType;

    /// Allows downcasting to a concrete `ResourceMonitor` type.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Triggers the monitor to refresh its internal state by polling the resource.
    /// This default implementation does nothing, for monitors that update passively.
    fn update(&self) {
        // Default: no-op
    }
}

/// An enumeration of the types of resources that can be monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitoredResourceType {
    /// The process or runtime heap.
    Heap,
    /// GPU execution timing.
    Gpu,
}

/// A reading of heap memory, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapReport {
    /// Bytes currently in use.
    pub used_bytes: u64,
    /// Bytes reserved by the runtime.
    pub total_bytes: u64,
    /// Upper bound the runtime will grow to.
    pub limit_bytes: u64,
}

impl HeapReport {
    /// Creates a new report.
    pub fn new(used_bytes: u64, total_bytes: u64, limit_bytes: u64) -> Self {
        Self {
            used_bytes,
            total_bytes,
            limit_bytes,
        }
    }

    /// Returns the used heap in megabytes (MB).
    pub fn used_mb(&self) -> f64 {
        self.used_bytes as f64 / BYTES_PER_MB
    }

    /// Returns the reserved heap in megabytes (MB).
    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_MB
    }

    /// Returns the heap limit in megabytes (MB).
    pub fn limit_mb(&self) -> f64 {
        self.limit_bytes as f64 / BYTES_PER_MB
    }
}

/// A trait for types that can provide heap readings.
///
/// Returning `None` means heap introspection is unavailable in the host; the
/// engine then holds the last known value.
pub trait HeapProvider: Send + Sync + Debug {
    /// Returns the latest heap reading, if the host exposes one.
    fn heap_report(&self) -> Option<HeapReport>;
}

/// A latency measurement that a probe scheduler runs on a fixed cadence.
pub trait LatencyMeasure: Send + 'static {
    /// A short name used for the probe thread and in logs.
    fn name(&self) -> Cow<'static, str>;

    /// Takes one measurement, in milliseconds.
    /// `None` is a transient failure; the previous value is kept for that tick.
    fn measure(&mut self) -> Option<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_heap_report_megabytes() {
        let report = HeapReport::new(50 * 1024 * 1024, 64 * 1024 * 1024, 2048 * 1024 * 1024);
        assert_relative_eq!(report.used_mb(), 50.0);
        assert_relative_eq!(report.total_mb(), 64.0);
        assert_relative_eq!(report.limit_mb(), 2048.0);
    }

    #[test]
    fn test_default_report_is_zeroed() {
        let report = HeapReport::default();
        assert_eq!(report.used_mb(), 0.0);
    }
}
