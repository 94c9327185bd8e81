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

//! Process Heap Resource Monitor
//!
//! Reads the resident memory of the current process through `sysinfo` and
//! exposes it as a heap reading.

use std::borrow::Cow;
use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use vitals_core::telemetry::{HeapProvider, HeapReport, MonitoredResourceType, ResourceMonitor};

/// Heap monitor backed by the operating system's view of the process.
///
/// `used` is the resident set size, `total` the virtual size and `limit` the
/// physical memory of the machine. Readings are refreshed by `update`.
#[derive(Debug)]
pub struct ProcessHeapMonitor {
    id: String,
    pid: Option<Pid>,
    system: Mutex<System>,
    last_report: Mutex<Option<HeapReport>>,
}

impl ProcessHeapMonitor {
    /// Creates a monitor for the current process and takes a first reading.
    pub fn new(id: impl Into<String>) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                log::warn!("Process heap introspection unavailable: {e}");
                None
            }
        };
        let monitor = Self {
            id: id.into(),
            pid,
            system: Mutex::new(System::new()),
            last_report: Mutex::new(None),
        };
        monitor.refresh();
        monitor
    }

    fn refresh(&self) {
        let Some(pid) = self.pid else {
            return;
        };
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        let report = system.process(pid).map(|process| {
            HeapReport::new(
                process.memory(),
                process.virtual_memory(),
                system.total_memory(),
            )
        });
        if report.is_none() {
            log::debug!("Process {pid} not found in the system process list.");
        }
        *self.last_report.lock().unwrap_or_else(PoisonError::into_inner) = report;
    }
}

impl Default for ProcessHeapMonitor {
    fn default() -> Self {
        Self::new("process_heap")
    }
}

impl ResourceMonitor for ProcessHeapMonitor {
    fn monitor_id(&self) -> Cow<'static, str> {
        Cow::Owned(self.id.clone())
    }

    fn resource_type(&self) -> MonitoredResourceType {
        MonitoredResourceType::Heap
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn update(&self) {
        self.refresh();
    }
}

impl HeapProvider for ProcessHeapMonitor {
    fn heap_report(&self) -> Option<HeapReport> {
        *self.last_report.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
