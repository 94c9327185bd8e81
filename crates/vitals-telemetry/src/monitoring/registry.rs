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

//! Registry for managing resource monitors.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use vitals_core::telemetry::{MonitoredResourceType, ResourceMonitor};

/// A thread-safe registry for resource monitors.
#[derive(Debug, Clone, Default)]
pub struct MonitorRegistry {
    monitors: Arc<Mutex<Vec<Arc<dyn ResourceMonitor>>>>,
}

impl MonitorRegistry {
    /// Creates a new, empty monitor registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Arc<dyn ResourceMonitor>>> {
        // The list is only ever pushed to, so a poisoned lock still holds a valid Vec.
        self.monitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new resource monitor.
    pub fn register(&self, monitor: Arc<dyn ResourceMonitor>) {
        let monitor_id = monitor.monitor_id();
        self.guard().push(monitor);
        log::info!("Registered resource monitor: {}", monitor_id);
    }

    /// Calls the `update` method on all registered monitors.
    pub fn update_all(&self) {
        for monitor in self.guard().iter() {
            monitor.update();
        }
    }

    /// Returns a clone of all registered monitors.
    pub fn get_all_monitors(&self) -> Vec<Arc<dyn ResourceMonitor>> {
        self.guard().clone()
    }

    /// Returns the monitors watching the given kind of resource.
    pub fn monitors_of(&self, resource_type: MonitoredResourceType) -> Vec<Arc<dyn ResourceMonitor>> {
        self.guard()
            .iter()
            .filter(|m| m.resource_type() == resource_type)
            .cloned()
            .collect()
    }

    /// Returns the number of registered monitors.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Returns `true` if no monitor is registered.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}
