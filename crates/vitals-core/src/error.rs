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

//! Error type shared by every telemetry component.

use crate::telemetry::metrics::MetricKey;
use std::fmt::Display;

/// A specialized `Result` type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// An error that can occur within the telemetry subsystem.
///
/// None of these are fatal to the host: the engine reacts to them by
/// degrading metric fidelity (estimating, holding the last value, dropping
/// the sample) rather than propagating them out of the frame path.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// A host capability (GPU timer extension, heap introspection, ...) is absent.
    CapabilityUnavailable(&'static str),
    /// A call into the GPU timer extension failed.
    QueryFailed(String),
    /// A sample was non-finite or outside the range the metric can take.
    InvalidSample {
        /// The metric the sample was meant for.
        key: MetricKey,
        /// The rejected value.
        value: f64,
    },
    /// The sample channel has no receiver anymore.
    ChannelClosed,
    /// A configuration value was rejected.
    InvalidConfig(String),
    /// A background probe thread could not be started.
    ProbeSpawnFailed(String),
    /// A snapshot could not be serialized.
    Serialization(String),
}

impl Display for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryError::CapabilityUnavailable(what) => write!(f, "Capability unavailable: {what}"),
            TelemetryError::QueryFailed(msg) => write!(f, "GPU timer query failed: {msg}"),
            TelemetryError::InvalidSample { key, value } => {
                write!(f, "Invalid sample for {key}: {value}")
            }
            TelemetryError::ChannelClosed => write!(f, "Sample channel closed"),
            TelemetryError::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
            TelemetryError::ProbeSpawnFailed(msg) => write!(f, "Failed to spawn probe: {msg}"),
            TelemetryError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
        }
    }
}

impl std::error::Error for TelemetryError {}
