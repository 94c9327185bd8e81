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

//! XR comfort metrics: session init time, compositor frame rate,
//! motion-to-photon delay and controller input lag.

use crate::window::RollingWindow;
use vitals_core::xr::{XrSessionId, XrSessionInfo, XrSessionMode};

/// When an input or pose changed and when that change was processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputTiming {
    /// When the change happened, in milliseconds.
    pub event_ms: f64,
    /// When it was processed for display, in milliseconds.
    pub processed_ms: f64,
}

impl InputTiming {
    /// Returns the latency if both timestamps are finite and ordered.
    pub fn latency_ms(&self) -> Option<f64> {
        let latency = self.processed_ms - self.event_ms;
        (latency.is_finite() && latency >= 0.0).then_some(latency)
    }
}

/// State owned for the lifetime of one XR session.
#[derive(Debug, Clone)]
pub struct XrSessionContext {
    info: XrSessionInfo,
    attached_at_ms: f64,
    last_frame_ms: Option<f64>,
    motion: RollingWindow<InputTiming>,
    controller: RollingWindow<InputTiming>,
}

impl XrSessionContext {
    fn new(info: XrSessionInfo, attached_at_ms: f64, motion: usize, controller: usize) -> Self {
        Self {
            info,
            attached_at_ms,
            last_frame_ms: None,
            motion: RollingWindow::new(motion),
            controller: RollingWindow::new(controller),
        }
    }

    /// The session id.
    pub fn id(&self) -> XrSessionId {
        self.info.id
    }

    /// The session mode.
    pub fn mode(&self) -> XrSessionMode {
        self.info.mode
    }

    /// When the session was attached to the engine, in milliseconds.
    pub fn attached_at_ms(&self) -> f64 {
        self.attached_at_ms
    }

    /// Number of pose samples held.
    pub fn motion_samples(&self) -> usize {
        self.motion.len()
    }

    /// Number of controller input samples held.
    pub fn controller_samples(&self) -> usize {
        self.controller.len()
    }
}

fn mean_latency(window: &RollingWindow<InputTiming>) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let sum: f64 = window.iter().filter_map(InputTiming::latency_ms).sum();
    Some(sum / window.len() as f64)
}

/// The XR metrics as currently held. Every value is the last one measured,
/// or 0.0 before the first measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct XrReadings {
    /// Whether a session is attached.
    pub active: bool,
    /// Compositor frame rate, in frames per second.
    pub frame_rate: f64,
    /// Time from session request to the first frame callback, in milliseconds.
    pub session_init_time_ms: f64,
    /// Mean motion-to-photon delay over the pose history, in milliseconds.
    pub motion_to_photon_ms: f64,
    /// Mean controller input lag over the input history, in milliseconds.
    pub controller_input_lag_ms: f64,
}

/// Tracks the XR session, if any, and the metrics derived from its callbacks.
///
/// Samples tagged with an id other than the attached session's are ignored,
/// so callbacks that arrive after a session ended cannot corrupt the next one.
#[derive(Debug, Clone)]
pub struct XrTracker {
    context: Option<XrSessionContext>,
    readings: XrReadings,
    motion_window: usize,
    controller_window: usize,
}

impl XrTracker {
    /// Creates a tracker with the given pose and controller history capacities.
    pub fn new(motion_window: usize, controller_window: usize) -> Self {
        Self {
            context: None,
            readings: XrReadings::default(),
            motion_window,
            controller_window,
        }
    }

    /// Starts tracking `info`. A session still attached is replaced.
    pub fn attach(&mut self, info: XrSessionInfo, now_ms: f64) {
        if let Some(previous) = self.context.take() {
            log::warn!(
                "XR session {} attached while {} was still active, replacing it.",
                info.id,
                previous.id()
            );
        }
        log::info!("XR session {} attached ({:?}).", info.id, info.mode);
        self.context = Some(XrSessionContext::new(
            info,
            now_ms,
            self.motion_window,
            self.controller_window,
        ));
        self.readings.active = true;
    }

    /// Ends the current session, discarding its context. The metrics keep
    /// their last values. Returns the id of the session that ended.
    pub fn detach(&mut self) -> Option<XrSessionId> {
        let context = self.context.take()?;
        self.readings.active = false;
        log::info!("XR session {} detached.", context.id());
        Some(context.id())
    }

    fn context_for(&mut self, session: XrSessionId) -> Option<&mut XrSessionContext> {
        match self.context.as_mut() {
            Some(context) if context.id() == session => Some(context),
            _ => {
                log::trace!("Ignoring XR sample from inactive session {session}.");
                None
            }
        }
    }

    /// Handles an XR frame callback. Returns `false` if the sample was ignored.
    pub fn on_frame(&mut self, session: XrSessionId, timestamp_ms: f64) -> bool {
        if !timestamp_ms.is_finite() {
            return false;
        }
        let Some(context) = self.context_for(session) else {
            return false;
        };
        match context.last_frame_ms.replace(timestamp_ms) {
            None => {
                let init_time = (timestamp_ms - context.info.requested_at_ms).max(0.0);
                self.readings.session_init_time_ms = init_time;
                log::info!("XR session {session} presented its first frame after {init_time:.1} ms.");
            }
            Some(previous) => {
                let delta = timestamp_ms - previous;
                if delta > 0.0 {
                    self.readings.frame_rate = 1000.0 / delta;
                }
            }
        }
        true
    }

    /// Records a pose change reaching the display.
    pub fn record_pose(&mut self, session: XrSessionId, timing: InputTiming) -> bool {
        if timing.latency_ms().is_none() {
            return false;
        }
        let Some(context) = self.context_for(session) else {
            return false;
        };
        context.motion.push(timing);
        if let Some(mean) = mean_latency(&context.motion) {
            self.readings.motion_to_photon_ms = mean;
        }
        true
    }

    /// Records a controller input being processed.
    pub fn record_controller_input(&mut self, session: XrSessionId, timing: InputTiming) -> bool {
        if timing.latency_ms().is_none() {
            return false;
        }
        let Some(context) = self.context_for(session) else {
            return false;
        };
        context.controller.push(timing);
        if let Some(mean) = mean_latency(&context.controller) {
            self.readings.controller_input_lag_ms = mean;
        }
        true
    }

    /// Returns the current readings.
    pub fn readings(&self) -> XrReadings {
        self.readings
    }

    /// Returns `true` while a session is attached.
    pub fn is_active(&self) -> bool {
        self.context.is_some()
    }

    /// Returns the attached session's context.
    pub fn context(&self) -> Option<&XrSessionContext> {
        self.context.as_ref()
    }
}
