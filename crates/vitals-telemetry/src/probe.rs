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

//! Background latency probes.

use flume::RecvTimeoutError;
use std::thread;
use std::time::Duration;
use vitals_core::event::SampleSender;
use vitals_core::telemetry::{LatencyMeasure, TelemetryEvent};
use vitals_core::{TelemetryError, TelemetryResult};

/// Runs a `LatencyMeasure` on its own thread at a fixed cadence and pushes
/// each result into the engine's sample channel.
///
/// The first measurement is taken as soon as the thread starts. A failed
/// measurement is skipped; the engine keeps the previous value for that tick.
#[derive(Debug)]
pub struct ProbeScheduler {
    name: String,
    stop_tx: Option<flume::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProbeScheduler {
    /// Starts the probe thread.
    pub fn spawn<M: LatencyMeasure>(
        mut measure: M,
        interval: Duration,
        sender: SampleSender,
    ) -> TelemetryResult<Self> {
        let name = measure.name().into_owned();
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name(format!("probe-{name}"))
            .spawn(move || {
                let probe = measure.name();
                log::info!("Latency probe '{probe}' started.");
                loop {
                    match measure.measure() {
                        Some(latency_ms) => {
                            match sender.submit(TelemetryEvent::LatencyProbe { latency_ms }) {
                                Ok(_) => {}
                                Err(TelemetryError::ChannelClosed) => break,
                                Err(e) => log::warn!("Latency probe '{probe}' failed to submit: {e}"),
                            }
                        }
                        None => log::debug!("Latency probe '{probe}' missed a tick."),
                    }

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::info!("Latency probe '{probe}' stopped.");
            })
            .map_err(|e| TelemetryError::ProbeSpawnFailed(e.to_string()))?;

        Ok(Self {
            name,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// The probe name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` until `stop` has been called.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the thread and waits for it to exit. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Latency probe '{}' panicked.", self.name);
            }
        }
    }
}

impl Drop for ProbeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::time::Instant;
    use vitals_core::event::sample_channel;

    struct FixedProbe {
        values: Vec<Option<f64>>,
    }

    impl LatencyMeasure for FixedProbe {
        fn name(&self) -> Cow<'static, str> {
            Cow::Borrowed("fixed")
        }

        fn measure(&mut self) -> Option<f64> {
            if self.values.is_empty() {
                Some(1.0)
            } else {
                self.values.remove(0)
            }
        }
    }

    #[test]
    fn measures_immediately_and_on_cadence() {
        let (tx, rx) = sample_channel(64);
        let probe = FixedProbe {
            values: vec![Some(12.0), None, Some(14.0)],
        };
        let mut scheduler = ProbeScheduler::spawn(probe, Duration::from_millis(5), tx).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut received = Vec::new();
        while received.len() < 2 && Instant::now() < deadline {
            received.extend(rx.drain());
            thread::sleep(Duration::from_millis(5));
        }
        scheduler.stop();

        assert_eq!(received[0], TelemetryEvent::LatencyProbe { latency_ms: 12.0 });
        assert_eq!(received[1], TelemetryEvent::LatencyProbe { latency_ms: 14.0 });
    }

    #[test]
    fn stop_is_prompt_and_idempotent() {
        let (tx, _rx) = sample_channel(8);
        let probe = FixedProbe { values: Vec::new() };
        let mut scheduler = ProbeScheduler::spawn(probe, Duration::from_secs(60), tx).unwrap();
        assert_eq!(scheduler.name(), "fixed");

        let started = Instant::now();
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn exits_when_engine_is_gone() {
        let (tx, rx) = sample_channel(8);
        drop(rx);
        let probe = FixedProbe { values: Vec::new() };
        let mut scheduler = ProbeScheduler::spawn(probe, Duration::from_millis(1), tx).unwrap();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }
}
