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

use crate::error::{TelemetryError, TelemetryResult};
use crate::telemetry::TelemetryEvent;
use flume::TrySendError;

/// Creates a bounded sample channel.
///
/// Producers never block: when the channel is full the sample is dropped,
/// since a newer one will arrive on the producer's next cadence anyway.
///
/// ## Arguments
/// * `capacity` - Maximum number of samples buffered between two drains.
///
/// ## Returns
/// The producer and consumer ends of the channel.
pub fn sample_channel(capacity: usize) -> (SampleSender, SampleReceiver) {
    let (sender, receiver) = flume::bounded(capacity.max(1));
    log::debug!("Sample channel initialized with capacity {capacity}.");
    (SampleSender { sender }, SampleReceiver { receiver })
}

/// The producer end of a sample channel. Cheap to clone; one per source.
#[derive(Debug, Clone)]
pub struct SampleSender {
    sender: flume::Sender<TelemetryEvent>,
}

impl SampleSender {
    /// Submits a sample without blocking.
    ///
    /// ## Returns
    /// `Ok(true)` if queued, `Ok(false)` if dropped because the channel is full,
    /// or `Err(ChannelClosed)` once the consumer is gone.
    pub fn submit(&self, event: TelemetryEvent) -> TelemetryResult<bool> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(dropped)) => {
                log::warn!("Sample channel full, dropping {dropped:?}.");
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(TelemetryError::ChannelClosed),
        }
    }

    /// Returns `true` once the consumer end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_disconnected()
    }
}

/// The consumer end of a sample channel, owned by the engine.
#[derive(Debug)]
pub struct SampleReceiver {
    receiver: flume::Receiver<TelemetryEvent>,
}

impl SampleReceiver {
    /// Takes every sample queued so far, oldest first, without blocking.
    pub fn drain(&self) -> Vec<TelemetryEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of queued samples.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if no sample is queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
