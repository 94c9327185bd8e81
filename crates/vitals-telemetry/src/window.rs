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

//! Bounded rolling windows and exponential smoothing.

use std::collections::VecDeque;

/// A fixed-capacity FIFO of recent samples.
///
/// Invariant: `len() <= capacity()`. Pushing into a full window evicts the
/// oldest sample first.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    /// Creates an empty window. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes a new sample, returning the evicted one if the window was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(value);
        evicted
    }

    /// Returns the number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the window holds no sample.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns `true` once the next push will evict.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Returns the maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the newest sample.
    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    /// Returns an iterator over the samples in chronological order (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    /// Removes every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl RollingWindow<f64> {
    /// Arithmetic mean of the window, or 0.0 when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Difference between the mean of the newer half and the mean of the
    /// older half. Positive if the metric is increasing.
    pub fn trend(&self) -> f64 {
        let count = self.samples.len();
        if count < 2 {
            return 0.0;
        }
        let half = count / 2;
        let older: f64 = self.samples.iter().take(half).sum::<f64>() / half as f64;
        let newer: f64 = self.samples.iter().skip(count - half).sum::<f64>() / half as f64;
        newer - older
    }

    /// Population variance of the window.
    pub fn variance(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let avg = self.average();
        let sum_sq: f64 = self.samples.iter().map(|v| (v - avg) * (v - avg)).sum();
        sum_sq / self.samples.len() as f64
    }

    /// Standard deviation of the window.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Smallest sample, or 0.0 when empty.
    pub fn min(&self) -> f64 {
        self.samples.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    /// Largest sample, or 0.0 when empty.
    pub fn max(&self) -> f64 {
        self.samples.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }
}

/// Single-pole exponential smoothing: `current*(1-factor) + incoming*factor`.
///
/// Written in incremental form so that `incoming == current` returns
/// `current` bit for bit.
#[inline]
pub fn smooth(current: f64, incoming: f64, factor: f64) -> f64 {
    current + (incoming - current) * factor
}
