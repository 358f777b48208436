//! Rolling feature window
//!
//! Fixed-capacity FIFO of `(mq2, mq135)` voltage pairs. The classifier only
//! runs its model path once the window is full; until then the window is
//! "warming up" and [`FeatureWindow::features`] returns `None`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::defaults::FEATURE_WINDOW_SIZE;

/// Canonical feature names in model input order.
pub const FEATURE_NAMES: [&str; 8] = [
    "mq2_now",
    "mq135_now",
    "mq2_delta",
    "mq135_delta",
    "mq2_mean_window",
    "mq135_mean_window",
    "mq2_max_window",
    "mq135_max_window",
];

/// Window summary fed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub mq2_now: f64,
    pub mq135_now: f64,
    /// Last minus first sample in the window
    pub mq2_delta: f64,
    pub mq135_delta: f64,
    pub mq2_mean: f64,
    pub mq135_mean: f64,
    pub mq2_max: f64,
    pub mq135_max: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order.
    pub fn as_array(&self) -> [f64; 8] {
        [
            self.mq2_now,
            self.mq135_now,
            self.mq2_delta,
            self.mq135_delta,
            self.mq2_mean,
            self.mq135_mean,
            self.mq2_max,
            self.mq135_max,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct FeatureWindow {
    samples: VecDeque<(f64, f64)>,
    capacity: usize,
}

impl Default for FeatureWindow {
    fn default() -> Self {
        Self::new(FEATURE_WINDOW_SIZE)
    }
}

impl FeatureWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, mq2: f64, mq135: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((mq2, mq135));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Up to `n` most recent samples, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = (f64, f64)> + '_ {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied()
    }

    /// Oldest sample still held.
    pub fn oldest(&self) -> Option<(f64, f64)> {
        self.samples.front().copied()
    }

    pub fn latest(&self) -> Option<(f64, f64)> {
        self.samples.back().copied()
    }

    /// Summary features, only once the window is full.
    pub fn features(&self) -> Option<FeatureVector> {
        if !self.is_full() {
            return None;
        }
        let (first_mq2, first_mq135) = self.oldest()?;
        let (mq2_now, mq135_now) = self.latest()?;

        let mq2 = self.samples.iter().map(|s| s.0);
        let mq135 = self.samples.iter().map(|s| s.1);

        Some(FeatureVector {
            mq2_now,
            mq135_now,
            mq2_delta: mq2_now - first_mq2,
            mq135_delta: mq135_now - first_mq135,
            mq2_mean: Statistics::mean(mq2.clone()),
            mq135_mean: Statistics::mean(mq135.clone()),
            mq2_max: mq2.fold(f64::NEG_INFINITY, f64::max),
            mq135_max: mq135.fold(f64::NEG_INFINITY, f64::max),
        })
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
