//! Bounded history of CPU samples.

use std::collections::VecDeque;

/// Fixed-capacity FIFO of the most recent CPU samples, oldest first.
///
/// Pushing into a full timeline evicts the oldest sample, so the length never
/// exceeds [`capacity`](Timeline::capacity).
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Timeline {
    /// Create an empty timeline. A capacity of 0 is treated as 1.
    ///
    /// Storage grows with the samples pushed, not with `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples strictly greater than `threshold`.
    pub fn count_above(&self, threshold: f64) -> usize {
        self.samples.iter().filter(|s| **s > threshold).count()
    }
}
