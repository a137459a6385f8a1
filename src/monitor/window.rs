//! Bounded window of the most recent readings.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// A bounded, ordered buffer of the most recent values for one channel.
///
/// The window never holds more than its capacity: pushing onto a full
/// window evicts the oldest value first. Timestamps are not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingWindow {
    values: VecDeque<f64>,
    capacity: NonZeroUsize,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity.get()),
            capacity,
        }
    }

    /// The fixed capacity N.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the window holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check if the window holds exactly N values.
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity.get()
    }

    /// Append `value` as the newest entry, evicting the oldest if full.
    pub fn push(&mut self, value: f64) {
        if self.is_full() {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Remove and return the oldest value.
    pub fn evict_oldest(&mut self) -> Option<f64> {
        self.values.pop_front()
    }

    /// The oldest value (front).
    pub fn oldest(&self) -> Option<f64> {
        self.values.front().copied()
    }

    /// The newest value (back).
    pub fn newest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Largest minus smallest value, `None` when empty.
    pub fn spread(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let (min, max) = self
            .values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
                (min.min(v), max.max(v))
            });
        Some(max - min)
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}
