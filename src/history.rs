//! Bounded newest-first buffers for round results and resolved forecasts

use crate::types::{Outcome, PredictionRecord};
use std::collections::VecDeque;

/// Rounds kept for the engine and the history endpoint
pub const HISTORY_CAPACITY: usize = 100;

/// Resolved forecasts kept for the accuracy endpoint
pub const RECORD_CAPACITY: usize = 50;

/// Newest-first buffer with a fixed capacity.
///
/// Appending beyond capacity evicts the oldest inserted entry. Entries are
/// never deduplicated or reordered.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

/// Observed round results, newest first
pub type ResultHistory = RollingWindow<Outcome>;

/// Resolved forecasts, newest first
pub type PredictionLog = RollingWindow<PredictionRecord>;

impl<T: Clone> RollingWindow<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Build from entries given newest first, keeping at most `capacity`
    pub fn from_newest_first(capacity: usize, entries: impl IntoIterator<Item = T>) -> Self {
        let mut window = Self::with_capacity(capacity);
        window.entries.extend(entries.into_iter().take(capacity));
        window
    }

    /// Insert at the front, dropping the oldest entry when full
    pub fn append(&mut self, entry: T) {
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.truncate(self.capacity);
        }
    }

    /// Up to `n` most recent entries, newest first
    pub fn recent(&self, n: usize) -> Vec<T> {
        self.entries.iter().take(n).cloned().collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of every entry, newest first
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

impl ResultHistory {
    /// Empty history with the standard capacity
    pub fn results() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl PredictionLog {
    /// Empty record log with the standard capacity
    pub fn records() -> Self {
        Self::with_capacity(RECORD_CAPACITY)
    }
}
