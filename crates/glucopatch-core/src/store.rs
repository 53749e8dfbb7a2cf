//! Append-only reading history.
//!
//! One writer (the session's frame pump) appends; any number of readers take
//! snapshots. Every append bumps a version counter so renderers can tell
//! whether anything changed since their last snapshot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use glucopatch_types::Reading;

/// Ordered history of readings in arrival order.
///
/// Unbounded by default. With a retention cap, the oldest readings are
/// evicted first once the cap is reached.
#[derive(Debug, Default)]
pub struct ReadingStore {
    readings: RwLock<VecDeque<Reading>>,
    max_readings: Option<usize>,
    version: AtomicU64,
}

impl ReadingStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store keeping at most `max_readings` (`None` = unbounded).
    pub fn with_retention(max_readings: Option<usize>) -> Self {
        Self {
            readings: RwLock::new(VecDeque::new()),
            max_readings: max_readings.map(|m| m.max(1)),
            version: AtomicU64::new(0),
        }
    }

    /// The retention cap, if any.
    pub fn max_readings(&self) -> Option<usize> {
        self.max_readings
    }

    /// Append a reading at the end of the history.
    pub fn append(&self, reading: Reading) {
        let mut readings = self.readings.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(max) = self.max_readings {
            while readings.len() >= max {
                readings.pop_front();
            }
        }
        readings.push_back(reading);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Copy of the full history, oldest first.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of readings held.
    pub fn len(&self) -> usize {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no readings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent reading.
    pub fn latest(&self) -> Option<Reading> {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    /// Number of appends since creation. Never decreases.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
