//! Bounded recent-log window for replay to a reconnecting controller.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use chrono::Local;

/// Number of entries retained before the oldest is evicted.
pub const LOG_CAPACITY: usize = 100;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ring buffer of timestamped log lines.
///
/// Entries are kept in insertion order; once [`LOG_CAPACITY`] is reached
/// every push evicts the oldest entry.
pub struct LogBuffer {
    history: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    /// Create a buffer holding up to [`LOG_CAPACITY`] entries.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    /// Create a buffer with a custom capacity (at least one entry).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Stamp `msg` with the local time and append it.
    ///
    /// Returns the stored entry.
    pub fn push(&self, msg: &str) -> String {
        let entry = format!("[{}] {msg}", Local::now().format(TIMESTAMP_FORMAT));
        self.push_entry(entry.clone());
        entry
    }

    /// Append an already formatted entry.
    pub fn push_entry(&self, entry: String) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(entry);
    }

    /// Point-in-time copy of the buffered entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been logged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
