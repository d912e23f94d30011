//! Bounded history store
//!
//! Fixed-capacity log of poll records shared between the poll loop (the only
//! writer) and any number of readers. Readers get copies, never the live
//! sequence, and the lock is only held for the in-memory operation.

use crate::types::Record;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Thread-safe, capacity-bounded record log
pub struct HistoryStore {
    records: Mutex<VecDeque<Record>>,
    max_capacity: usize,
}

impl HistoryStore {
    /// Create a store holding at most `max_capacity` records
    ///
    /// A capacity of zero is treated as one.
    pub fn new(max_capacity: usize) -> Self {
        let max_capacity = max_capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_capacity.min(4096))),
            max_capacity,
        }
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Append a record, evicting the oldest ones beyond capacity
    pub fn append(&self, record: Record) {
        let mut records = self.records.lock();
        records.push_back(record);
        while records.len() > self.max_capacity {
            records.pop_front();
        }
    }

    /// Copy of the current sequence, oldest first
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.lock().iter().cloned().collect()
    }

    /// Copy of the most recent record
    pub fn latest(&self) -> Option<Record> {
        self.records.lock().back().cloned()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
