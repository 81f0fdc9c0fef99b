use crate::record::LogRecord;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Insertion-ordered buffer of retained records.
///
/// Producers append at the tail, the evictor trims from the head and
/// readers work on snapshots, so every critical section is a push, a pop or
/// a copy of `Arc` handles. Timestamps never decrease from head to tail,
/// which is what lets [`purge_older_than`](Self::purge_older_than) stop at
/// the first live record.
#[derive(Debug, Default)]
pub struct RetentionStore {
    records: Mutex<VecDeque<Arc<LogRecord>>>,
}

impl RetentionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record at the tail.
    ///
    /// A record stamped earlier than the current tail (a producer that lost
    /// the race for the lock) is raised to the tail's timestamp.
    pub fn append(&self, record: LogRecord) {
        let mut records = self.records.lock();
        let record = match records.back() {
            Some(tail) => record.not_before(tail.timestamp()),
            None => record,
        };
        records.push_back(Arc::new(record));
    }

    /// Point-in-time copy of all records, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<LogRecord>> {
        self.records.lock().iter().cloned().collect()
    }

    /// Remove records from the head while they are strictly older than
    /// `cutoff`. Returns the number of removed records.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records.lock();
        let mut purged = 0;
        while records
            .front()
            .is_some_and(|head| head.timestamp() < cutoff)
        {
            records.pop_front();
            purged += 1;
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
