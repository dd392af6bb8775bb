//! Bounded, time-ordered history of committed per-second averages.

use crate::sampling::data::HistoryEntry;
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// FIFO ring of [`HistoryEntry`] values.
///
/// Once `capacity` entries are held, each push evicts the oldest one.
/// Timestamps are strictly increasing in insertion order; an entry that is
/// not newer than the tail is rejected.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: RwLock<VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<HistoryEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<HistoryEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Append `entry`, evicting the oldest entry when full.
    ///
    /// Returns `false` if the entry was rejected for not being newer than the
    /// current tail.
    pub fn push(&self, entry: HistoryEntry) -> bool {
        let mut entries = self.write();
        if let Some(last) = entries.back() {
            if entry.timestamp <= last.timestamp {
                warn!(
                    "Dropping history entry at {} (not after {})",
                    entry.timestamp, last.timestamp
                );
                return false;
            }
        }
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        true
    }

    /// Copy of all entries, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.read().iter().copied().collect()
    }

    /// Newest entry, if any.
    pub fn latest(&self) -> Option<HistoryEntry> {
        self.read().back().copied()
    }

    /// Remove all entries, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.write();
        let removed = entries.len();
        entries.clear();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn entry(secs: i64, v: f64) -> HistoryEntry {
        let base: DateTime<Utc> = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        HistoryEntry {
            average_voltage: v,
            timestamp: base + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_push_and_snapshot_in_order() {
        let history = HistoryBuffer::new(4);
        assert!(history.push(entry(0, 1.0)));
        assert!(history.push(entry(1, 2.0)));

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].average_voltage, 1.0);
        assert_eq!(snapshot[1].average_voltage, 2.0);
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let history = HistoryBuffer::new(3);
        for i in 0..5 {
            history.push(entry(i, i as f64));
        }
        let voltages: Vec<f64> = history.snapshot().iter().map(|e| e.average_voltage).collect();
        assert_eq!(voltages, vec![2.0, 3.0, 4.0]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_rejects_non_increasing_timestamp() {
        let history = HistoryBuffer::new(3);
        assert!(history.push(entry(5, 1.0)));
        assert!(!history.push(entry(5, 2.0)));
        assert!(!history.push(entry(4, 3.0)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_clear() {
        let history = HistoryBuffer::new(3);
        history.push(entry(0, 1.0));
        history.push(entry(1, 1.0));
        assert_eq!(history.clear(), 2);
        assert!(history.is_empty());
        assert_eq!(history.latest(), None);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let history = HistoryBuffer::new(0);
        assert_eq!(history.capacity(), 1);
        history.push(entry(0, 1.0));
        history.push(entry(1, 2.0));
        assert_eq!(history.snapshot(), vec![entry(1, 2.0)]);
    }
}
