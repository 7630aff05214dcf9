//! Bounded measurement history.
//!
//! Fixed-capacity ring buffer: records are appended at the tail until the arena is
//! full, after which each push overwrites the oldest slot and advances `head`.
//! Eviction is O(1) and a scan never touches more than `capacity` records.

use crate::measurement::Measurement;

#[derive(Debug, Clone)]
pub struct MeasurementHistory {
    slots: Vec<Measurement>,
    /// Index of the oldest record. Stays 0 until the arena is full.
    head: usize,
    capacity: usize,
}

impl MeasurementHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        MeasurementHistory {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append a record, returning the evicted one when the buffer was full.
    pub fn push(&mut self, record: Measurement) -> Option<Measurement> {
        if self.slots.len() < self.capacity {
            self.slots.push(record);
            None
        } else {
            let evicted = std::mem::replace(&mut self.slots[self.head], record);
            self.head = (self.head + 1) % self.capacity;
            Some(evicted)
        }
    }

    /// Logical index 0 is the oldest record.
    pub fn get(&self, index: usize) -> Option<&Measurement> {
        if index >= self.slots.len() {
            return None;
        }
        Some(&self.slots[(self.head + index) % self.slots.len()])
    }

    pub fn latest(&self) -> Option<&Measurement> {
        self.iter().next_back()
    }

    pub fn oldest(&self) -> Option<&Measurement> {
        self.get(0)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Measurement> + '_ {
        self.slots[self.head..].iter().chain(self.slots[..self.head].iter())
    }

    /// Logical index of the first record with `timestamp >= ts`.
    /// Relies on timestamps being non-decreasing.
    pub fn first_at_or_after(&self, ts: u64) -> usize {
        let (mut lo, mut hi) = (0, self.slots.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.get(mid) {
                Some(m) if m.timestamp < ts => lo = mid + 1,
                _ => hi = mid,
            }
        }
        lo
    }

    /// Copy of every record with `timestamp >= ts`, oldest first.
    pub fn copy_since(&self, ts: u64) -> Vec<Measurement> {
        let start = self.first_at_or_after(ts);
        self.iter().skip(start).copied().collect()
    }

    /// Copy of the newest `count` records, oldest first.
    pub fn copy_recent(&self, count: usize) -> Vec<Measurement> {
        let start = self.slots.len().saturating_sub(count);
        self.iter().skip(start).copied().collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }
}
