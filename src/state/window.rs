// =============================================================================
// Windowed Buffer — bounded FIFO for time-windowed event storage
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Items that carry an event timestamp and can be filtered by time window.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for crate::types::TradeTick {
    fn timestamp(&self) -> DateTime<Utc> {
        self.ts
    }
}

/// Fixed-capacity FIFO that discards the oldest item on overflow.
///
/// Backs the per-symbol trade windows (10 s / 30 s / 30 min) and the
/// quantity history used for percentile baselines. The length never
/// exceeds `max_size`.
#[derive(Debug, Clone)]
pub struct WindowedBuffer<T> {
    items: VecDeque<T>,
    max_size: usize,
}

impl<T> WindowedBuffer<T> {
    /// Create a buffer with the given capacity. `max_size` must be > 0.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "max_size must be positive");
        Self {
            items: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Append an item, evicting the oldest if the buffer is full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.max_size {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Iterate oldest-to-newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> WindowedBuffer<T> {
    /// Snapshot all items, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T: Timestamped + Clone> WindowedBuffer<T> {
    /// Items strictly newer than `cutoff`, oldest first.
    pub fn items_newer_than(&self, cutoff: DateTime<Utc>) -> Vec<T> {
        self.items
            .iter()
            .filter(|item| item.timestamp() > cutoff)
            .cloned()
            .collect()
    }
}
