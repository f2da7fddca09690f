use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::RelayError;
use crate::operator::truncate_chars;

pub const QUEUE_CAPACITY: usize = 50;

const PREVIEW_ITEMS: usize = 5;
const PREVIEW_WIDTH: usize = 20;

/// Bounded FIFO of payloads waiting for the target to go idle.
///
/// Every operation takes the same lock; multi-step edits go through
/// [`DeliveryQueue::lock`] so nothing slips in between a read and a delete.
#[derive(Debug)]
pub struct DeliveryQueue {
    entries: Mutex<VecDeque<String>>,
    capacity: usize,
}

/// Exclusive access to the queue for read-modify-write sequences
pub struct QueueGuard<'a> {
    entries: MutexGuard<'a, VecDeque<String>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lock(&self) -> QueueGuard<'_> {
        QueueGuard {
            entries: self.entries.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Append a payload. Returns its 1-based position.
    pub fn enqueue(&self, msg: String) -> Result<usize, RelayError> {
        let mut guard = self.lock();
        if guard.entries.len() >= self.capacity {
            return Err(RelayError::QueueFull {
                capacity: self.capacity,
            });
        }
        guard.entries.push_back(msg);
        Ok(guard.entries.len())
    }

    pub fn dequeue_front(&self) -> Option<String> {
        self.lock().entries.pop_front()
    }

    /// Drop everything. Returns how many entries were discarded.
    pub fn clear(&self) -> usize {
        let mut guard = self.lock();
        let count = guard.entries.len();
        guard.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Remove entry `index` (0-based) only if it still holds `expected`,
    /// i.e. the text the operator was shown.
    pub fn remove_expected(&self, index: usize, expected: &str) -> Option<String> {
        let mut guard = self.lock();
        if guard.entries.get(index).map(String::as_str) != Some(expected) {
            return None;
        }
        guard.remove(index)
    }

    /// One-line preview: `[1]first → [2]second ... +3 more`
    pub fn preview(&self) -> Option<String> {
        self.lock().preview()
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueGuard<'_> {
    pub fn items(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        self.entries.remove(index)
    }

    pub fn preview(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }

        let shown: Vec<String> = self
            .entries
            .iter()
            .take(PREVIEW_ITEMS)
            .enumerate()
            .map(|(i, m)| format!("[{}]{}", i + 1, truncate_chars(m, PREVIEW_WIDTH)))
            .collect();

        let mut line = format!("📋 {}", shown.join(" → "));
        let extra = self.entries.len().saturating_sub(PREVIEW_ITEMS);
        if extra > 0 {
            line.push_str(&format!(" ... +{} more", extra));
        }
        Some(line)
    }
}
