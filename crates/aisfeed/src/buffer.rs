//! Fixed-capacity FIFO of the most recent feed messages
//!
//! Append at the tail, evict at the head. Order is arrival order. Not
//! synchronized on its own; the broadcaster owns it behind its lock so that
//! backfill and live delivery see one consistent sequence.

use std::collections::VecDeque;

use crate::message::FeedMessage;

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug)]
pub struct RecentMessageBuffer {
    capacity: usize,
    messages: VecDeque<FeedMessage>,
}

impl RecentMessageBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message, evicting the oldest first when full.
    pub fn append(&mut self, msg: FeedMessage) {
        if self.capacity == 0 {
            return;
        }
        if self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(msg);
    }

    /// The `n` most recent messages, oldest first.
    pub fn latest(&self, n: usize) -> Vec<FeedMessage> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }
}

impl Default for RecentMessageBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
