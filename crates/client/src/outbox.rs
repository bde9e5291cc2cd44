//! FIFO queue of payloads waiting for a live connection.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Pending {
    pub payload: String,
    pub enqueued_at: Instant,
}

impl Pending {
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

/// Pending sends.  Unbounded unless a cap is configured, in which case the
/// oldest entry is dropped to make room.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Pending>,
    cap: Option<usize>,
}

impl Outbox {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            queue: VecDeque::new(),
            cap,
        }
    }

    /// Append a payload.  Returns the entry that was evicted to respect the
    /// cap, if any.
    pub fn push(&mut self, payload: String) -> Option<Pending> {
        let evicted = match self.cap {
            Some(cap) if self.queue.len() >= cap => self.queue.pop_front(),
            _ => None,
        };
        self.queue.push_back(Pending {
            payload,
            enqueued_at: Instant::now(),
        });
        evicted
    }

    pub fn pop(&mut self) -> Option<Pending> {
        self.queue.pop_front()
    }

    /// Put an entry back at the head, keeping its original timestamp.
    pub fn requeue_front(&mut self, pending: Pending) {
        self.queue.push_front(pending);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
