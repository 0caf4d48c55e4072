//! Per-user FIFO queues of messages waiting for an offline recipient.
//!
//! A user with no entry has an empty queue. Queues are unbounded unless a
//! capacity is configured, in which case the [`OverflowPolicy`] decides
//! whether the oldest message is evicted or the new one refused.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use courier_core::{Message, UserId};
use courier_settings::OverflowPolicy;
use dashmap::DashMap;

/// Result of [`PendingQueueStore::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended to the tail.
    Queued,
    /// Appended after evicting the returned head message.
    QueuedEvicted(Box<Message>),
    /// The queue is full and the policy refuses new messages.
    Rejected,
}

/// Pending messages keyed by recipient.
pub struct PendingQueueStore {
    queues: DashMap<UserId, VecDeque<Message>>,
    capacity: Option<usize>,
    overflow: OverflowPolicy,
    total: AtomicUsize,
}

impl PendingQueueStore {
    /// Queues with no capacity limit.
    pub fn unbounded() -> Self {
        Self::with_limits(None, OverflowPolicy::default())
    }

    /// Queues holding at most `capacity` messages per user when set.
    pub fn with_limits(capacity: Option<usize>, overflow: OverflowPolicy) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
            overflow,
            total: AtomicUsize::new(0),
        }
    }

    /// Append `message` to `user`'s queue.
    pub fn enqueue(&self, user: &UserId, message: Message) -> EnqueueOutcome {
        let mut queue = self.queues.entry(user.clone()).or_default();
        match self.capacity {
            Some(cap) if queue.len() >= cap => match self.overflow {
                OverflowPolicy::Reject => EnqueueOutcome::Rejected,
                OverflowPolicy::DropOldest => {
                    let evicted = queue.pop_front();
                    queue.push_back(message);
                    match evicted {
                        Some(old) => EnqueueOutcome::QueuedEvicted(Box::new(old)),
                        // capacity 0 is refused by settings validation
                        None => {
                            let _ = self.total.fetch_add(1, Ordering::Relaxed);
                            EnqueueOutcome::Queued
                        }
                    }
                }
            },
            _ => {
                queue.push_back(message);
                let _ = self.total.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Queued
            }
        }
    }

    /// Remove and return everything queued for `user`, oldest first.
    pub fn drain_all(&self, user: &UserId) -> Vec<Message> {
        match self.queues.remove(user) {
            Some((_, queue)) => {
                let _ = self.total.fetch_sub(queue.len(), Ordering::Relaxed);
                queue.into()
            }
            None => Vec::new(),
        }
    }

    /// Put undelivered messages back at the head of `user`'s queue,
    /// keeping their order. Capacity is not applied: these were already
    /// accepted once.
    pub fn restore(&self, user: &UserId, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        let _ = self.total.fetch_add(messages.len(), Ordering::Relaxed);
        let mut queue = self.queues.entry(user.clone()).or_default();
        for message in messages.into_iter().rev() {
            queue.push_front(message);
        }
    }

    /// Messages waiting for `user`.
    pub fn len(&self, user: &UserId) -> usize {
        self.queues.get(user).map_or(0, |q| q.len())
    }

    /// Messages waiting across all users.
    pub fn total_pending(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Number of users with at least one pending message.
    pub fn users_waiting(&self) -> usize {
        self.queues.iter().filter(|q| !q.is_empty()).count()
    }
}

impl Default for PendingQueueStore {
    fn default() -> Self {
        Self::unbounded()
    }
}
