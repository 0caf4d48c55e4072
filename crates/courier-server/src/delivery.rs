//! Delivery engine: route a message to its recipient's live connection or
//! park it in the pending queue, and flush the queue when the recipient
//! connects.
//!
//! Every operation touching one user runs under that user's async lock, so
//! `connect` (bind, drain, flush) is atomic with respect to `deliver` for
//! the same recipient. A message arriving mid-flush waits and is written
//! after the queued backlog, which keeps per-recipient FIFO order.

use std::sync::Arc;

use courier_core::{ConnectionId, Message, TransportError, UserId};
use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::metrics::{
    DELIVERY_WRITE_FAILURES_TOTAL, MESSAGES_DELIVERED_TOTAL, MESSAGES_DROPPED_TOTAL,
    MESSAGES_QUEUED_TOTAL, PENDING_MESSAGES,
};
use crate::queue::{EnqueueOutcome, PendingQueueStore};
use crate::registry::{ConnectionRegistry, SinkHandle};
use crate::transport::CloseReason;

/// What happened to one delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Written to the recipient's live connection.
    Delivered,
    /// Recipient offline; queued.
    Queued,
    /// The live connection failed the write; queued instead.
    QueuedAfterWriteFailure,
    /// Not written and not queued (full queue under `reject`).
    Dropped,
}

/// Result of flushing a user's backlog on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every pending message was written.
    Flushed(usize),
    /// A write failed; the unwritten tail went back to the queue.
    Aborted {
        /// Messages written before the failure.
        delivered: usize,
        /// Messages restored to the queue.
        requeued: usize,
    },
}

/// Routes messages between the registry and the pending queues.
pub struct DeliveryEngine {
    registry: Arc<ConnectionRegistry>,
    queue: Arc<PendingQueueStore>,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
    close_superseded: bool,
}

impl DeliveryEngine {
    /// Create an engine over shared registry and queue.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        queue: Arc<PendingQueueStore>,
        close_superseded: bool,
    ) -> Self {
        Self {
            registry,
            queue,
            locks: DashMap::new(),
            close_superseded,
        }
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The pending queues.
    pub fn queue(&self) -> &Arc<PendingQueueStore> {
        &self.queue
    }

    /// Deliver `message` to its receiver, or queue it.
    ///
    /// Never fails. Exactly one of {write, enqueue} happens, unless a
    /// bounded queue refuses the message. The exception is a write that
    /// times out while the socket is already sending it: the frame still
    /// reaches the peer and is also queued, so delivery under write
    /// timeouts is at-least-once.
    pub async fn deliver(&self, message: Message) -> DeliveryOutcome {
        let receiver = message.receiver().clone();
        let lock = self.lock_for(&receiver);
        let outcome = {
            let _guard = lock.lock().await;
            self.deliver_locked(&receiver, message).await
        };
        self.release_lock(&receiver, lock);
        outcome
    }

    async fn deliver_locked(&self, receiver: &UserId, message: Message) -> DeliveryOutcome {
        let Some(handle) = self.registry.lookup(receiver) else {
            debug!(receiver = %receiver, "recipient offline, queueing");
            return self.enqueue(receiver, message, DeliveryOutcome::Queued);
        };

        match write_message(&handle, &message).await {
            Ok(()) => {
                counter!(MESSAGES_DELIVERED_TOTAL, "path" => "live").increment(1);
                debug!(receiver = %receiver, connection_id = %handle.id(), "delivered");
                DeliveryOutcome::Delivered
            }
            Err(WriteError::Encode) => {
                counter!(MESSAGES_DROPPED_TOTAL, "reason" => "encode").increment(1);
                DeliveryOutcome::Dropped
            }
            Err(WriteError::Transport(e)) => {
                warn!(
                    receiver = %receiver,
                    connection_id = %handle.id(),
                    error = %e,
                    "write to recipient failed, evicting binding and queueing"
                );
                counter!(DELIVERY_WRITE_FAILURES_TOTAL).increment(1);
                let _ = self.registry.unbind_if(receiver, handle.id());
                handle.close(CloseReason::WriteFailed);
                self.enqueue(receiver, message, DeliveryOutcome::QueuedAfterWriteFailure)
            }
        }
    }

    /// Bind `handle` for `user` and flush everything queued for them.
    ///
    /// A superseded connection is closed when configured. If a flush write
    /// fails the remaining messages are restored, the new binding is
    /// removed and the handle is closed.
    pub async fn connect(&self, user: &UserId, handle: SinkHandle) -> FlushOutcome {
        let lock = self.lock_for(user);
        let outcome = {
            let _guard = lock.lock().await;
            self.connect_locked(user, handle).await
        };
        self.release_lock(user, lock);
        outcome
    }

    async fn connect_locked(&self, user: &UserId, handle: SinkHandle) -> FlushOutcome {
        if let Some(previous) = self.registry.bind(user.clone(), Arc::clone(&handle)) {
            if previous.id() != handle.id() {
                info!(
                    user_id = %user,
                    previous = %previous.id(),
                    connection_id = %handle.id(),
                    "connection superseded"
                );
                if self.close_superseded {
                    previous.close(CloseReason::Superseded);
                }
            }
        }

        let pending = self.queue.drain_all(user);
        self.record_pending();
        if pending.is_empty() {
            return FlushOutcome::Flushed(0);
        }

        let total = pending.len();
        let mut delivered = 0;
        let mut remaining = pending.into_iter();
        while let Some(message) = remaining.next() {
            match write_message(&handle, &message).await {
                Ok(()) => delivered += 1,
                Err(WriteError::Encode) => {
                    counter!(MESSAGES_DROPPED_TOTAL, "reason" => "encode").increment(1);
                }
                Err(WriteError::Transport(e)) => {
                    let mut rest = vec![message];
                    rest.extend(remaining);
                    let requeued = rest.len();
                    warn!(
                        user_id = %user,
                        connection_id = %handle.id(),
                        delivered,
                        requeued,
                        error = %e,
                        "flush aborted, restoring undelivered messages"
                    );
                    counter!(DELIVERY_WRITE_FAILURES_TOTAL).increment(1);
                    self.queue.restore(user, rest);
                    self.record_pending();
                    let _ = self.registry.unbind_if(user, handle.id());
                    handle.close(CloseReason::WriteFailed);
                    counter!(MESSAGES_DELIVERED_TOTAL, "path" => "flush").increment(delivered as u64);
                    return FlushOutcome::Aborted { delivered, requeued };
                }
            }
        }

        counter!(MESSAGES_DELIVERED_TOTAL, "path" => "flush").increment(delivered as u64);
        info!(user_id = %user, flushed = delivered, total, "pending messages flushed");
        FlushOutcome::Flushed(delivered)
    }

    /// Remove `user`'s binding if it is still `connection`.
    pub async fn disconnect(&self, user: &UserId, connection: &ConnectionId) -> bool {
        let lock = self.lock_for(user);
        let removed = {
            let _guard = lock.lock().await;
            self.registry.unbind_if(user, connection)
        };
        self.release_lock(user, lock);
        if !removed {
            debug!(user_id = %user, connection_id = %connection, "binding already replaced");
        }
        removed
    }

    fn enqueue(&self, user: &UserId, message: Message, queued: DeliveryOutcome) -> DeliveryOutcome {
        let outcome = match self.queue.enqueue(user, message) {
            EnqueueOutcome::Queued => queued,
            EnqueueOutcome::QueuedEvicted(old) => {
                warn!(
                    user_id = %user,
                    evicted_sender = %old.sender(),
                    "pending queue full, evicted oldest message"
                );
                counter!(MESSAGES_DROPPED_TOTAL, "reason" => "evicted").increment(1);
                queued
            }
            EnqueueOutcome::Rejected => {
                warn!(user_id = %user, "pending queue full, message rejected");
                counter!(MESSAGES_DROPPED_TOTAL, "reason" => "rejected").increment(1);
                return DeliveryOutcome::Dropped;
            }
        };
        counter!(MESSAGES_QUEUED_TOTAL).increment(1);
        self.record_pending();
        outcome
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_pending(&self) {
        gauge!(PENDING_MESSAGES).set(self.queue.total_pending() as f64);
    }

    fn lock_for(&self, user: &UserId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(user.clone()).or_default().value())
    }

    /// Drop the table entry once nobody else holds or waits on it.
    fn release_lock(&self, user: &UserId, lock: Arc<Mutex<()>>) {
        drop(lock);
        let _ = self
            .locks
            .remove_if(user, |_, l| Arc::strong_count(l) == 1);
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.len()
    }
}

enum WriteError {
    Encode,
    Transport(TransportError),
}

async fn write_message(handle: &SinkHandle, message: &Message) -> Result<(), WriteError> {
    let frame = message.encode().map_err(|e| {
        error!(error = %e, "failed to encode message");
        WriteError::Encode
    })?;
    handle.write_frame(frame).await.map_err(WriteError::Transport)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
