//! In-memory reference store implementing provider delivery semantics.
//!
//! This store reproduces the observable behavior of the managed queue
//! provider deterministically enough for tests:
//! - Visibility timeouts with receipt rotation on every delivery
//! - Delayed first delivery
//! - FIFO ordering per group, with at most one message in flight per group
//! - Explicit deduplication within a configurable window
//! - Dead-letter redrive once a message exceeds its max receive count
//!
//! It is a single authoritative in-process store guarded by a per-queue lock.
//! It intentionally diverges from the real provider's weaker guarantees:
//! receives here are strongly consistent and strictly ordered, where the
//! managed service is eventually consistent and only best-effort ordered on
//! standard queues. Tests rely on that determinism.

use crate::backend::{QueueBackend, MAX_RECEIVE_BATCH};
use crate::error::{QueueError, ValidationError};
use crate::message::{
    DeduplicationId, GroupId, Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage,
    SendOptions, Timestamp,
};
use crate::queue::{MemoryStoreConfig, QueueConfig, QueueKind};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in a queue with delivery bookkeeping
#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: MessageId,
    sequence: u64,
    body: Bytes,
    attributes: HashMap<String, String>,
    group_id: Option<GroupId>,
    enqueued_at: Timestamp,
    visible_at: Timestamp,
    receive_count: u32,
}

impl StoredMessage {
    fn is_visible(&self, now: &Timestamp) -> bool {
        *now >= self.visible_at
    }

    fn is_retained(&self, now: &Timestamp, retention: Duration) -> bool {
        *now < self.enqueued_at.saturating_add(retention)
    }
}

/// A message currently leased to a receiver
#[derive(Debug)]
struct LeasedMessage {
    message: StoredMessage,
    visible_at: Timestamp,
}

/// Record of an explicit deduplication id within the dedup window
#[derive(Debug)]
struct DedupEntry {
    message_id: MessageId,
    recorded_at: Timestamp,
}

/// State of a single queue, guarded by its own lock
struct QueueState {
    kind: QueueKind,
    config: QueueConfig,
    store_config: MemoryStoreConfig,
    next_sequence: u64,
    /// Stored messages in enqueue order
    messages: VecDeque<StoredMessage>,
    /// Leases keyed by receipt handle token
    in_flight: HashMap<String, LeasedMessage>,
    /// Explicit deduplication records (FIFO queues only)
    dedup_index: HashMap<DeduplicationId, DedupEntry>,
}

impl QueueState {
    fn new(kind: QueueKind, config: QueueConfig, store_config: MemoryStoreConfig) -> Self {
        Self {
            kind,
            config,
            store_config,
            next_sequence: 0,
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
            dedup_index: HashMap::new(),
        }
    }

    fn stored_count(&self) -> usize {
        self.messages.len() + self.in_flight.len()
    }

    /// Reinsert a message preserving enqueue order
    fn push_ordered(&mut self, message: StoredMessage) {
        let position = self
            .messages
            .iter()
            .position(|existing| existing.sequence > message.sequence)
            .unwrap_or(self.messages.len());
        self.messages.insert(position, message);
    }

    /// Reclaim lapsed leases, drop expired messages, purge stale dedup
    /// records. Runs under the queue lock before every visibility scan.
    fn sweep(&mut self, now: &Timestamp) {
        let lapsed: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, lease)| *now >= lease.visible_at)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in lapsed {
            if let Some(lease) = self.in_flight.remove(&receipt) {
                debug!(
                    message_id = %lease.message.message_id,
                    "visibility timeout lapsed, message returns to queue"
                );
                self.push_ordered(lease.message);
            }
        }

        let retention = self.config.message_retention;
        let before = self.messages.len();
        self.messages
            .retain(|message| message.is_retained(now, retention));
        if self.messages.len() < before {
            debug!(
                dropped = before - self.messages.len(),
                "dropped messages past the retention period"
            );
        }

        let window = self.store_config.deduplication_window;
        self.dedup_index
            .retain(|_, entry| *now < entry.recorded_at.saturating_add(window));
    }

    /// Collect a delivery batch.
    ///
    /// Returns delivered messages plus any messages that exceeded their max
    /// receive count; the latter must be moved to the dead-letter queue by
    /// the caller after releasing this queue's lock.
    fn collect_batch(
        &mut self,
        now: &Timestamp,
        max_messages: usize,
    ) -> (Vec<ReceivedMessage>, Vec<(QueueName, StoredMessage)>) {
        let mut delivered = Vec::new();
        let mut dead_letters = Vec::new();

        // Groups with an outstanding lease are skipped entirely to keep at
        // most one message in flight per group.
        let mut busy_groups: HashSet<GroupId> = if self.kind.is_fifo() {
            self.in_flight
                .values()
                .filter_map(|lease| lease.message.group_id.clone())
                .collect()
        } else {
            HashSet::new()
        };

        let mut index = 0;
        while index < self.messages.len() && delivered.len() < max_messages {
            if !self.messages[index].is_visible(now) {
                index += 1;
                continue;
            }

            if self.kind.is_fifo() {
                if let Some(group) = &self.messages[index].group_id {
                    if busy_groups.contains(group) {
                        index += 1;
                        continue;
                    }
                }
            }

            let Some(mut message) = self.messages.remove(index) else {
                break;
            };
            message.receive_count += 1;

            if let Some(redrive) = &self.config.redrive_policy {
                if message.receive_count > redrive.max_receive_count {
                    dead_letters.push((redrive.target_queue.clone(), message));
                    continue;
                }
            }

            let receipt = ReceiptHandle::mint();
            let lease_expires = now.saturating_add(self.config.visibility_timeout);

            if self.kind.is_fifo() {
                if let Some(group) = &message.group_id {
                    busy_groups.insert(group.clone());
                }
            }

            delivered.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                group_id: message.group_id.clone(),
                receipt_handle: receipt.clone(),
                receive_count: message.receive_count,
                enqueued_at: message.enqueued_at.clone(),
                delivered_at: now.clone(),
            });
            self.in_flight.insert(
                receipt.as_str().to_string(),
                LeasedMessage {
                    message,
                    visible_at: lease_expires,
                },
            );
        }

        (delivered, dead_letters)
    }
}

// ============================================================================
// MemoryQueueStore
// ============================================================================

/// In-memory queue store implementing [`QueueBackend`].
///
/// Cheap to clone; clones share the same underlying storage.
#[derive(Clone)]
pub struct MemoryQueueStore {
    queues: Arc<RwLock<HashMap<QueueName, Arc<Mutex<QueueState>>>>>,
    config: MemoryStoreConfig,
}

impl MemoryQueueStore {
    /// Create new store with configuration
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    fn queue_handle(&self, name: &QueueName) -> Result<Arc<Mutex<QueueState>>, QueueError> {
        self.queues
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })
    }

    /// Move messages that exceeded their receive count to their dead-letter
    /// queues. Called after the source queue's lock has been released so two
    /// queues are never locked at once.
    fn apply_dead_letter_moves(&self, moves: Vec<(QueueName, StoredMessage)>) {
        let now = Timestamp::now();
        for (target, mut message) in moves {
            match self.queue_handle(&target) {
                Ok(handle) => {
                    debug!(
                        message_id = %message.message_id,
                        target_queue = %target,
                        receive_count = message.receive_count,
                        "message exceeded max receive count, moving to dead-letter queue"
                    );
                    let mut state = handle.lock();
                    message.sequence = state.next_sequence;
                    state.next_sequence += 1;
                    message.visible_at = now.clone();
                    state.messages.push_back(message);
                }
                Err(_) => {
                    error!(
                        message_id = %message.message_id,
                        target_queue = %target,
                        "dead-letter target queue does not exist, dropping message"
                    );
                }
            }
        }
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueStore {
    async fn create_queue(
        &self,
        name: &QueueName,
        kind: QueueKind,
        config: QueueConfig,
    ) -> Result<(), QueueError> {
        if name.is_fifo() != kind.is_fifo() {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "queue kind does not match the name's '.fifo' suffix".to_string(),
            }
            .into());
        }

        let mut queues = self.queues.write();
        if queues.contains_key(name) {
            return Err(QueueError::QueueAlreadyExists {
                queue_name: name.to_string(),
            });
        }

        queues.insert(
            name.clone(),
            Arc::new(Mutex::new(QueueState::new(
                kind,
                config,
                self.config.clone(),
            ))),
        );
        Ok(())
    }

    async fn delete_queue(&self, name: &QueueName) -> Result<(), QueueError> {
        let mut queues = self.queues.write();
        if queues.remove(name).is_none() {
            return Err(QueueError::QueueNotFound {
                queue_name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
        options: SendOptions,
    ) -> Result<MessageId, QueueError> {
        if message.body.len() > self.config.max_message_size {
            return Err(QueueError::MessageTooLarge {
                size: message.body.len(),
                max_size: self.config.max_message_size,
            });
        }

        let handle = self.queue_handle(queue)?;
        let mut state = handle.lock();
        let now = Timestamp::now();

        if state.stored_count() >= state.store_config.max_queue_size {
            return Err(QueueError::QueueFull {
                queue_name: queue.to_string(),
                capacity: state.store_config.max_queue_size,
            });
        }

        let is_fifo = state.kind.is_fifo();

        // Explicit deduplication: a send whose dedup id is still in the
        // window returns the original message id without storing anything.
        if is_fifo {
            if let Some(dedup_id) = &options.deduplication_id {
                let window = state.store_config.deduplication_window;
                if let Some(entry) = state.dedup_index.get(dedup_id) {
                    if now < entry.recorded_at.saturating_add(window) {
                        debug!(
                            queue = %queue,
                            deduplication_id = %dedup_id,
                            "duplicate send collapsed by deduplication id"
                        );
                        return Ok(entry.message_id.clone());
                    }
                }
            }
        }

        let message_id = MessageId::new();
        let visible_at = match options.delay {
            Some(delay) => now.saturating_add(delay),
            None => now.clone(),
        };
        let group_id = if is_fifo {
            Some(options.group_id.unwrap_or_else(GroupId::default_group))
        } else {
            None
        };

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            sequence,
            body: message.body,
            attributes: message.attributes,
            group_id,
            enqueued_at: now.clone(),
            visible_at,
            receive_count: 0,
        });

        if is_fifo {
            if let Some(dedup_id) = options.deduplication_id {
                state.dedup_index.insert(
                    dedup_id,
                    DedupEntry {
                        message_id: message_id.clone(),
                        recorded_at: now,
                    },
                );
            }
        }

        Ok(message_id)
    }

    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max_messages = max_messages.clamp(1, MAX_RECEIVE_BATCH);
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // Re-resolve the queue each scan so a concurrent delete surfaces
            // as QueueNotFound instead of waiting out the full window.
            let handle = self.queue_handle(queue)?;

            let (batch, dead_letters) = {
                let mut state = handle.lock();
                let now = Timestamp::now();
                state.sweep(&now);
                state.collect_batch(&now, max_messages)
            };

            if !dead_letters.is_empty() {
                self.apply_dead_letter_moves(dead_letters);
            }

            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let remaining = deadline - now;
            tokio::time::sleep(self.config.poll_interval.min(remaining)).await;
        }
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let handle = self.queue_handle(queue)?;
        let mut state = handle.lock();

        match state.in_flight.remove(receipt.as_str()) {
            Some(_) => Ok(()),
            None => Err(QueueError::ReceiptExpired {
                receipt: receipt.to_string(),
            }),
        }
    }

    async fn change_visibility(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
        timeout: Duration,
    ) -> Result<(), QueueError> {
        let handle = self.queue_handle(queue)?;
        let mut state = handle.lock();
        let now = Timestamp::now();

        if timeout.is_zero() {
            // Immediate return: the lease ends now and the old receipt dies.
            match state.in_flight.remove(receipt.as_str()) {
                Some(mut lease) => {
                    lease.message.visible_at = now;
                    state.push_ordered(lease.message);
                    Ok(())
                }
                None => Err(QueueError::ReceiptExpired {
                    receipt: receipt.to_string(),
                }),
            }
        } else {
            match state.in_flight.get_mut(receipt.as_str()) {
                Some(lease) => {
                    lease.visible_at = now.saturating_add(timeout);
                    Ok(())
                }
                None => {
                    warn!(
                        queue = %queue,
                        receipt = %receipt,
                        "visibility change on stale receipt"
                    );
                    Err(QueueError::ReceiptExpired {
                        receipt: receipt.to_string(),
                    })
                }
            }
        }
    }
}
