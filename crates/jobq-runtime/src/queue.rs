//! Queue kinds, per-queue configuration, and redrive policy types.

use crate::message::QueueName;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery semantics of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueKind {
    /// Best-effort ordering, no deduplication
    Standard,
    /// Per-group FIFO ordering with deduplication
    Fifo,
}

impl QueueKind {
    /// Check whether this kind enforces ordering and deduplication
    pub fn is_fifo(&self) -> bool {
        matches!(self, Self::Fifo)
    }
}

/// Dead-letter redrive policy.
///
/// Once a message has been received more than `max_receive_count` times it is
/// moved to `target_queue` instead of being redelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedrivePolicy {
    pub target_queue: QueueName,
    pub max_receive_count: u32,
}

impl RedrivePolicy {
    /// Create a redrive policy targeting the given dead-letter queue
    pub fn new(target_queue: QueueName, max_receive_count: u32) -> Self {
        Self {
            target_queue,
            max_receive_count,
        }
    }
}

/// Per-queue configuration, immutable once the queue is created.
///
/// Tests that need different settings delete and recreate the queue rather
/// than mutating it, matching the managed provider's model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How long a delivered message stays leased before it becomes
    /// visible again
    pub visibility_timeout: Duration,

    /// How long an unconsumed message is retained before being dropped
    pub message_retention: Duration,

    /// Optional dead-letter redrive policy
    pub redrive_policy: Option<RedrivePolicy>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            message_retention: Duration::from_secs(4 * 24 * 60 * 60), // 4 days
            redrive_policy: None,
        }
    }
}

impl QueueConfig {
    /// Create queue configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set visibility timeout
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set message retention period
    pub fn with_message_retention(mut self, retention: Duration) -> Self {
        self.message_retention = retention;
        self
    }

    /// Set dead-letter redrive policy
    pub fn with_redrive_policy(mut self, policy: RedrivePolicy) -> Self {
        self.redrive_policy = Some(policy);
        self
    }
}

/// Configuration for the in-memory reference store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Maximum stored + leased messages per queue
    pub max_queue_size: usize,

    /// Maximum message body size in bytes
    pub max_message_size: usize,

    /// Window within which explicit deduplication ids collapse sends
    pub deduplication_window: Duration,

    /// Sleep interval between visibility scans while a receive waits
    pub poll_interval: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            max_message_size: 256 * 1024, // provider limit
            deduplication_window: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_millis(20),
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
