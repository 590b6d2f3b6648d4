//! # Jobq Runtime
//!
//! Queue backend abstraction and in-memory reference store for the jobq
//! processing layer.
//!
//! This library provides:
//! - Provider-agnostic queue operations (send, receive, delete, visibility)
//! - Standard and FIFO queue semantics with per-group ordering
//! - Explicit deduplication and dead-letter redrive
//! - A deterministic in-memory store for testing without a live service
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures, identifiers, and receipt handles
//! - [`queue`] - Queue kinds, configuration, and redrive policy
//! - [`backend`] - The queue backend trait
//! - [`stores`] - Backend implementations (in-memory reference store)

// Module declarations
pub mod backend;
pub mod error;
pub mod message;
pub mod queue;
pub mod stores;

// Re-export commonly used types at crate root for convenience
pub use backend::{QueueBackend, MAX_RECEIVE_BATCH};
pub use error::{ConfigurationError, QueueError, ValidationError};
pub use message::{
    DeduplicationId, GroupId, Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage,
    SendOptions, Timestamp, FIFO_QUEUE_SUFFIX,
};
pub use queue::{MemoryStoreConfig, QueueConfig, QueueKind, RedrivePolicy};
pub use stores::MemoryQueueStore;
