//! # Jobq Workers
//!
//! Job processor registry, dispatch engine, and enqueue surface on top of a
//! [`jobq_runtime::QueueBackend`].
//!
//! This library provides:
//! - Named job handlers per queue, with declared argument schemas
//! - Single-message and batch processing with atomic batch failure
//! - Pluggable payload codecs (JSON, MessagePack) tagged per message
//! - Retry backoff policies applied through queue visibility changes
//! - Task handles for validated enqueueing
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for enqueueing and processing
//! - [`codecs`] - Payload codecs and the codec registry
//! - [`backoff`] - Backoff decisions and policies
//! - [`schema`] - Job argument schemas and binding
//! - [`processors`] - Processor strategies, registry, and dispatch engine
//! - [`task`] - Task handles and enqueue options
//! - [`config`] - Worker configuration

// Module declarations
pub mod backoff;
pub mod codecs;
pub mod config;
pub mod error;
pub mod processors;
pub mod schema;
pub mod task;

// Re-export commonly used types at crate root for convenience
pub use backoff::{BackoffDecision, BackoffPolicy, ExponentialBackoff, ImmediateReturn};
pub use codecs::{Codec, CodecRegistry, JobKwargs, JsonCodec, MessagePackCodec};
pub use config::{BackoffSettings, WorkerConfig};
pub use error::WorkerError;
pub use processors::{
    dead_letter_fallback, BatchJobHandler, BatchProcessor, BatchProcessorMaker, BatchResult,
    DeadLetterProcessor, DefaultProcessor, FallbackMaker, JobContext, JobDispatcher, JobHandler,
    JobInput, Processor, ProcessorMaker, CONTENT_TYPE_ATTRIBUTE, DEDUPLICATION_ID_ATTRIBUTE,
    GROUP_ID_ATTRIBUTE, JOB_NAME_ATTRIBUTE,
};
pub use schema::JobSchema;
pub use task::{EnqueueOptions, TaskHandle};
