//! Error types for job processing.

use jobq_runtime::QueueError;
use thiserror::Error;

/// Errors raised while enqueueing or processing jobs.
///
/// Per-message variants (`DecodeFailure`, `UnexpectedArgument`,
/// `MissingArgument`, `NoProcessor`, `Handler`) are recorded as failures in a
/// batch result and never abort the rest of the batch. Setup-time variants
/// (`UnsupportedCodec` at enqueue, `Configuration`, `Queue`) propagate to the
/// caller.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Unsupported content type: {content_type}")]
    UnsupportedCodec { content_type: String },

    #[error("Failed to encode {content_type} payload: {message}")]
    EncodeFailure {
        content_type: String,
        message: String,
    },

    #[error("Failed to decode {content_type} payload: {message}")]
    DecodeFailure {
        content_type: String,
        message: String,
    },

    #[error("Job '{job_name}' does not accept argument '{argument}'")]
    UnexpectedArgument { job_name: String, argument: String },

    #[error("Job '{job_name}' is missing required argument '{argument}'")]
    MissingArgument { job_name: String, argument: String },

    #[error("No processor registered for job '{job_name}' on queue '{queue_name}'")]
    NoProcessor {
        queue_name: String,
        job_name: String,
    },

    #[error("Job '{job_name}' handler failed: {source}")]
    Handler {
        job_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl WorkerError {
    /// Wrap a handler-raised error for the given job
    pub fn handler(job_name: &str, source: anyhow::Error) -> Self {
        Self::Handler {
            job_name: job_name.to_string(),
            source,
        }
    }

    /// Check whether this failure is scoped to a single message rather than
    /// the whole processing call.
    pub fn is_message_scoped(&self) -> bool {
        matches!(
            self,
            Self::DecodeFailure { .. }
                | Self::UnsupportedCodec { .. }
                | Self::UnexpectedArgument { .. }
                | Self::MissingArgument { .. }
                | Self::NoProcessor { .. }
                | Self::Handler { .. }
        )
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
