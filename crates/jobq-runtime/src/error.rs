//! Error types for queue operations.

use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Queue already exists: {queue_name}")]
    QueueAlreadyExists { queue_name: String },

    #[error("Receipt is no longer valid: {receipt}")]
    ReceiptExpired { receipt: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Queue '{queue_name}' is full (capacity: {capacity})")]
    QueueFull { queue_name: String, capacity: usize },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl QueueError {
    /// Check if error is transient and the operation may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::QueueAlreadyExists { .. } => false,
            Self::ReceiptExpired { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::QueueFull { .. } => true,
            Self::Validation(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Check if the error indicates a stale lease.
    ///
    /// Stale leases are an expected race during retry and drain paths and are
    /// logged rather than propagated.
    pub fn is_stale_receipt(&self) -> bool {
        matches!(self, Self::ReceiptExpired { .. })
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
