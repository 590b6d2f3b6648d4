//! The queue backend trait: the provider collaborator surface.
//!
//! Everything the processing layer needs from a queue provider is expressed
//! here: queue lifecycle, send, receive, delete, and visibility changes. The
//! in-memory reference store implements this trait for tests; a cloud-backed
//! implementation would implement the same trait against the real service.

use crate::error::{QueueError, ValidationError};
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, SendOptions};
use crate::queue::{QueueConfig, QueueKind};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

/// Largest batch a single receive call may return
pub const MAX_RECEIVE_BATCH: usize = 10;

/// Provider-agnostic queue operations.
///
/// Implementations must guarantee that a message is leased to at most one
/// receiver at a time and that operations presented with a stale receipt
/// handle fail with [`QueueError::ReceiptExpired`] rather than affecting an
/// unrelated message.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Create a queue.
    ///
    /// Fails with `QueueAlreadyExists` if the name is taken, even when the
    /// requested configuration matches the existing queue.
    async fn create_queue(
        &self,
        name: &QueueName,
        kind: QueueKind,
        config: QueueConfig,
    ) -> Result<(), QueueError>;

    /// Delete a queue and all of its messages
    async fn delete_queue(&self, name: &QueueName) -> Result<(), QueueError>;

    /// Send a single message to a queue
    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
        options: SendOptions,
    ) -> Result<MessageId, QueueError>;

    /// Receive up to `max_messages` messages, waiting up to `wait` for at
    /// least one to become visible.
    ///
    /// Each returned message carries a freshly minted receipt handle and an
    /// incremented receive count, and stays invisible for the queue's
    /// visibility timeout.
    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Permanently delete a message identified by its current receipt
    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Reschedule the visibility of a leased message.
    ///
    /// `timeout` of zero returns the message to the queue immediately;
    /// anything else keeps it invisible for that span. Used to implement
    /// delayed-retry backoff.
    async fn change_visibility(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
        timeout: Duration,
    ) -> Result<(), QueueError>;

    /// Create a standard queue, rejecting FIFO-suffixed names
    async fn create_standard_queue(
        &self,
        name: &QueueName,
        config: QueueConfig,
    ) -> Result<(), QueueError> {
        if name.is_fifo() {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "standard queue names must not end in '.fifo'".to_string(),
            }
            .into());
        }
        self.create_queue(name, QueueKind::Standard, config).await
    }

    /// Create a FIFO queue; the name must carry the reserved suffix
    async fn create_fifo_queue(
        &self,
        name: &QueueName,
        config: QueueConfig,
    ) -> Result<(), QueueError> {
        if !name.is_fifo() {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "FIFO queue names must end in '.fifo'".to_string(),
            }
            .into());
        }
        self.create_queue(name, QueueKind::Fifo, config).await
    }

    /// Receive and delete every currently retrievable message.
    ///
    /// `wait` applies to the first receive only; draining stops as soon as a
    /// scan comes back empty. Intended for test cleanup, not for normal
    /// processing. Returns the number of messages removed.
    async fn drain_queue(&self, queue: &QueueName, wait: Duration) -> Result<usize, QueueError> {
        let mut drained = 0;
        let mut wait = wait;

        loop {
            let batch = self
                .receive_messages(queue, MAX_RECEIVE_BATCH, wait)
                .await?;
            wait = Duration::ZERO;

            if batch.is_empty() {
                break;
            }

            for message in batch {
                match self.delete_message(queue, &message.receipt_handle).await {
                    Ok(()) => drained += 1,
                    // Lease lapsed between receive and delete; the message
                    // will be picked up by a later iteration.
                    Err(err) if err.is_stale_receipt() => {}
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(drained)
    }
}
