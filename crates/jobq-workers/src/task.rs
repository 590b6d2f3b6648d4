//! Task handles: the per-job enqueue surface.
//!
//! A task handle is a thin facade over one (queue, job name) pair. It
//! validates arguments against the job's schema before sending, so a typo'd
//! argument fails in the producer instead of poisoning the queue.

use crate::codecs::{CodecRegistry, JobKwargs};
use crate::error::WorkerError;
use crate::processors::{
    CONTENT_TYPE_ATTRIBUTE, DEDUPLICATION_ID_ATTRIBUTE, GROUP_ID_ATTRIBUTE, JOB_NAME_ATTRIBUTE,
};
use crate::schema::JobSchema;
use jobq_runtime::{
    DeduplicationId, GroupId, Message, MessageId, QueueBackend, QueueName, SendOptions,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;

/// Per-send overrides for enqueueing a job
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Codec tag overriding the dispatcher default
    pub content_type: Option<String>,
    /// Delay before the job first becomes visible
    pub delay: Option<Duration>,
    /// Explicit deduplication key (FIFO queues only)
    pub deduplication_id: Option<DeduplicationId>,
    /// Ordering group (FIFO queues only)
    pub group_id: Option<GroupId>,
}

impl EnqueueOptions {
    /// Create options with no overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize with the named codec instead of the default
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Delay first visibility by the given span
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set explicit deduplication ID
    pub fn with_deduplication_id(mut self, id: DeduplicationId) -> Self {
        self.deduplication_id = Some(id);
        self
    }

    /// Set ordering group ID
    pub fn with_group_id(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }
}

/// Encode kwargs and send them as a job message.
///
/// Shared by [`TaskHandle`] and the dispatcher's `add_job`.
pub(crate) async fn send_job(
    backend: &Arc<dyn QueueBackend>,
    codecs: &CodecRegistry,
    default_content_type: &str,
    queue: &QueueName,
    job_name: &str,
    kwargs: JobKwargs,
    options: EnqueueOptions,
) -> Result<MessageId, WorkerError> {
    let content_type = options
        .content_type
        .unwrap_or_else(|| default_content_type.to_string());
    // Unknown codecs fail here, synchronously, before anything is sent
    let codec = codecs.get(&content_type)?;
    let body = codec.serialize(&kwargs)?;

    let mut message = Message::new(body)
        .with_attribute(JOB_NAME_ATTRIBUTE.to_string(), job_name.to_string())
        .with_attribute(CONTENT_TYPE_ATTRIBUTE.to_string(), content_type);

    let mut send_options = SendOptions::new();
    if let Some(delay) = options.delay {
        send_options = send_options.with_delay(delay);
    }
    if let Some(dedup_id) = options.deduplication_id {
        message = message.with_attribute(
            DEDUPLICATION_ID_ATTRIBUTE.to_string(),
            dedup_id.to_string(),
        );
        send_options = send_options.with_deduplication_id(dedup_id);
    }
    if let Some(group_id) = options.group_id {
        message = message.with_attribute(GROUP_ID_ATTRIBUTE.to_string(), group_id.to_string());
        send_options = send_options.with_group_id(group_id);
    }

    let message_id = backend.send_message(queue, message, send_options).await?;
    Ok(message_id)
}

/// Enqueue facade for one registered job
#[derive(Clone)]
pub struct TaskHandle {
    backend: Arc<dyn QueueBackend>,
    codecs: CodecRegistry,
    queue: QueueName,
    job_name: String,
    schema: JobSchema,
    default_content_type: String,
}

impl TaskHandle {
    pub(crate) fn new(
        backend: Arc<dyn QueueBackend>,
        codecs: CodecRegistry,
        queue: QueueName,
        job_name: String,
        schema: JobSchema,
        default_content_type: String,
    ) -> Self {
        Self {
            backend,
            codecs,
            queue,
            job_name,
            schema,
            default_content_type,
        }
    }

    /// Queue this handle enqueues into
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Job name this handle enqueues for
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Enqueue a job with no overrides
    pub async fn enqueue(&self, kwargs: JobKwargs) -> Result<MessageId, WorkerError> {
        self.enqueue_with(kwargs, EnqueueOptions::new()).await
    }

    /// Enqueue a job with per-send overrides.
    ///
    /// Arguments are bound against the job's schema first: unknown arguments
    /// fail here, and declared defaults are filled in before the payload is
    /// serialized.
    pub async fn enqueue_with(
        &self,
        kwargs: JobKwargs,
        options: EnqueueOptions,
    ) -> Result<MessageId, WorkerError> {
        let bound = self.schema.bind(&self.job_name, &kwargs)?;
        send_job(
            &self.backend,
            &self.codecs,
            &self.default_content_type,
            &self.queue,
            &self.job_name,
            bound,
            options,
        )
        .await
    }

    /// Enqueue a job passing a single positional value.
    ///
    /// The value binds to the job's first declared parameter; remaining
    /// parameters fall back to their defaults.
    pub async fn enqueue_positional(&self, value: Value) -> Result<MessageId, WorkerError> {
        let bound = self.schema.bind_first(&self.job_name, value)?;
        send_job(
            &self.backend,
            &self.codecs,
            &self.default_content_type,
            &self.queue,
            &self.job_name,
            bound,
            EnqueueOptions::new(),
        )
        .await
    }
}
