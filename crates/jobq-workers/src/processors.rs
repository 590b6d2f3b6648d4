//! Processor registry and batch dispatch engine.
//!
//! Jobs are plain callables registered under a (queue, job name) key. The
//! dispatch engine receives a batch from the queue backend, decodes each
//! message with the codec its `ContentType` attribute names, binds the
//! decoded arguments against the registration's schema, and invokes the
//! handler. Successes are deleted from the queue; failures consult the
//! registration's backoff policy and reschedule visibility accordingly.
//!
//! Processing strategies are explicit objects, not subclasses: the engine is
//! polymorphic over [`Processor`] and over the maker functions that build
//! processors at registration time, so callers can wrap or replace the
//! default behavior without touching the engine.

use crate::backoff::{BackoffDecision, BackoffPolicy};
use crate::codecs::{CodecRegistry, JobKwargs};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::schema::JobSchema;
use crate::task::{send_job, EnqueueOptions, TaskHandle};
use jobq_runtime::{MessageId, QueueBackend, QueueName, ReceivedMessage};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "processors_tests.rs"]
mod tests;

// ============================================================================
// Message Attributes
// ============================================================================

/// Attribute naming the job a message belongs to
pub const JOB_NAME_ATTRIBUTE: &str = "JobName";

/// Attribute naming the codec the message body was serialized with
pub const CONTENT_TYPE_ATTRIBUTE: &str = "ContentType";

/// Attribute carrying the explicit deduplication id, when one was given
pub const DEDUPLICATION_ID_ATTRIBUTE: &str = "DeduplicationId";

/// Attribute carrying the ordering group id, when one was given
pub const GROUP_ID_ATTRIBUTE: &str = "GroupId";

// ============================================================================
// Processing Strategies
// ============================================================================

/// Handler for a single job invocation
pub type JobHandler = Arc<dyn Fn(JobKwargs) -> anyhow::Result<()> + Send + Sync>;

/// Handler invoked once with a whole decoded batch
pub type BatchJobHandler = Arc<dyn Fn(Vec<JobKwargs>) -> anyhow::Result<()> + Send + Sync>;

/// Input handed to a processor: one decoded message or a whole batch
#[derive(Debug, Clone)]
pub enum JobInput {
    Single(JobKwargs),
    Batch(Vec<JobKwargs>),
}

/// Metadata about the delivery being processed
#[derive(Debug, Clone)]
pub struct JobContext {
    pub queue: QueueName,
    pub job_name: String,
    pub message_ids: Vec<MessageId>,
    /// Highest delivery count among the messages being processed
    pub receive_count: u32,
}

impl JobContext {
    fn for_messages(queue: &QueueName, job_name: &str, messages: &[ReceivedMessage]) -> Self {
        Self {
            queue: queue.clone(),
            job_name: job_name.to_string(),
            message_ids: messages.iter().map(|m| m.message_id.clone()).collect(),
            receive_count: messages.iter().map(|m| m.receive_count).max().unwrap_or(1),
        }
    }
}

/// A processing strategy.
///
/// The engine builds processors through maker functions at registration
/// time; implementing this trait and installing a custom maker is how
/// callers wrap argument handling or invocation behavior.
pub trait Processor: Send + Sync {
    fn process(&self, input: JobInput, context: &JobContext) -> Result<(), WorkerError>;
}

/// Binds arguments against the schema and invokes the handler per message
pub struct DefaultProcessor {
    schema: JobSchema,
    handler: JobHandler,
}

impl DefaultProcessor {
    pub fn new(schema: JobSchema, handler: JobHandler) -> Self {
        Self { schema, handler }
    }

    fn invoke(&self, kwargs: JobKwargs, context: &JobContext) -> Result<(), WorkerError> {
        let bound = self.schema.bind(&context.job_name, &kwargs)?;
        (self.handler)(bound).map_err(|source| WorkerError::handler(&context.job_name, source))
    }
}

impl Processor for DefaultProcessor {
    fn process(&self, input: JobInput, context: &JobContext) -> Result<(), WorkerError> {
        match input {
            JobInput::Single(kwargs) => self.invoke(kwargs, context),
            JobInput::Batch(batch) => {
                for kwargs in batch {
                    self.invoke(kwargs, context)?;
                }
                Ok(())
            }
        }
    }
}

/// Binds each message then invokes the handler once with the whole batch
pub struct BatchProcessor {
    schema: JobSchema,
    handler: BatchJobHandler,
}

impl BatchProcessor {
    pub fn new(schema: JobSchema, handler: BatchJobHandler) -> Self {
        Self { schema, handler }
    }
}

impl Processor for BatchProcessor {
    fn process(&self, input: JobInput, context: &JobContext) -> Result<(), WorkerError> {
        let batch = match input {
            JobInput::Single(kwargs) => vec![kwargs],
            JobInput::Batch(batch) => batch,
        };

        let mut bound = Vec::with_capacity(batch.len());
        for kwargs in &batch {
            bound.push(self.schema.bind(&context.job_name, kwargs)?);
        }

        (self.handler)(bound).map_err(|source| WorkerError::handler(&context.job_name, source))
    }
}

/// Acknowledges unprocessable messages as successes without any handler.
///
/// Install as the fallback maker on queues that must be drained even when
/// nothing owns a given job name, such as dead-letter queues.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadLetterProcessor;

impl Processor for DeadLetterProcessor {
    fn process(&self, _input: JobInput, context: &JobContext) -> Result<(), WorkerError> {
        info!(
            queue = %context.queue,
            job_name = %context.job_name,
            "no processor registered; acknowledging without processing"
        );
        Ok(())
    }
}

/// Builds the processor for a single-message registration
pub type ProcessorMaker = Arc<dyn Fn(JobSchema, JobHandler) -> Arc<dyn Processor> + Send + Sync>;

/// Builds the processor for a batch registration
pub type BatchProcessorMaker =
    Arc<dyn Fn(JobSchema, BatchJobHandler) -> Arc<dyn Processor> + Send + Sync>;

/// Supplies a processor for messages with no registration.
///
/// Returning `None` (the default) records the message as a failure.
pub type FallbackMaker = Arc<dyn Fn(&QueueName, &str) -> Option<Arc<dyn Processor>> + Send + Sync>;

fn default_processor_maker() -> ProcessorMaker {
    Arc::new(|schema, handler| Arc::new(DefaultProcessor::new(schema, handler)))
}

fn default_batch_processor_maker() -> BatchProcessorMaker {
    Arc::new(|schema, handler| Arc::new(BatchProcessor::new(schema, handler)))
}

fn default_fallback_maker() -> FallbackMaker {
    Arc::new(|_, _| None)
}

/// Fallback maker that drains ownerless messages via [`DeadLetterProcessor`]
pub fn dead_letter_fallback() -> FallbackMaker {
    Arc::new(|_, _| Some(Arc::new(DeadLetterProcessor)))
}

// ============================================================================
// Batch Result
// ============================================================================

/// Outcome counts for one `process_batch` call.
///
/// Reflects exactly the messages processed in that call; there is no
/// cross-call accumulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    succeeded: usize,
    failed: usize,
}

impl BatchResult {
    /// Messages processed and deleted successfully
    pub fn succeeded_count(&self) -> usize {
        self.succeeded
    }

    /// Messages that failed and were rescheduled or dropped
    pub fn failed_count(&self) -> usize {
        self.failed
    }

    /// Total messages seen by this call
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Check whether the call processed nothing
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn record_success(&mut self) {
        self.succeeded += 1;
    }

    fn record_failure(&mut self) {
        self.failed += 1;
    }
}

// ============================================================================
// Registration
// ============================================================================

/// A registered job: its processor, backoff policy, and declared schema
struct Registration {
    processor: Arc<dyn Processor>,
    backoff: Arc<dyn BackoffPolicy>,
    schema: JobSchema,
    batch_mode: bool,
}

type RegistrationKey = (QueueName, String);

// ============================================================================
// JobDispatcher
// ============================================================================

/// Processor registry and dispatch engine over a queue backend.
///
/// Registrations are keyed by (queue, job name); the last registration for a
/// key wins. `process_batch` is the sole processing entry point — there is no
/// background scheduler, and callers decide the polling cadence.
pub struct JobDispatcher {
    backend: Arc<dyn QueueBackend>,
    codecs: CodecRegistry,
    config: WorkerConfig,
    registrations: RwLock<HashMap<RegistrationKey, Arc<Registration>>>,
    processor_maker: ProcessorMaker,
    batch_processor_maker: BatchProcessorMaker,
    fallback_maker: FallbackMaker,
    default_backoff: Arc<dyn BackoffPolicy>,
}

impl JobDispatcher {
    /// Create a dispatcher with default configuration
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self::with_config(backend, WorkerConfig::default())
    }

    /// Create a dispatcher with explicit configuration
    pub fn with_config(backend: Arc<dyn QueueBackend>, config: WorkerConfig) -> Self {
        let default_backoff = config.default_backoff();
        Self {
            backend,
            codecs: CodecRegistry::new(),
            config,
            registrations: RwLock::new(HashMap::new()),
            processor_maker: default_processor_maker(),
            batch_processor_maker: default_batch_processor_maker(),
            fallback_maker: default_fallback_maker(),
            default_backoff,
        }
    }

    /// The queue backend this dispatcher operates on
    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }

    /// Codec registry used for encoding and decoding payloads
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Mutable codec registry, for registering custom codecs
    pub fn codecs_mut(&mut self) -> &mut CodecRegistry {
        &mut self.codecs
    }

    /// Replace the maker used for subsequent single-message registrations
    pub fn set_processor_maker(&mut self, maker: ProcessorMaker) {
        self.processor_maker = maker;
    }

    /// Replace the maker used for subsequent batch registrations
    pub fn set_batch_processor_maker(&mut self, maker: BatchProcessorMaker) {
        self.batch_processor_maker = maker;
    }

    /// Replace the fallback consulted for messages with no registration
    pub fn set_fallback_maker(&mut self, maker: FallbackMaker) {
        self.fallback_maker = maker;
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register a single-message processor with the default backoff policy
    pub fn connect<F>(
        &self,
        queue: &QueueName,
        job_name: &str,
        schema: JobSchema,
        handler: F,
    ) -> TaskHandle
    where
        F: Fn(JobKwargs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let backoff = self.default_backoff.clone();
        self.connect_with_backoff(queue, job_name, schema, handler, backoff)
    }

    /// Register a single-message processor with an explicit backoff policy.
    ///
    /// Overwrites any prior registration for the same (queue, job name) key.
    pub fn connect_with_backoff<F>(
        &self,
        queue: &QueueName,
        job_name: &str,
        schema: JobSchema,
        handler: F,
        backoff: Arc<dyn BackoffPolicy>,
    ) -> TaskHandle
    where
        F: Fn(JobKwargs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: JobHandler = Arc::new(handler);
        let processor = (self.processor_maker)(schema.clone(), handler);
        self.insert_registration(queue, job_name, schema, processor, backoff, false)
    }

    /// Register a batch processor with the default backoff policy
    pub fn connect_batch<F>(
        &self,
        queue: &QueueName,
        job_name: &str,
        schema: JobSchema,
        handler: F,
    ) -> TaskHandle
    where
        F: Fn(Vec<JobKwargs>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let backoff = self.default_backoff.clone();
        self.connect_batch_with_backoff(queue, job_name, schema, handler, backoff)
    }

    /// Register a batch processor with an explicit backoff policy.
    ///
    /// The handler receives every decoded message of its job name from a
    /// receive batch in one call, and the whole batch succeeds or fails as
    /// one unit.
    pub fn connect_batch_with_backoff<F>(
        &self,
        queue: &QueueName,
        job_name: &str,
        schema: JobSchema,
        handler: F,
        backoff: Arc<dyn BackoffPolicy>,
    ) -> TaskHandle
    where
        F: Fn(Vec<JobKwargs>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: BatchJobHandler = Arc::new(handler);
        let processor = (self.batch_processor_maker)(schema.clone(), handler);
        self.insert_registration(queue, job_name, schema, processor, backoff, true)
    }

    fn insert_registration(
        &self,
        queue: &QueueName,
        job_name: &str,
        schema: JobSchema,
        processor: Arc<dyn Processor>,
        backoff: Arc<dyn BackoffPolicy>,
        batch_mode: bool,
    ) -> TaskHandle {
        let registration = Arc::new(Registration {
            processor,
            backoff,
            schema: schema.clone(),
            batch_mode,
        });

        let replaced = self
            .registrations
            .write()
            .insert((queue.clone(), job_name.to_string()), registration)
            .is_some();
        if replaced {
            debug!(queue = %queue, job_name, "replaced existing job registration");
        } else {
            debug!(queue = %queue, job_name, "registered job processor");
        }

        self.make_task_handle(queue, job_name, schema)
    }

    /// Duplicate every registration from one queue onto another.
    ///
    /// The destination shares the source's processor and policy objects.
    pub fn copy(&self, source: &QueueName, destination: &QueueName) {
        let mut registrations = self.registrations.write();
        let copied: Vec<(String, Arc<Registration>)> = registrations
            .iter()
            .filter(|((queue, _), _)| queue == source)
            .map(|((_, job_name), registration)| (job_name.clone(), registration.clone()))
            .collect();

        info!(
            source = %source,
            destination = %destination,
            count = copied.len(),
            "copying job registrations"
        );
        for (job_name, registration) in copied {
            registrations.insert((destination.clone(), job_name), registration);
        }
    }

    /// Task handle for an already-registered job
    pub fn task(&self, queue: &QueueName, job_name: &str) -> Option<TaskHandle> {
        let schema = self
            .lookup(queue, job_name)
            .map(|registration| registration.schema.clone())?;
        Some(self.make_task_handle(queue, job_name, schema))
    }

    fn make_task_handle(&self, queue: &QueueName, job_name: &str, schema: JobSchema) -> TaskHandle {
        TaskHandle::new(
            self.backend.clone(),
            self.codecs.clone(),
            queue.clone(),
            job_name.to_string(),
            schema,
            self.codecs.default_content_type().to_string(),
        )
    }

    fn lookup(&self, queue: &QueueName, job_name: &str) -> Option<Arc<Registration>> {
        self.registrations
            .read()
            .get(&(queue.clone(), job_name.to_string()))
            .cloned()
    }

    // ------------------------------------------------------------------------
    // Enqueue
    // ------------------------------------------------------------------------

    /// Enqueue a job without requiring a registration.
    ///
    /// The kwargs are sent as-is; argument validation happens at dispatch
    /// time against whatever registration exists then.
    pub async fn add_job(
        &self,
        queue: &QueueName,
        job_name: &str,
        kwargs: JobKwargs,
        options: EnqueueOptions,
    ) -> Result<MessageId, WorkerError> {
        send_job(
            &self.backend,
            &self.codecs,
            self.codecs.default_content_type(),
            queue,
            job_name,
            kwargs,
            options,
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------------

    /// Process one batch with the configured default wait and batch size
    pub async fn process_batch(&self, queue: &QueueName) -> Result<BatchResult, WorkerError> {
        self.process_batch_with(queue, self.config.wait(), self.config.max_messages)
            .await
    }

    /// Receive one batch and dispatch every message in it.
    ///
    /// Single-message registrations are invoked per message; batch
    /// registrations are invoked once with every message of their job name
    /// and succeed or fail atomically. A failure in one message never
    /// prevents processing of the others.
    pub async fn process_batch_with(
        &self,
        queue: &QueueName,
        wait: Duration,
        max_messages: usize,
    ) -> Result<BatchResult, WorkerError> {
        let messages = self
            .backend
            .receive_messages(queue, max_messages, wait)
            .await?;

        let mut result = BatchResult::default();
        if messages.is_empty() {
            return Ok(result);
        }

        // Batch-mode messages are grouped by job name so each batch handler
        // runs once per receive batch; everything else dispatches per
        // message in delivery order.
        let mut singles: Vec<ReceivedMessage> = Vec::new();
        let mut batch_groups: Vec<(String, Arc<Registration>, Vec<ReceivedMessage>)> = Vec::new();

        for message in messages {
            let job_name = message.attribute(JOB_NAME_ATTRIBUTE).map(str::to_string);
            let registration = job_name
                .as_deref()
                .and_then(|name| self.lookup(queue, name));

            match (job_name, registration) {
                (Some(name), Some(registration)) if registration.batch_mode => {
                    if let Some(position) =
                        batch_groups.iter().position(|(group, _, _)| *group == name)
                    {
                        batch_groups[position].2.push(message);
                    } else {
                        batch_groups.push((name, registration, vec![message]));
                    }
                }
                _ => singles.push(message),
            }
        }

        for message in singles {
            self.process_single(queue, message, &mut result).await;
        }
        for (job_name, registration, group) in batch_groups {
            self.process_batch_group(queue, &job_name, registration, group, &mut result)
                .await;
        }

        Ok(result)
    }

    async fn process_single(
        &self,
        queue: &QueueName,
        message: ReceivedMessage,
        result: &mut BatchResult,
    ) {
        match self.dispatch_single(queue, &message) {
            Ok(()) => {
                self.acknowledge(queue, &message).await;
                result.record_success();
            }
            Err(err) => {
                warn!(
                    queue = %queue,
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    error = %err,
                    "job processing failed"
                );
                let policy = self.backoff_for(queue, &message);
                let decision = policy.decide(message.receive_count, &err);
                self.apply_backoff(queue, &message, decision).await;
                result.record_failure();
            }
        }
    }

    fn dispatch_single(
        &self,
        queue: &QueueName,
        message: &ReceivedMessage,
    ) -> Result<(), WorkerError> {
        let job_name =
            message
                .attribute(JOB_NAME_ATTRIBUTE)
                .ok_or_else(|| WorkerError::DecodeFailure {
                    content_type: "<unknown>".to_string(),
                    message: "message carries no JobName attribute".to_string(),
                })?;
        let kwargs = self.decode(message)?;
        let context = JobContext::for_messages(queue, job_name, std::slice::from_ref(message));

        match self.lookup(queue, job_name) {
            Some(registration) => registration
                .processor
                .process(JobInput::Single(kwargs), &context),
            None => match (self.fallback_maker)(queue, job_name) {
                Some(processor) => processor.process(JobInput::Single(kwargs), &context),
                None => Err(WorkerError::NoProcessor {
                    queue_name: queue.to_string(),
                    job_name: job_name.to_string(),
                }),
            },
        }
    }

    async fn process_batch_group(
        &self,
        queue: &QueueName,
        job_name: &str,
        registration: Arc<Registration>,
        messages: Vec<ReceivedMessage>,
        result: &mut BatchResult,
    ) {
        // Decode everything up front; the group fails as one unit if any
        // message is malformed.
        let mut decoded = Vec::with_capacity(messages.len());
        let mut failure: Option<WorkerError> = None;
        for message in &messages {
            match self.decode(message) {
                Ok(kwargs) => decoded.push(kwargs),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let outcome = match failure {
            Some(err) => Err(err),
            None => {
                let context = JobContext::for_messages(queue, job_name, &messages);
                registration
                    .processor
                    .process(JobInput::Batch(decoded), &context)
            }
        };

        match outcome {
            Ok(()) => {
                for message in &messages {
                    self.acknowledge(queue, message).await;
                    result.record_success();
                }
            }
            Err(err) => {
                warn!(
                    queue = %queue,
                    job_name,
                    batch_size = messages.len(),
                    error = %err,
                    "batch processing failed; failing the whole batch"
                );
                for message in &messages {
                    let decision = registration.backoff.decide(message.receive_count, &err);
                    self.apply_backoff(queue, message, decision).await;
                    result.record_failure();
                }
            }
        }
    }

    fn decode(&self, message: &ReceivedMessage) -> Result<JobKwargs, WorkerError> {
        let content_type =
            message
                .attribute(CONTENT_TYPE_ATTRIBUTE)
                .ok_or_else(|| WorkerError::DecodeFailure {
                    content_type: "<unknown>".to_string(),
                    message: "message carries no ContentType attribute".to_string(),
                })?;
        let codec = self.codecs.get(content_type)?;
        codec.deserialize(&message.body)
    }

    fn backoff_for(&self, queue: &QueueName, message: &ReceivedMessage) -> Arc<dyn BackoffPolicy> {
        message
            .attribute(JOB_NAME_ATTRIBUTE)
            .and_then(|job_name| self.lookup(queue, job_name))
            .map(|registration| registration.backoff.clone())
            .unwrap_or_else(|| self.default_backoff.clone())
    }

    async fn acknowledge(&self, queue: &QueueName, message: &ReceivedMessage) {
        match self
            .backend
            .delete_message(queue, &message.receipt_handle)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_stale_receipt() => {
                debug!(
                    queue = %queue,
                    message_id = %message.message_id,
                    "lease lapsed before delete; message may be redelivered"
                );
            }
            Err(err) => {
                error!(
                    queue = %queue,
                    message_id = %message.message_id,
                    error = %err,
                    "failed to delete processed message"
                );
            }
        }
    }

    async fn apply_backoff(
        &self,
        queue: &QueueName,
        message: &ReceivedMessage,
        decision: BackoffDecision,
    ) {
        let applied = match decision {
            BackoffDecision::ReturnImmediately => {
                self.backend
                    .change_visibility(queue, &message.receipt_handle, Duration::ZERO)
                    .await
            }
            BackoffDecision::ReturnAfter(delay) => {
                self.backend
                    .change_visibility(queue, &message.receipt_handle, delay)
                    .await
            }
            BackoffDecision::Drop => {
                warn!(
                    queue = %queue,
                    message_id = %message.message_id,
                    "backoff policy gave up; dropping message"
                );
                self.backend
                    .delete_message(queue, &message.receipt_handle)
                    .await
            }
        };

        if let Err(err) = applied {
            if err.is_stale_receipt() {
                debug!(
                    queue = %queue,
                    message_id = %message.message_id,
                    "backoff on stale receipt ignored"
                );
            } else {
                error!(
                    queue = %queue,
                    message_id = %message.message_id,
                    error = %err,
                    "failed to apply backoff decision"
                );
            }
        }
    }
}
