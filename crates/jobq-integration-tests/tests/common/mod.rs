//! Shared helpers for integration tests.

#![allow(dead_code)]

use jobq_runtime::{MemoryQueueStore, QueueBackend, QueueConfig, QueueName};
use jobq_workers::{JobDispatcher, JobKwargs, JobSchema};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, Once};

static TRACING: Once = Once::new();

/// Install a log subscriber once so `RUST_LOG=debug` surfaces store and
/// engine logs while debugging a test
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

/// Build kwargs from a JSON object literal
pub fn kwargs(value: Value) -> JobKwargs {
    value.as_object().cloned().unwrap_or_default()
}

/// Schema shared by the greeting jobs used across these tests
pub fn greeting_schema() -> JobSchema {
    JobSchema::new().optional("username", json!("Anonymous"))
}

/// Random queue name so tests never collide
pub fn unique_queue(prefix: &str) -> QueueName {
    QueueName::new(format!("{prefix}-{}", uuid::Uuid::new_v4().simple())).unwrap()
}

/// Random FIFO queue name
pub fn unique_fifo_queue(prefix: &str) -> QueueName {
    QueueName::new(format!(
        "{prefix}-{}.fifo",
        uuid::Uuid::new_v4().simple()
    ))
    .unwrap()
}

/// Fresh backend plus a dispatcher over it
pub fn test_env() -> (Arc<dyn QueueBackend>, JobDispatcher) {
    init_tracing();
    let backend: Arc<dyn QueueBackend> = Arc::new(MemoryQueueStore::default());
    let dispatcher = JobDispatcher::new(backend.clone());
    (backend, dispatcher)
}

/// Fresh backend, dispatcher, and one standard queue
pub async fn env_with_queue(prefix: &str) -> (Arc<dyn QueueBackend>, JobDispatcher, QueueName) {
    let (backend, dispatcher) = test_env();
    let queue = unique_queue(prefix);
    backend
        .create_standard_queue(&queue, QueueConfig::default())
        .await
        .unwrap();
    (backend, dispatcher, queue)
}

/// Thread-safe recorder capturing what handlers observed
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn push(&self, value: &str) {
        self.0.lock().unwrap().push(value.to_string());
    }

    pub fn values(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn sorted(&self) -> Vec<String> {
        let mut values = self.values();
        values.sort();
        values
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }
}
