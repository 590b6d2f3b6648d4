//! End-to-end processing scenarios: enqueue through handler invocation.

mod common;

use common::{env_with_queue, greeting_schema, kwargs, Recorder};
use jobq_runtime::QueueBackend;
use jobq_workers::codecs::{Codec, JsonCodec, MessagePackCodec};
use jobq_workers::{
    BatchProcessor, DefaultProcessor, EnqueueOptions, ExponentialBackoff, ImmediateReturn,
    JobContext, JobInput, JobKwargs, Processor, WorkerError, CONTENT_TYPE_ATTRIBUTE,
    JOB_NAME_ATTRIBUTE,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_add_job_sends_tagged_json_payload() {
    let (backend, dispatcher, queue) = env_with_queue("jobs").await;

    dispatcher
        .add_job(
            &queue,
            "say_hello",
            kwargs(json!({"username": "Homer"})),
            EnqueueOptions::new(),
        )
        .await
        .unwrap();

    let raw = backend
        .receive_messages(&queue, 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].attribute(JOB_NAME_ATTRIBUTE), Some("say_hello"));
    assert_eq!(raw[0].attribute(CONTENT_TYPE_ATTRIBUTE), Some("json"));
    assert_eq!(
        JsonCodec.deserialize(&raw[0].body).unwrap(),
        kwargs(json!({"username": "Homer"}))
    );
}

#[tokio::test]
async fn test_add_job_sends_tagged_msgpack_payload() {
    let (backend, dispatcher, queue) = env_with_queue("jobs").await;

    dispatcher
        .add_job(
            &queue,
            "say_hello",
            kwargs(json!({"username": "Homer"})),
            EnqueueOptions::new().with_content_type("msgpack"),
        )
        .await
        .unwrap();

    let raw = backend
        .receive_messages(&queue, 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(raw[0].attribute(CONTENT_TYPE_ATTRIBUTE), Some("msgpack"));
    assert_eq!(
        MessagePackCodec.deserialize(&raw[0].body).unwrap(),
        kwargs(json!({"username": "Homer"}))
    );
}

#[tokio::test]
async fn test_processor_runs_registered_handler() {
    let (_backend, dispatcher, queue) = env_with_queue("jobs").await;
    let recorder = Recorder::default();

    let seen = recorder.clone();
    let task = dispatcher.connect(&queue, "say_hello", greeting_schema(), move |kwargs| {
        seen.push(kwargs["username"].as_str().unwrap_or(""));
        Ok(())
    });

    task.enqueue(kwargs(json!({"username": "Homer"})))
        .await
        .unwrap();
    assert!(recorder.is_empty());

    let result = dispatcher
        .process_batch_with(&queue, Duration::ZERO, 10)
        .await
        .unwrap();
    assert_eq!(result.succeeded_count(), 1);
    assert_eq!(recorder.values(), ["Homer"]);
}

#[tokio::test]
async fn test_messages_process_exactly_once() {
    let (_backend, dispatcher, queue) = env_with_queue("jobs").await;

    let task = dispatcher.connect(&queue, "say_hello", greeting_schema(), |_| Ok(()));
    task.enqueue(kwargs(json!({"username": "Homer"})))
        .await
        .unwrap();

    let processed = dispatcher
        .process_batch_with(&queue, Duration::ZERO, 10)
        .await
        .unwrap()
        .succeeded_count();
    assert_eq!(processed, 1);

    let processed = dispatcher
        .process_batch_with(&queue, Duration::ZERO, 10)
        .await
        .unwrap()
        .succeeded_count();
    assert_eq!(processed, 0);
}

#[tokio::test]
async fn test_batch_processor_drains_many_messages() {
    let (_backend, dispatcher, queue) = env_with_queue("jobs").await;
    let recorder = Recorder::default();

    let seen = recorder.clone();
    let task = dispatcher.connect_batch(&queue, "batch_say_hello", greeting_schema(), move |batch| {
        for kwargs in batch {
            seen.push(kwargs["username"].as_str().unwrap_or(""));
        }
        Ok(())
    });

    let usernames: Vec<String> = (0..20).map(|i| format!("u{i:02}")).collect();
    for username in &usernames {
        task.enqueue(kwargs(json!({"username": username})))
            .await
            .unwrap();
    }

    // A single receive may not return everything; drain with a loop
    loop {
        let processed = dispatcher
            .process_batch_with(&queue, Duration::ZERO, 10)
            .await
            .unwrap()
            .succeeded_count();
        if processed == 0 {
            break;
        }
    }

    assert_eq!(recorder.sorted(), usernames);
}

#[tokio::test]
async fn test_copy_processors_to_second_queue() {
    let (backend, dispatcher, queue) = env_with_queue("jobs").await;
    let queue2 = common::unique_queue("jobs-copy");
    backend
        .create_standard_queue(&queue2, jobq_runtime::QueueConfig::default())
        .await
        .unwrap();

    let recorder = Recorder::default();
    let seen = recorder.clone();
    dispatcher.connect(&queue, "say_hello", greeting_schema(), move |kwargs| {
        seen.push(kwargs["username"].as_str().unwrap_or(""));
        Ok(())
    });
    dispatcher.copy(&queue, &queue2);

    dispatcher
        .add_job(&queue2, "say_hello", JobKwargs::new(), EnqueueOptions::new())
        .await
        .unwrap();

    let processed = dispatcher
        .process_batch_with(&queue2, Duration::ZERO, 10)
        .await
        .unwrap()
        .succeeded_count();
    assert_eq!(processed, 1);
    assert_eq!(recorder.values(), ["Anonymous"]);
}

#[tokio::test]
async fn test_enqueue_rejects_extra_arguments() {
    let (_backend, dispatcher, queue) = env_with_queue("jobs").await;
    let task = dispatcher.connect(&queue, "say_hello", greeting_schema(), |_| Ok(()));

    let err = task
        .enqueue(kwargs(json!({"username": "Homer", "foo": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::UnexpectedArgument { .. }));
}

#[tokio::test]
async fn test_enqueue_fills_declared_defaults() {
    let (_backend, dispatcher, queue) = env_with_queue("jobs").await;
    let recorder = Recorder::default();

    let seen = recorder.clone();
    let task = dispatcher.connect(&queue, "say_hello", greeting_schema(), move |kwargs| {
        seen.push(kwargs["username"].as_str().unwrap_or(""));
        Ok(())
    });

    task.enqueue(JobKwargs::new()).await.unwrap();
    let processed = dispatcher
        .process_batch_with(&queue, Duration::ZERO, 10)
        .await
        .unwrap()
        .succeeded_count();
    assert_eq!(processed, 1);
    assert_eq!(recorder.values(), ["Anonymous"]);
}

#[tokio::test]
async fn test_enqueue_positional_value() {
    let (_backend, dispatcher, queue) = env_with_queue("jobs").await;
    let recorder = Recorder::default();

    let seen = recorder.clone();
    let task = dispatcher.connect(&queue, "say_hello", greeting_schema(), move |kwargs| {
        seen.push(kwargs["username"].as_str().unwrap_or(""));
        Ok(())
    });

    task.enqueue_positional(json!("Homer")).await.unwrap();
    let processed = dispatcher
        .process_batch_with(&queue, Duration::ZERO, 10)
        .await
        .unwrap()
        .succeeded_count();
    assert_eq!(processed, 1);
    assert_eq!(recorder.values(), ["Homer"]);
}

#[tokio::test]
async fn test_failed_job_returns_to_queue() {
    let (_backend, dispatcher, queue) = env_with_queue("jobs").await;

    let task = dispatcher.connect_with_backoff(
        &queue,
        "say_hello",
        greeting_schema(),
        |_| Err(anyhow::anyhow!("oops")),
        Arc::new(ImmediateReturn),
    );
    task.enqueue(kwargs(json!({"username": "Homer"})))
        .await
        .unwrap();

    let failed = dispatcher
        .process_batch_with(&queue, Duration::ZERO, 10)
        .await
        .unwrap()
        .failed_count();
    assert_eq!(failed, 1);

    // Re-connect a non-broken processor for the queue
    let recorder = Recorder::default();
    let seen = recorder.clone();
    dispatcher.connect(&queue, "say_hello", greeting_schema(), move |kwargs| {
        seen.push(kwargs["username"].as_str().unwrap_or(""));
        Ok(())
    });

    let processed = dispatcher
        .process_batch_with(&queue, Duration::ZERO, 10)
        .await
        .unwrap()
        .succeeded_count();
    assert_eq!(processed, 1);
    assert_eq!(recorder.values(), ["Homer"]);
}

#[tokio::test]
async fn test_exponential_backoff_never_exceeds_cap() {
    let (_backend, dispatcher, queue) = env_with_queue("jobs").await;

    let task = dispatcher.connect_with_backoff(
        &queue,
        "say_hello",
        greeting_schema(),
        |_| Err(anyhow::anyhow!("oops")),
        Arc::new(ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(100),
        )),
    );
    task.enqueue(kwargs(json!({"username": "Homer"})))
        .await
        .unwrap();

    // Repeated failures: the visibility delay stays at the cap, so the
    // message keeps coming back within a bounded window
    for _ in 0..3 {
        let failed = dispatcher
            .process_batch_with(&queue, Duration::from_secs(2), 10)
            .await
            .unwrap()
            .failed_count();
        assert_eq!(failed, 1);
    }
}

#[tokio::test]
async fn test_custom_processor_rewrites_arguments() {
    struct CustomProcessor {
        inner: DefaultProcessor,
    }

    impl Processor for CustomProcessor {
        fn process(&self, input: JobInput, context: &JobContext) -> Result<(), WorkerError> {
            let input = match input {
                JobInput::Single(mut kwargs) => {
                    kwargs.insert("username".to_string(), json!("Foo"));
                    JobInput::Single(kwargs)
                }
                other => other,
            };
            self.inner.process(input, context)
        }
    }

    let (backend, _dispatcher, queue) = env_with_queue("jobs").await;
    let mut dispatcher = jobq_workers::JobDispatcher::new(backend);
    dispatcher.set_processor_maker(Arc::new(|schema, handler| {
        Arc::new(CustomProcessor {
            inner: DefaultProcessor::new(schema, handler),
        })
    }));

    let recorder = Recorder::default();
    let seen = recorder.clone();
    let task = dispatcher.connect(&queue, "say_hello", greeting_schema(), move |kwargs| {
        seen.push(kwargs["username"].as_str().unwrap_or(""));
        Ok(())
    });

    task.enqueue(JobKwargs::new()).await.unwrap();
    let processed = dispatcher
        .process_batch(&queue)
        .await
        .unwrap()
        .succeeded_count();
    assert_eq!(processed, 1);
    assert_eq!(recorder.values(), ["Foo"]);
}

#[tokio::test]
async fn test_custom_batch_processor_rewrites_first_job() {
    struct CustomBatchProcessor {
        inner: BatchProcessor,
    }

    impl Processor for CustomBatchProcessor {
        fn process(&self, input: JobInput, context: &JobContext) -> Result<(), WorkerError> {
            let input = match input {
                JobInput::Batch(mut batch) => {
                    if let Some(first) = batch.first_mut() {
                        first.insert("username".to_string(), json!("Two"));
                    }
                    JobInput::Batch(batch)
                }
                other => other,
            };
            self.inner.process(input, context)
        }
    }

    let (backend, _dispatcher, queue) = env_with_queue("jobs").await;
    let mut dispatcher = jobq_workers::JobDispatcher::new(backend);
    dispatcher.set_batch_processor_maker(Arc::new(|schema, handler| {
        Arc::new(CustomBatchProcessor {
            inner: BatchProcessor::new(schema, handler),
        })
    }));

    let recorder = Recorder::default();
    let seen = recorder.clone();
    let task = dispatcher.connect_batch(&queue, "batch_say_hello", greeting_schema(), move |batch| {
        for kwargs in batch {
            seen.push(kwargs["username"].as_str().unwrap_or(""));
        }
        Ok(())
    });

    task.enqueue(kwargs(json!({"username": "One"})))
        .await
        .unwrap();
    let processed = dispatcher
        .process_batch(&queue)
        .await
        .unwrap()
        .succeeded_count();
    assert_eq!(processed, 1);
    assert_eq!(recorder.values(), ["Two"]);
}

#[tokio::test]
async fn test_batch_failure_is_all_or_nothing() {
    let (_backend, dispatcher, queue) = env_with_queue("jobs").await;

    let task = dispatcher.connect_batch_with_backoff(
        &queue,
        "batch_say_hello",
        greeting_schema(),
        |_| Err(anyhow::anyhow!("batch oops")),
        Arc::new(ImmediateReturn),
    );
    for i in 0..5 {
        task.enqueue(kwargs(json!({"username": format!("u{i}")})))
            .await
            .unwrap();
    }

    let result = dispatcher
        .process_batch_with(&queue, Duration::ZERO, 10)
        .await
        .unwrap();
    assert_eq!(result.succeeded_count(), 0);
    assert_eq!(result.failed_count(), 5);
}
