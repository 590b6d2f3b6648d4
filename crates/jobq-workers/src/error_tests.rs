//! Tests for worker error types.

use super::*;
use jobq_runtime::QueueError;

#[test]
fn test_unsupported_codec_display() {
    let err = WorkerError::UnsupportedCodec {
        content_type: "yaml".to_string(),
    };
    assert_eq!(err.to_string(), "Unsupported content type: yaml");
}

#[test]
fn test_handler_error_wraps_cause() {
    let err = WorkerError::handler("say_hello", anyhow::anyhow!("oops"));
    assert!(err.to_string().contains("say_hello"));
    assert!(err.to_string().contains("oops"));
}

#[test]
fn test_message_scoped_classification() {
    assert!(WorkerError::UnexpectedArgument {
        job_name: "say_hello".to_string(),
        argument: "foo".to_string(),
    }
    .is_message_scoped());

    assert!(WorkerError::NoProcessor {
        queue_name: "orders".to_string(),
        job_name: "say_hello".to_string(),
    }
    .is_message_scoped());

    assert!(WorkerError::handler("say_hello", anyhow::anyhow!("oops")).is_message_scoped());

    // Queue and configuration problems abort the call instead
    let queue_err: WorkerError = QueueError::QueueNotFound {
        queue_name: "orders".to_string(),
    }
    .into();
    assert!(!queue_err.is_message_scoped());

    assert!(!WorkerError::Configuration {
        message: "bad".to_string(),
    }
    .is_message_scoped());
}

#[test]
fn test_queue_error_conversion() {
    let err: WorkerError = QueueError::QueueAlreadyExists {
        queue_name: "orders".to_string(),
    }
    .into();
    assert!(matches!(err, WorkerError::Queue(_)));
}
