//! Tests for backoff policies.

use super::*;

fn some_error() -> WorkerError {
    WorkerError::handler("say_hello", anyhow::anyhow!("oops"))
}

#[test]
fn test_immediate_return_always_returns_immediately() {
    let policy = ImmediateReturn;
    for attempt in [1, 2, 10, 1000] {
        assert_eq!(
            policy.decide(attempt, &some_error()),
            BackoffDecision::ReturnImmediately
        );
    }
}

#[test]
fn test_exponential_backoff_doubles_per_attempt() {
    let policy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(3600));

    let expectations = [
        (1, Duration::from_secs(1)),
        (2, Duration::from_secs(2)),
        (3, Duration::from_secs(4)),
        (4, Duration::from_secs(8)),
    ];
    for (attempt, expected) in expectations {
        assert_eq!(
            policy.decide(attempt, &some_error()),
            BackoffDecision::ReturnAfter(expected)
        );
    }
}

#[test]
fn test_exponential_backoff_caps_at_max() {
    let policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(100));

    // Repeated failures never exceed the cap
    for attempt in 1..=50 {
        match policy.decide(attempt, &some_error()) {
            BackoffDecision::ReturnAfter(delay) => {
                assert!(delay <= Duration::from_millis(100), "attempt {attempt}");
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }
}

#[test]
fn test_exponential_backoff_is_monotonic() {
    let policy = ExponentialBackoff::new(Duration::from_millis(50), Duration::from_secs(60));

    let mut previous = Duration::ZERO;
    for attempt in 1..=40 {
        let BackoffDecision::ReturnAfter(delay) = policy.decide(attempt, &some_error()) else {
            panic!("expected a delay");
        };
        assert!(delay >= previous, "delay shrank at attempt {attempt}");
        previous = delay;
    }
}

#[test]
fn test_exponential_backoff_treats_zero_count_as_first_attempt() {
    let policy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
    assert_eq!(
        policy.decide(0, &some_error()),
        BackoffDecision::ReturnAfter(Duration::from_secs(1))
    );
}

#[test]
fn test_exponential_backoff_survives_huge_attempt_numbers() {
    let policy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(900));
    assert_eq!(
        policy.decide(u32::MAX, &some_error()),
        BackoffDecision::ReturnAfter(Duration::from_secs(900))
    );
}

#[test]
fn test_default_policy_is_capped() {
    let policy = ExponentialBackoff::default();
    let BackoffDecision::ReturnAfter(delay) = policy.decide(100, &some_error()) else {
        panic!("expected a delay");
    };
    assert_eq!(delay, Duration::from_secs(15 * 60));
}
