//! Backoff policies applied when a job fails.
//!
//! Policies are pure and stateless: the attempt number is derived from the
//! message's receive count, never stored in the policy itself.

use crate::error::WorkerError;
use std::time::Duration;

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;

/// Disposition for a failed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Make the message visible again with no delay
    ReturnImmediately,
    /// Keep the message invisible for the given span before redelivery
    ReturnAfter(Duration),
    /// Give up: delete the message without redelivery
    Drop,
}

/// Strategy deciding what happens to a message after a failure.
///
/// `receive_count` is the number of times the message has been delivered,
/// including the delivery that just failed; it is always at least 1.
pub trait BackoffPolicy: Send + Sync {
    fn decide(&self, receive_count: u32, error: &WorkerError) -> BackoffDecision;
}

/// Return failed messages to the queue immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateReturn;

impl BackoffPolicy for ImmediateReturn {
    fn decide(&self, _receive_count: u32, _error: &WorkerError) -> BackoffDecision {
        BackoffDecision::ReturnImmediately
    }
}

/// Exponential backoff capped at a maximum visibility timeout.
///
/// The delay for attempt `n` is `base * 2^(n-1)`, capped at
/// `max_visibility_timeout`; it is monotonic non-decreasing in the attempt
/// number.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base: Duration,
    max_visibility_timeout: Duration,
}

impl ExponentialBackoff {
    /// Create a policy with the given base delay and cap
    pub fn new(base: Duration, max_visibility_timeout: Duration) -> Self {
        Self {
            base,
            max_visibility_timeout,
        }
    }

    /// Compute the capped delay for an attempt number
    fn delay_for(&self, receive_count: u32) -> Duration {
        let attempt = receive_count.max(1);
        // 2^(attempt-1) as f64; large exponents saturate to infinity and are
        // brought back down by the cap
        let factor = 2f64.powi((attempt - 1).min(i32::MAX as u32) as i32);
        let delay = self.base.as_secs_f64() * factor;
        let capped = delay.min(self.max_visibility_timeout.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_visibility_timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn decide(&self, receive_count: u32, _error: &WorkerError) -> BackoffDecision {
        BackoffDecision::ReturnAfter(self.delay_for(receive_count))
    }
}
