//! Skip, retry and back-off policies
//!
//! Policies are small strategy objects handed to a step at construction. The
//! fault tolerant provider and processor consult them; nothing else does.

use crate::core::retry::RetryContext;
use crate::domain::{BatchError, ErrorKind, Result};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Decides whether a failed item may be dropped
pub trait SkipPolicy: Send + Sync {
    /// Classify a failure
    ///
    /// # Arguments
    ///
    /// * `error` - The failure
    /// * `skip_count` - Skips recorded so far across the whole step, read,
    ///   process and write phases together
    ///
    /// # Errors
    ///
    /// Returns `BatchError::SkipLimitExceeded` when the error is skippable but
    /// the limit is already reached.
    fn should_skip(&self, error: &BatchError, skip_count: usize) -> Result<bool>;
}

/// Skips classified errors up to a limit
#[derive(Debug, Clone)]
pub struct LimitCheckingSkipPolicy {
    limit: usize,
    skippable: HashSet<ErrorKind>,
}

impl LimitCheckingSkipPolicy {
    pub fn new(limit: usize, skippable: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            limit,
            skippable: skippable.into_iter().collect(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl SkipPolicy for LimitCheckingSkipPolicy {
    fn should_skip(&self, error: &BatchError, skip_count: usize) -> Result<bool> {
        if error.is_fatal() || !self.skippable.contains(&error.kind()) {
            return Ok(false);
        }
        if skip_count < self.limit {
            Ok(true)
        } else {
            Err(BatchError::SkipLimitExceeded {
                limit: self.limit,
                cause: Box::new(error.clone()),
            })
        }
    }
}

/// Skips every non-fatal error
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSkipPolicy;

impl SkipPolicy for AlwaysSkipPolicy {
    fn should_skip(&self, error: &BatchError, _skip_count: usize) -> Result<bool> {
        Ok(!error.is_fatal())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSkipPolicy;

impl SkipPolicy for NeverSkipPolicy {
    fn should_skip(&self, _error: &BatchError, _skip_count: usize) -> Result<bool> {
        Ok(false)
    }
}

/// Decides whether a failed operation may be attempted again
pub trait RetryPolicy: Send + Sync {
    /// Whether a context permits another attempt
    fn can_retry(&self, context: &RetryContext) -> bool;

    /// Total attempts permitted, first attempt included
    fn max_attempts(&self) -> u32;
}

/// Retries classified errors up to a fixed number of attempts
#[derive(Debug, Clone)]
pub struct SimpleRetryPolicy {
    max_attempts: u32,
    retryable: HashSet<ErrorKind>,
}

impl SimpleRetryPolicy {
    pub fn new(max_attempts: u32, retryable: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            max_attempts,
            retryable: retryable.into_iter().collect(),
        }
    }
}

impl RetryPolicy for SimpleRetryPolicy {
    fn can_retry(&self, context: &RetryContext) -> bool {
        match context.last_error() {
            None => true,
            Some(error) => {
                !error.is_fatal()
                    && self.retryable.contains(&error.kind())
                    && context.retry_count() < self.max_attempts
            }
        }
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Allows the first attempt only
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetryPolicy;

impl RetryPolicy for NeverRetryPolicy {
    fn can_retry(&self, context: &RetryContext) -> bool {
        context.last_error().is_none()
    }

    fn max_attempts(&self) -> u32 {
        1
    }
}

/// Delay between a failed attempt and the next one
pub trait BackOffPolicy: Send + Sync {
    /// Delay after the `retry_count`-th failure
    fn delay(&self, retry_count: u32) -> Duration;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackOffPolicy;

impl BackOffPolicy for NoBackOffPolicy {
    fn delay(&self, _retry_count: u32) -> Duration {
        Duration::ZERO
    }
}

/// Exponential back-off with an upper bound and optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackOffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Adds up to 10% random delay
    pub jitter: bool,
}

impl ExponentialBackOffPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl BackOffPolicy for ExponentialBackOffPolicy {
    fn delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1) as i32;
        let mut delay_ms = (self.initial_delay.as_millis() as f64
            * self.multiplier.max(1.0).powi(exponent)) as u64;

        if self.jitter {
            let jitter: f64 = rand::thread_rng().gen_range(0.0..0.1);
            delay_ms += (delay_ms as f64 * jitter) as u64;
        }

        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemKey;
    use test_case::test_case;

    fn write_error() -> BatchError {
        BatchError::Write("deadlock".to_string())
    }

    fn failed_context(failures: u32, error: BatchError) -> RetryContext {
        let mut context = RetryContext::new(ItemKey::from(1));
        for _ in 0..failures {
            context.register_error(error.clone());
        }
        context
    }

    #[test_case(0, true ; "first skip allowed")]
    #[test_case(1, true ; "below limit")]
    fn test_limit_checking_skips_below_limit(count: usize, expected: bool) {
        let policy = LimitCheckingSkipPolicy::new(2, [ErrorKind::Write]);
        assert_eq!(policy.should_skip(&write_error(), count).unwrap(), expected);
    }

    #[test]
    fn test_limit_checking_refuses_at_limit() {
        let policy = LimitCheckingSkipPolicy::new(2, [ErrorKind::Write]);
        let err = policy.should_skip(&write_error(), 2).unwrap_err();
        assert!(matches!(err, BatchError::SkipLimitExceeded { limit: 2, .. }));
    }

    #[test]
    fn test_limit_checking_ignores_unclassified_and_fatal() {
        let policy = LimitCheckingSkipPolicy::new(5, [ErrorKind::Write]);
        assert!(!policy
            .should_skip(&BatchError::Process("x".into()), 0)
            .unwrap());
        assert!(!policy
            .should_skip(&BatchError::Listener("x".into()), 0)
            .unwrap());
    }

    #[test]
    fn test_always_and_never_skip() {
        assert!(AlwaysSkipPolicy.should_skip(&write_error(), 1000).unwrap());
        assert!(!AlwaysSkipPolicy
            .should_skip(&BatchError::FatalCommit("x".into()), 0)
            .unwrap());
        assert!(!NeverSkipPolicy.should_skip(&write_error(), 0).unwrap());
    }

    #[test_case(0, true ; "fresh context")]
    #[test_case(1, true ; "one failure")]
    #[test_case(2, true ; "two failures")]
    #[test_case(3, false ; "exhausted")]
    fn test_simple_retry_policy(failures: u32, expected: bool) {
        let policy = SimpleRetryPolicy::new(3, [ErrorKind::Write]);
        let context = failed_context(failures, write_error());
        assert_eq!(policy.can_retry(&context), expected);
    }

    #[test]
    fn test_simple_retry_policy_rejects_unclassified() {
        let policy = SimpleRetryPolicy::new(3, [ErrorKind::Write]);
        let context = failed_context(1, BatchError::Process("bad".into()));
        assert!(!policy.can_retry(&context));
    }

    #[test]
    fn test_never_retry_policy() {
        assert!(NeverRetryPolicy.can_retry(&failed_context(0, write_error())));
        assert!(!NeverRetryPolicy.can_retry(&failed_context(1, write_error())));
        assert_eq!(NeverRetryPolicy.max_attempts(), 1);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = ExponentialBackOffPolicy::new(
            Duration::from_millis(100),
            Duration::from_millis(350),
            2.0,
        );
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(350));
    }

    #[test]
    fn test_exponential_backoff_jitter_stays_in_bounds() {
        let policy = ExponentialBackOffPolicy::new(
            Duration::from_millis(100),
            Duration::from_secs(10),
            2.0,
        )
        .with_jitter(true);

        for _ in 0..50 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(110));
        }
    }
}
