//! Generic retry executor with pluggable backoff and retry conditions
//!
//! `max_retries` counts retries, not invocations: an operation that keeps
//! failing with a retryable error is invoked `max_retries + 1` times. Waits
//! between attempts observe a [`CancellationToken`] so shutdown does not
//! have to sit out a long backoff.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{ConfigError, ConfigResult};

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error
    #[error("All retry attempts exhausted after {attempts} tries")]
    AttemptsExhausted { attempts: u32, last_error: E },

    /// The policy declined to retry the last error
    #[error("Operation failed with non-retryable error after {attempts} attempts")]
    NonRetryable { attempts: u32, last_error: E },

    /// Cancellation was observed before or between attempts
    #[error("Retry cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            Self::AttemptsExhausted { attempts, .. }
            | Self::NonRetryable { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::AttemptsExhausted { last_error, .. } | Self::NonRetryable { last_error, .. } => {
                Some(last_error)
            }
            Self::Cancelled { .. } => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Determine if the error should be retried and optionally provide a custom
    /// delay
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Retry the operation with the configured backoff delay
    Retry,
    /// Retry the operation with a custom delay
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Backoff strategy for calculating retry delays
///
/// `retry` is zero-based: the wait before the first retry is
/// `calculate_delay(0)`.
#[derive(Debug, Clone)]
#[allow(unpredictable_function_pointer_comparisons)]
#[derive(PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Linear backoff: initial_delay + (retry * increment), capped
    Linear { initial_delay: Duration, increment: Duration, max_delay: Duration },
    /// Exponential backoff: initial_delay * base^retry, capped
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
    /// Custom backoff function
    Custom(fn(u32) -> Duration),
}

impl BackoffStrategy {
    /// Calculate the delay before the given retry
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Linear { initial_delay, increment, max_delay } => {
                (*initial_delay + increment.saturating_mul(retry)).min(*max_delay)
            }
            BackoffStrategy::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let delay = initial_delay.as_millis() as f64 * base.powi(exponent);
                let delay_ms = delay.min(max_delay.as_millis() as f64) as u64;
                Duration::from_millis(delay_ms)
            }
            BackoffStrategy::Custom(f) => f(retry),
        }
    }
}

/// Jitter type for adding randomness to retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Full jitter: 0 to calculated_delay
    Full,
    /// Equal jitter: calculated_delay/2 to calculated_delay
    Equal,
}

impl Jitter {
    /// Apply jitter to the calculated delay
    pub fn apply(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(random_up_to(delay_ms)),
            Jitter::Equal => {
                let half = delay_ms / 2;
                Duration::from_millis(half + random_up_to(delay_ms - half))
            }
        }
    }
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(200),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::None,
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        match &self.backoff {
            BackoffStrategy::Exponential { base, .. } if !(*base >= 1.0) => Err(
                ConfigError::invalid(format!("exponential base must be at least 1, got {base}")),
            ),
            _ => Ok(()),
        }
    }

    /// Delay before the given zero-based retry, jitter applied
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.jitter.apply(self.backoff.calculate_delay(retry))
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn linear_backoff(
        mut self,
        initial_delay: Duration,
        increment: Duration,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Linear { initial_delay, increment, max_delay };
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn custom_backoff(mut self, f: fn(u32) -> Duration) -> Self {
        self.config.backoff = BackoffStrategy::Custom(f);
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
    operation: Arc<str>,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy, operation: Arc::from("operation") }
    }

    /// Logical operation name attached to retry log events
    pub fn named(mut self, operation: impl Into<String>) -> Self {
        self.operation = Arc::from(operation.into());
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_cancellation(operation, &CancellationToken::new()).await
    }

    /// Execute an operation with retry logic, stopping when `cancel` fires
    ///
    /// Cancellation is observed before each attempt and during backoff
    /// waits. An attempt already running is allowed to finish.
    pub async fn execute_with_cancellation<F, Fut, T, E>(
        &self,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(operation = %self.operation, attempts, "Retry cancelled before attempt");
                return Err(RetryError::Cancelled { attempts });
            }

            attempts += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(
                            operation = %self.operation,
                            attempts,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let retry = attempts - 1;
            let delay = match self.policy.should_retry(&error, retry) {
                RetryDecision::Stop => {
                    debug!(
                        operation = %self.operation,
                        attempts,
                        error = %error,
                        "Retry policy declined error"
                    );
                    return Err(RetryError::NonRetryable { attempts, last_error: error });
                }
                _ if retry >= self.config.max_retries => {
                    warn!(
                        operation = %self.operation,
                        attempts,
                        max_retries = self.config.max_retries,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %error,
                        "All retry attempts exhausted"
                    );
                    return Err(RetryError::AttemptsExhausted { attempts, last_error: error });
                }
                RetryDecision::Retry => self.config.delay_for(retry),
                RetryDecision::RetryAfter(delay) => delay,
            };

            warn!(
                operation = %self.operation,
                attempt = attempts,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %error,
                "Operation failed, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(operation = %self.operation, attempts, "Retry cancelled during backoff");
                    return Err(RetryError::Cancelled { attempts });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::{ErrorClassification, FailureClass};
    use crate::testing::ClassifiedError;

    struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _retry: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Retries transient failures, honouring their retry hint
    struct TransientOnly;

    impl<E: ErrorClassification> RetryPolicy<E> for TransientOnly {
        fn should_retry(&self, error: &E, _retry: u32) -> RetryDecision {
            match (error.classify(), error.retry_after()) {
                (FailureClass::Transient, Some(delay)) => RetryDecision::RetryAfter(delay),
                (FailureClass::Transient, None) => RetryDecision::Retry,
                _ => RetryDecision::Stop,
            }
        }
    }

    struct RetryWhen<F>(F);

    impl<E, F: Fn(&E, u32) -> bool> RetryPolicy<E> for RetryWhen<F> {
        fn should_retry(&self, error: &E, retry: u32) -> RetryDecision {
            if (self.0)(error, retry) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_retries(max_retries)
            .fixed_backoff(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    #[test]
    fn test_backoff_strategy_linear_is_capped() {
        let strategy = BackoffStrategy::Linear {
            initial_delay: Duration::from_millis(100),
            increment: Duration::from_millis(50),
            max_delay: Duration::from_millis(250),
        };
        assert_eq!(strategy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(strategy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(strategy.calculate_delay(10), Duration::from_millis(250));
    }

    #[test]
    fn test_backoff_strategy_exponential() {
        let strategy = BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(200),
            base: 2.0,
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(strategy.calculate_delay(0), Duration::from_millis(200));
        assert_eq!(strategy.calculate_delay(1), Duration::from_millis(400));
        assert_eq!(strategy.calculate_delay(2), Duration::from_millis(800));
        assert_eq!(strategy.calculate_delay(3), Duration::from_secs(1));
        assert_eq!(strategy.calculate_delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_strategy_custom() {
        fn squared(retry: u32) -> Duration {
            Duration::from_millis(u64::from(retry * retry))
        }
        assert_eq!(BackoffStrategy::Custom(squared).calculate_delay(3), Duration::from_millis(9));
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_millis(100);
        for _ in 0..50 {
            assert!(Jitter::Full.apply(delay) <= delay);
            let equal = Jitter::Equal.apply(delay);
            assert!(equal >= Duration::from_millis(50) && equal <= delay);
        }
        assert_eq!(Jitter::None.apply(delay), delay);
        assert_eq!(Jitter::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_config_rejects_shrinking_exponential_base() {
        let result = RetryConfig::builder()
            .exponential_backoff(Duration::from_millis(10), 0.5, Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invokes_retries_plus_one_times() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast(3), AlwaysRetry).named("orders");

        let result: RetryResult<(), _> = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ClassifiedError::transient("timed out"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(result, Err(RetryError::AttemptsExhausted { attempts: 4, .. })));
    }

    #[tokio::test]
    async fn test_zero_retries_invokes_once() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast(0), AlwaysRetry);

        let result: RetryResult<(), _> = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ClassifiedError::transient("timed out"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().attempts(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast(3), TransientOnly);

        let result = executor
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ClassifiedError::transient("reset"))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast(3), TransientOnly);

        let result: RetryResult<(), _> = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ClassifiedError::terminal("missing id"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(RetryError::NonRetryable { attempts: 1, ref last_error })
                if last_error.class == FailureClass::Terminal
        ));
    }

    #[test]
    fn test_retry_after_hint_overrides_backoff() {
        let policy = TransientOnly;
        let err =
            ClassifiedError::transient("throttled").with_retry_after(Duration::from_millis(7));
        assert_eq!(
            policy.should_retry(&err, 0),
            RetryDecision::RetryAfter(Duration::from_millis(7))
        );
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff_stops_retrying() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::builder()
            .max_retries(5)
            .fixed_backoff(Duration::from_secs(30))
            .build()
            .unwrap();
        let executor = RetryExecutor::new(config, AlwaysRetry);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result: RetryResult<(), _> = executor
            .execute_with_cancellation(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ClassifiedError::transient("timed out"))
                },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_invokes() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast(3), AlwaysRetry);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: RetryResult<(), ClassifiedError> = executor
            .execute_with_cancellation(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0 })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_predicate_policy_receives_attempt_index() {
        let seen = AtomicU32::new(0);
        let executor = RetryExecutor::new(
            fast(5),
            RetryWhen(|_: &ClassifiedError, retry: u32| {
                seen.store(retry, Ordering::SeqCst);
                retry < 1
            }),
        );

        let result: RetryResult<(), _> = executor
            .execute(|| async { Err(ClassifiedError::transient("timed out")) })
            .await;

        assert_eq!(result.unwrap_err().attempts(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
