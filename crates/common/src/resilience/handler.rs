//! Composite resilience handler: circuit breaker around retry
//!
//! One logical call is one breaker sample. The retry loop runs inside the
//! admitted call and checks the breaker again before every retry, so a
//! circuit opened by concurrent callers stops this call's remaining
//! attempts with [`ResilienceError::CircuitOpen`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::circuit_breaker::{CircuitBreaker, Clock, PermitGuard, SystemClock};
use super::error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
use super::policy::{PolicyKind, PolicyPrimitive, TriggerPredicate};
use super::retry::{RetryDecision, RetryError, RetryExecutor, RetryPolicy};

struct GuardedBreaker<E, C: Clock> {
    breaker: CircuitBreaker<C>,
    trigger: TriggerPredicate<E>,
}

/// What one retry attempt produced when it did not succeed
enum Attempt<E> {
    Failed(E),
    Rejected(Option<Duration>),
}

impl<E: fmt::Display> fmt::Display for Attempt<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => e.fmt(f),
            Self::Rejected(_) => f.write_str("circuit opened between attempts"),
        }
    }
}

/// Retries what the trigger matches; never retries past an open circuit
struct TriggeredRetry<E> {
    trigger: TriggerPredicate<E>,
}

impl<E> RetryPolicy<Attempt<E>> for TriggeredRetry<E> {
    fn should_retry(&self, attempt: &Attempt<E>, _retry: u32) -> RetryDecision {
        match attempt {
            Attempt::Failed(e) if (self.trigger)(e) => RetryDecision::Retry,
            _ => RetryDecision::Stop,
        }
    }
}

enum CallFailure<E> {
    Exhausted { attempts: u32, error: E },
    Unhandled(E),
    Cancelled { attempts: u32 },
    Rejected(Option<Duration>),
}

/// Applies a breaker and a retry policy to async operations
///
/// Cheap to clone; clones share breaker state.
pub struct ResilienceHandler<E, C: Clock = SystemClock> {
    operation: Arc<str>,
    breaker: Option<Arc<GuardedBreaker<E, C>>>,
    retry: Option<Arc<RetryExecutor<TriggeredRetry<E>>>>,
}

impl<E, C: Clock> Clone for ResilienceHandler<E, C> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            breaker: self.breaker.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<E, C: Clock> fmt::Debug for ResilienceHandler<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceHandler")
            .field("operation", &self.operation)
            .field("breaker", &self.breaker.as_ref().map(|g| g.breaker.state()))
            .field("retry", &self.retry.as_ref().map(|r| r.config().max_retries))
            .finish()
    }
}

impl<E> ResilienceHandler<E, SystemClock>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Handler that runs operations unchanged
    pub fn passthrough(operation: impl Into<String>) -> Self {
        Self { operation: Arc::from(operation.into()), breaker: None, retry: None }
    }

    pub fn from_policies<I>(operation: impl Into<String>, policies: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = PolicyPrimitive<E>>,
    {
        Self::from_policies_with_clock(operation, policies, SystemClock)
    }
}

impl<E, C> ResilienceHandler<E, C>
where
    E: std::error::Error + Send + Sync + 'static,
    C: Clock,
{
    /// Build a handler from enabled policies, using `clock` for the breaker
    ///
    /// At most one policy of each kind may be enabled. The breaker always
    /// wraps the retry, whatever order the policies are listed in.
    pub fn from_policies_with_clock<I>(
        operation: impl Into<String>,
        policies: I,
        clock: C,
    ) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = PolicyPrimitive<E>>,
    {
        let operation: Arc<str> = Arc::from(operation.into());
        let mut clock = Some(clock);
        let mut breaker = None;
        let mut retry = None;

        for policy in policies.into_iter().filter(PolicyPrimitive::is_enabled) {
            match policy.into_parts() {
                (PolicyKind::CircuitBreaker(config), trigger) => {
                    let clock = clock.take().ok_or_else(|| {
                        ConfigError::invalid(format!(
                            "'{operation}' has more than one circuit breaker policy"
                        ))
                    })?;
                    let cb = CircuitBreaker::with_clock(config, clock)?.named(operation.as_ref());
                    breaker = Some(Arc::new(GuardedBreaker { breaker: cb, trigger }));
                }
                (PolicyKind::Retry(config), trigger) => {
                    if retry.is_some() {
                        return Err(ConfigError::invalid(format!(
                            "'{operation}' has more than one retry policy"
                        )));
                    }
                    config.validate()?;
                    let executor = RetryExecutor::new(config, TriggeredRetry { trigger })
                        .named(operation.as_ref());
                    retry = Some(Arc::new(executor));
                }
            }
        }

        debug!(
            operation = %operation,
            circuit_breaker = breaker.is_some(),
            retry = retry.is_some(),
            "Resilience handler configured"
        );
        Ok(Self { operation, breaker, retry })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// No enabled policy; operations run unchanged
    pub fn is_passthrough(&self) -> bool {
        self.breaker.is_none() && self.retry.is_none()
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker<C>> {
        self.breaker.as_deref().map(|g| &g.breaker)
    }

    /// Run `operation` under the configured policies
    pub async fn handle<F, Fut, T>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.handle_with_cancellation(operation, &CancellationToken::new()).await
    }

    /// Run `operation` under the configured policies, observing `cancel`
    ///
    /// Cancellation is checked before the call and between retries.
    pub async fn handle_with_cancellation<F, Fut, T>(
        &self,
        operation: F,
        cancel: &CancellationToken,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if cancel.is_cancelled() {
            return Err(ResilienceError::Cancelled {
                operation: self.operation.to_string(),
                attempts: 0,
            });
        }

        // Held across the call; dropping it on an abandoned or panicking call
        // hands the permit back to the breaker.
        let permit = match self.breaker.as_deref() {
            Some(guard) => match guard.breaker.acquire() {
                Ok(permit) => Some(permit),
                Err(rejected) => {
                    debug!(operation = %self.operation, "Call rejected by open circuit");
                    return Err(ResilienceError::CircuitOpen {
                        operation: self.operation.to_string(),
                        retry_after: rejected.retry_after,
                    });
                }
            },
            None => None,
        };

        let outcome = self.run(operation, cancel).await;

        if let (Some(guard), Some(permit)) = (self.breaker.as_deref(), permit) {
            settle(guard, permit, &outcome);
        }

        outcome.map_err(|failure| self.surface(failure))
    }

    async fn run<F, Fut, T>(
        &self,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> Result<T, CallFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(retry) = self.retry.as_deref() else {
            return operation().await.map_err(CallFailure::Unhandled);
        };

        let gate = self.circuit_breaker();
        let mut invocations: u32 = 0;
        let result = retry
            .execute_with_cancellation(
                || {
                    let rejected = if invocations > 0 {
                        gate.filter(|b| b.is_open()).map(CircuitBreaker::retry_after)
                    } else {
                        None
                    };
                    invocations += 1;
                    let attempt = if rejected.is_none() { Some(operation()) } else { None };
                    async move {
                        match (attempt, rejected) {
                            (Some(call), _) => call.await.map_err(Attempt::Failed),
                            (None, retry_after) => {
                                Err(Attempt::Rejected(retry_after.flatten()))
                            }
                        }
                    }
                },
                cancel,
            )
            .await;

        result.map_err(|err| match err {
            RetryError::AttemptsExhausted { attempts, last_error: Attempt::Failed(error) } => {
                CallFailure::Exhausted { attempts, error }
            }
            RetryError::NonRetryable { last_error: Attempt::Failed(error), .. } => {
                CallFailure::Unhandled(error)
            }
            RetryError::AttemptsExhausted { last_error: Attempt::Rejected(retry_after), .. }
            | RetryError::NonRetryable { last_error: Attempt::Rejected(retry_after), .. } => {
                CallFailure::Rejected(retry_after)
            }
            RetryError::Cancelled { attempts } => CallFailure::Cancelled { attempts },
        })
    }

    fn surface(&self, failure: CallFailure<E>) -> ResilienceError<E> {
        let operation = self.operation.to_string();
        match failure {
            CallFailure::Exhausted { attempts, error } => {
                ResilienceError::PolicyExhausted { operation, attempts, source: error }
            }
            CallFailure::Unhandled(error) => ResilienceError::Operation(error),
            CallFailure::Cancelled { attempts } => {
                ResilienceError::Cancelled { operation, attempts }
            }
            CallFailure::Rejected(retry_after) => {
                ResilienceError::CircuitOpen { operation, retry_after }
            }
        }
    }
}

fn settle<E, C: Clock, T>(
    guard: &GuardedBreaker<E, C>,
    permit: PermitGuard<'_, C>,
    outcome: &Result<T, CallFailure<E>>,
) {
    match outcome {
        Ok(_) => permit.success(),
        Err(CallFailure::Exhausted { error, .. } | CallFailure::Unhandled(error))
            if (guard.trigger)(error) =>
        {
            permit.failure();
        }
        Err(_) => permit.release(),
    }
}
