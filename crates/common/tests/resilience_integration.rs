//! Integration tests for the resilience handler
//!
//! Exercises the breaker and retry policies together through the public API
//! with a mock clock, covering the threshold, exhaustion, bypass and
//! cancellation scenarios end to end.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conduit_common::error::{ErrorClassification, ErrorSeverity};
use conduit_common::resilience::{
    CircuitBreakerConfig, CircuitState, MockClock, PolicyPrimitive, ResilienceError,
    ResilienceHandler, RetryConfig,
};
use tokio_util::sync::CancellationToken;

/// Custom error type for testing
#[derive(Debug, Clone, PartialEq)]
struct TestError {
    message: &'static str,
    transient: bool,
}

impl TestError {
    fn transient(message: &'static str) -> Self {
        Self { message, transient: true }
    }

    fn terminal(message: &'static str) -> Self {
        Self { message, transient: false }
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestError {}

impl ErrorClassification for TestError {
    fn is_retryable(&self) -> bool {
        self.transient
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

fn breaker_policy() -> PolicyPrimitive<TestError> {
    PolicyPrimitive::circuit_breaker(CircuitBreakerConfig {
        failure_threshold: 0.5,
        sampling_duration: Duration::from_secs(10),
        minimum_throughput: 4,
        break_duration: Duration::from_secs(30),
    })
}

fn retry_policy(max_retries: u32, delay: Duration) -> PolicyPrimitive<TestError> {
    PolicyPrimitive::retry(
        RetryConfig::builder().max_retries(max_retries).fixed_backoff(delay).build().unwrap(),
    )
}

async fn call(
    handler: &ResilienceHandler<TestError, MockClock>,
    calls: &AtomicU32,
    outcome: Result<(), TestError>,
) -> Result<(), ResilienceError<TestError>> {
    handler
        .handle(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            let outcome = outcome.clone();
            async move { outcome }
        })
        .await
}

/// Two failures in four calls inside the sampling window trip the breaker;
/// the next call fails fast without reaching the operation.
#[tokio::test]
async fn test_breaker_opens_at_failure_ratio_and_fails_fast() {
    let clock = MockClock::new();
    let handler =
        ResilienceHandler::from_policies_with_clock("orders", vec![breaker_policy()], clock)
            .unwrap();
    let calls = AtomicU32::new(0);

    call(&handler, &calls, Ok(())).await.unwrap();
    call(&handler, &calls, Ok(())).await.unwrap();
    let _ = call(&handler, &calls, Err(TestError::transient("reset"))).await;
    let fourth = call(&handler, &calls, Err(TestError::transient("reset"))).await;
    assert!(matches!(fourth, Err(ResilienceError::Operation(_))));

    let rejected = call(&handler, &calls, Ok(())).await;
    assert!(matches!(
        rejected,
        Err(ResilienceError::CircuitOpen { ref operation, retry_after: Some(_) })
            if operation == "orders"
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

/// After the break one trial call is admitted and its success closes the
/// circuit.
#[tokio::test]
async fn test_breaker_recovers_through_trial_call() {
    let clock = MockClock::new();
    let handler = ResilienceHandler::from_policies_with_clock(
        "orders",
        vec![breaker_policy()],
        clock.clone(),
    )
    .unwrap();
    let calls = AtomicU32::new(0);

    for _ in 0..4 {
        let _ = call(&handler, &calls, Err(TestError::transient("down"))).await;
    }
    let breaker = handler.circuit_breaker().unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_secs(30));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    call(&handler, &calls, Ok(())).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

/// Three retries mean four invocations before the original error surfaces
/// as an exhausted policy.
#[tokio::test]
async fn test_retry_exhaustion_reports_original_error() {
    let handler =
        ResilienceHandler::from_policies("orders", vec![retry_policy(3, Duration::from_millis(1))])
            .unwrap();
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = handler
        .handle(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::transient("timeout")) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    match result {
        Err(ResilienceError::PolicyExhausted { operation, attempts, source }) => {
            assert_eq!(operation, "orders");
            assert_eq!(attempts, 4);
            assert_eq!(source, TestError::transient("timeout"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

/// Terminal failures are neither retried nor counted by the breaker.
#[tokio::test]
async fn test_non_matching_failure_propagates_unmodified() {
    let handler = ResilienceHandler::from_policies_with_clock(
        "orders",
        vec![retry_policy(3, Duration::from_millis(1)), breaker_policy()],
        MockClock::new(),
    )
    .unwrap();
    let calls = AtomicU32::new(0);

    for _ in 0..6 {
        let result = call(&handler, &calls, Err(TestError::terminal("bad request"))).await;
        assert_eq!(
            result.unwrap_err().into_operation_error(),
            Some(TestError::terminal("bad request"))
        );
    }

    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let metrics = handler.circuit_breaker().unwrap().metrics();
    assert_eq!(metrics.state, CircuitState::Closed);
    assert_eq!(metrics.window.throughput(), 0);
}

/// A transient error followed by success inside one logical call counts as a
/// single successful breaker sample.
#[tokio::test]
async fn test_retry_recovery_is_one_successful_sample() {
    let handler = ResilienceHandler::from_policies_with_clock(
        "orders",
        vec![breaker_policy(), retry_policy(2, Duration::from_millis(1))],
        MockClock::new(),
    )
    .unwrap();
    let calls = AtomicU32::new(0);

    let result = handler
        .handle(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(TestError::transient("blip"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "ok");
    let window = handler.circuit_breaker().unwrap().metrics().window;
    assert_eq!((window.successes, window.failures), (1, 0));
}

/// Cancelling during a backoff wait aborts the remaining attempts.
#[tokio::test]
async fn test_cancellation_mid_retry_aborts() {
    let handler =
        ResilienceHandler::from_policies("orders", vec![retry_policy(5, Duration::from_secs(60))])
            .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let counter = Arc::clone(&calls);
    let result: Result<(), _> = tokio::time::timeout(
        Duration::from_secs(5),
        handler.handle_with_cancellation(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::transient("timeout")) }
            },
            &cancel,
        ),
    )
    .await
    .expect("cancellation should end the wait");

    assert!(matches!(result, Err(ResilienceError::Cancelled { attempts: 1, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Clones of a handler trip the same circuit.
#[tokio::test(flavor = "multi_thread")]
async fn test_cloned_handlers_share_breaker() {
    let handler = ResilienceHandler::from_policies_with_clock(
        "orders",
        vec![breaker_policy()],
        MockClock::new(),
    )
    .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            let _ = handler.handle(|| async { Err::<(), _>(TestError::transient("down")) }).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let result = handler.handle(|| async { Ok::<_, TestError>(()) }).await;
    assert!(result.unwrap_err().is_circuit_open());
}
