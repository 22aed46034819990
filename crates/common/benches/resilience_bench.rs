//! Resilience benchmarks
//!
//! Covers breaker admission and outcome recording, the composite handler's
//! hot paths, and backoff calculations.
//!
//! Run with: `cargo bench --bench resilience_bench -p conduit-common
//! --features test-utils`

use std::time::Duration;

use conduit_common::resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, Jitter, MockClock, PolicyPrimitive,
    ResilienceHandler, RetryConfig,
};
use conduit_common::testing::ClassifiedError;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

fn bench_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::builder()
        .failure_threshold(0.5)
        .sampling_duration(Duration::from_secs(10))
        .minimum_throughput(20)
        .break_duration(Duration::from_secs(30))
        .build()
        .expect("valid circuit breaker config for benchmarks")
}

fn bench_circuit_breaker(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");

    group.bench_function("acquire_and_record_success", |b| {
        let breaker = CircuitBreaker::new(bench_config()).expect("breaker should build");
        b.iter(|| {
            let permit = breaker.try_acquire().expect("closed breaker admits calls");
            breaker.record_success(black_box(permit));
        });
    });

    group.bench_function("open_rejection", |b| {
        let breaker = CircuitBreaker::new(bench_config()).expect("breaker should build");
        breaker.isolate();
        b.iter(|| black_box(breaker.try_acquire()));
    });

    group.bench_function("trip_and_recover", |b| {
        let clock = MockClock::new();
        let breaker = CircuitBreaker::with_clock(bench_config(), clock.clone())
            .expect("breaker should build");
        b.iter(|| {
            for _ in 0..20 {
                if let Ok(permit) = breaker.try_acquire() {
                    breaker.record_failure(permit);
                }
            }
            clock.advance(Duration::from_secs(30));
            if let Ok(trial) = breaker.try_acquire() {
                breaker.record_success(trial);
            }
            black_box(breaker.state());
        });
    });

    group.finish();
}

fn bench_handler(c: &mut Criterion) {
    let mut group = c.benchmark_group("resilience_handler");
    let runtime = build_runtime();

    let retry = RetryConfig::builder()
        .max_retries(3)
        .fixed_backoff(Duration::ZERO)
        .build()
        .expect("retry config should build");

    group.bench_function("passthrough_success", |b| {
        let handler = ResilienceHandler::<ClassifiedError>::passthrough("bench");
        b.to_async(&runtime).iter(|| async {
            black_box(handler.handle(|| async { Ok::<_, ClassifiedError>(1u32) }).await)
        });
    });

    group.bench_function("breaker_and_retry_success", |b| {
        let handler = ResilienceHandler::from_policies(
            "bench",
            vec![
                PolicyPrimitive::circuit_breaker(bench_config()),
                PolicyPrimitive::retry(retry.clone()),
            ],
        )
        .expect("handler should build");
        b.to_async(&runtime).iter(|| async {
            black_box(handler.handle(|| async { Ok::<_, ClassifiedError>(1u32) }).await)
        });
    });

    group.bench_function("retry_exhaustion", |b| {
        let handler =
            ResilienceHandler::from_policies("bench", vec![PolicyPrimitive::retry(retry.clone())])
                .expect("handler should build");
        b.to_async(&runtime).iter(|| async {
            let result: Result<(), _> = handler
                .handle(|| async { Err(ClassifiedError::transient("unavailable")) })
                .await;
            black_box(result)
        });
    });

    group.finish();
}

fn bench_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_backoff");
    let retries = [0u32, 1, 5, 10];

    let strategies = [
        ("fixed", BackoffStrategy::Fixed(Duration::from_millis(1))),
        (
            "linear",
            BackoffStrategy::Linear {
                initial_delay: Duration::from_millis(1),
                increment: Duration::from_millis(5),
                max_delay: Duration::from_secs(1),
            },
        ),
        (
            "exponential",
            BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(1),
                base: 2.0,
                max_delay: Duration::from_secs(1),
            },
        ),
    ];

    for (name, strategy) in strategies {
        group.bench_with_input(BenchmarkId::new("calculate_delay", name), &strategy, |b, s| {
            b.iter(|| {
                for retry in retries {
                    black_box(s.calculate_delay(retry));
                }
            });
        });
    }

    for (name, jitter) in [("full", Jitter::Full), ("equal", Jitter::Equal)] {
        group.bench_with_input(BenchmarkId::new("jitter", name), &jitter, |b, jitter| {
            b.iter(|| black_box(jitter.apply(Duration::from_millis(250))));
        });
    }

    group.finish();
}

criterion_group!(resilience, bench_circuit_breaker, bench_handler, bench_backoff);
criterion_main!(resilience);
