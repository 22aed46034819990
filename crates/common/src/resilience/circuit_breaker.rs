//! Failure-ratio circuit breaker over a rolling sampling window
//!
//! The breaker counts successes and failures in a sliding window made of
//! fixed-width buckets. Once the window holds at least
//! `minimum_throughput` outcomes and the failure ratio reaches
//! `failure_threshold`, the circuit opens for `break_duration`. After the
//! break a single trial call is admitted; its outcome closes or re-opens
//! the circuit.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// Breakers use real system time in production and controlled mock time in
/// tests, so window expiry and break durations can be exercised without
/// sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a test can hand one clone to a
/// breaker and advance the other.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Break elapsed, a single trial call decides the next state
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure ratio in `(0, 1]` at which the circuit opens
    pub failure_threshold: f64,
    /// Length of the rolling window outcomes are counted in
    pub sampling_duration: Duration,
    /// Outcomes the window must hold before the ratio is considered
    pub minimum_throughput: u32,
    /// How long the circuit stays open before admitting a trial call
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            sampling_duration: Duration::from_secs(30),
            minimum_throughput: 10,
            break_duration: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return Err(ConfigError::invalid(format!(
                "failure_threshold must be in (0, 1], got {}",
                self.failure_threshold
            )));
        }

        if self.sampling_duration.is_zero() {
            return Err(ConfigError::invalid("sampling_duration must be greater than 0"));
        }

        if self.minimum_throughput == 0 {
            return Err(ConfigError::invalid("minimum_throughput must be greater than 0"));
        }

        if self.break_duration.is_zero() {
            return Err(ConfigError::invalid("break_duration must be greater than 0"));
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: f64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn sampling_duration(mut self, duration: Duration) -> Self {
        self.config.sampling_duration = duration;
        self
    }

    pub fn minimum_throughput(mut self, throughput: u32) -> Self {
        self.config.minimum_throughput = throughput;
        self
    }

    pub fn break_duration(mut self, duration: Duration) -> Self {
        self.config.break_duration = duration;
        self
    }

    /// Set a custom clock and build a breaker directly (useful for testing)
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock { config: self.config, clock, name: None }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder with custom clock that builds a CircuitBreaker directly
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
    name: Option<String>,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        let breaker = CircuitBreaker::with_clock(self.config, self.clock)?;
        Ok(match self.name {
            Some(name) => breaker.named(name),
            None => breaker,
        })
    }
}

//==============================================================================
// Rolling health window
//==============================================================================

const WINDOW_BUCKETS: u32 = 10;

/// Outcome counts currently inside the sampling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub successes: u32,
    pub failures: u32,
}

impl HealthSnapshot {
    pub fn throughput(&self) -> u32 {
        self.successes.saturating_add(self.failures)
    }

    pub fn failure_ratio(&self) -> f64 {
        match self.throughput() {
            0 => 0.0,
            total => f64::from(self.failures) / f64::from(total),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HealthBucket {
    started: Instant,
    counts: HealthSnapshot,
}

#[derive(Debug)]
struct HealthWindow {
    sampling: Duration,
    bucket_len: Duration,
    buckets: VecDeque<HealthBucket>,
}

impl HealthWindow {
    fn new(sampling: Duration) -> Self {
        let bucket_len = (sampling / WINDOW_BUCKETS).max(Duration::from_millis(1));
        Self { sampling, bucket_len, buckets: VecDeque::with_capacity(WINDOW_BUCKETS as usize + 1) }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.saturating_duration_since(front.started) >= self.sampling {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn record(&mut self, now: Instant, success: bool) {
        self.prune(now);

        let needs_bucket = self
            .buckets
            .back()
            .map_or(true, |b| now.saturating_duration_since(b.started) >= self.bucket_len);
        if needs_bucket {
            self.buckets
                .push_back(HealthBucket { started: now, counts: HealthSnapshot::default() });
        }

        if let Some(bucket) = self.buckets.back_mut() {
            if success {
                bucket.counts.successes = bucket.counts.successes.saturating_add(1);
            } else {
                bucket.counts.failures = bucket.counts.failures.saturating_add(1);
            }
        }
    }

    fn snapshot(&mut self, now: Instant) -> HealthSnapshot {
        self.prune(now);
        self.buckets.iter().fold(HealthSnapshot::default(), |acc, b| HealthSnapshot {
            successes: acc.successes.saturating_add(b.counts.successes),
            failures: acc.failures.saturating_add(b.counts.failures),
        })
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

//==============================================================================
// Breaker
//==============================================================================

/// Admission granted by [`CircuitBreaker::try_acquire`]
///
/// Hand it back through exactly one of `record_success`, `record_failure`
/// or `release` once the call has finished.
#[must_use = "a permit must be returned through record_success, record_failure or release"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPermit {
    /// Admitted while the circuit was closed
    Normal,
    /// The single trial call admitted after a break
    Trial,
}

/// Why a call was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    /// Time left in the current break, when known
    pub retry_after: Option<Duration>,
}

/// A [`CallPermit`] that goes back to its breaker when dropped unsettled
///
/// Returned by [`CircuitBreaker::acquire`]. A call that is abandoned, by a
/// timeout, an aborted task or a panic, releases its permit instead of
/// holding the half-open trial slot forever.
#[must_use = "dropping the guard releases the permit without recording an outcome"]
pub struct PermitGuard<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    permit: Option<CallPermit>,
}

impl<C: Clock> PermitGuard<'_, C> {
    pub fn permit(&self) -> Option<CallPermit> {
        self.permit
    }

    pub fn success(mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.record_success(permit);
        }
    }

    pub fn failure(mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.record_failure(permit);
        }
    }

    pub fn release(mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.release(permit);
        }
    }
}

impl<C: Clock> Drop for PermitGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            debug!(breaker = %self.breaker.name, ?permit, "Releasing abandoned call permit");
            self.breaker.release(permit);
        }
    }
}

impl<C: Clock> fmt::Debug for PermitGuard<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermitGuard")
            .field("breaker", &self.breaker.name)
            .field("permit", &self.permit)
            .finish()
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub window: HealthSnapshot,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub last_opened: Option<Instant>,
    pub state_change_time: Instant,
    pub isolated: bool,
}

#[derive(Debug)]
struct BreakerState {
    circuit: CircuitState,
    window: HealthWindow,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    isolated: bool,
    changed_at: Instant,
}

#[derive(Debug, Default)]
struct BreakerCounters {
    total_calls: AtomicU64,
    rejected_calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Rolling-window failure-ratio circuit breaker
///
/// Clones share state; hand clones to every caller that should trip the
/// same circuit.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
    counters: Arc<BreakerCounters>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        let now = clock.now();
        Ok(Self {
            name: Arc::from("circuit_breaker"),
            state: Arc::new(Mutex::new(BreakerState {
                circuit: CircuitState::Closed,
                window: HealthWindow::new(config.sampling_duration),
                opened_at: None,
                trial_in_flight: false,
                isolated: false,
                changed_at: now,
            })),
            config,
            counters: Arc::new(BreakerCounters::default()),
            clock: Arc::new(clock),
        })
    }

    /// Name used in log events and rejection errors
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask to run one call
    ///
    /// An expired break moves the circuit to half-open and hands the
    /// caller the trial permit. While that trial is in flight every other
    /// call is rejected.
    pub fn try_acquire(&self) -> Result<CallPermit, Rejected> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.isolated {
            self.counters.rejected_calls.fetch_add(1, Ordering::Relaxed);
            return Err(Rejected { retry_after: None });
        }

        let circuit = state.circuit;
        let admitted = match circuit {
            CircuitState::Closed => Ok(CallPermit::Normal),
            CircuitState::Open => {
                let opened_at = state.opened_at.unwrap_or(state.changed_at);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= self.config.break_duration {
                    self.transition(&mut state, CircuitState::HalfOpen, now);
                    state.trial_in_flight = true;
                    Ok(CallPermit::Trial)
                } else {
                    Err(Rejected { retry_after: Some(self.config.break_duration - elapsed) })
                }
            }
            CircuitState::HalfOpen if state.trial_in_flight => Err(Rejected { retry_after: None }),
            CircuitState::HalfOpen => {
                state.trial_in_flight = true;
                Ok(CallPermit::Trial)
            }
        };

        match admitted {
            Ok(_) => self.counters.total_calls.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.counters.rejected_calls.fetch_add(1, Ordering::Relaxed),
        };
        admitted
    }

    /// [`try_acquire`](Self::try_acquire), with the permit held by a guard
    pub fn acquire(&self) -> Result<PermitGuard<'_, C>, Rejected> {
        self.try_acquire().map(|permit| PermitGuard { breaker: self, permit: Some(permit) })
    }

    /// Record a successful call
    pub fn record_success(&self, permit: CallPermit) {
        self.counters.successes.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut state = self.state.lock();

        match (permit, state.circuit) {
            (CallPermit::Trial, CircuitState::HalfOpen) => {
                state.trial_in_flight = false;
                state.window.clear();
                self.transition(&mut state, CircuitState::Closed, now);
            }
            (CallPermit::Normal, CircuitState::Closed) => {
                state.window.record(now, true);
                self.evaluate(&mut state, now);
            }
            // Outcomes from calls admitted before the circuit changed state
            _ => {}
        }
    }

    /// Record a failure the breaker handles
    pub fn record_failure(&self, permit: CallPermit) {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut state = self.state.lock();

        match (permit, state.circuit) {
            (CallPermit::Trial, CircuitState::HalfOpen) => {
                state.trial_in_flight = false;
                warn!(breaker = %self.name, "Trial call failed, re-opening circuit");
                self.open(&mut state, now);
            }
            (CallPermit::Normal, CircuitState::Closed) => {
                state.window.record(now, false);
                self.evaluate(&mut state, now);
            }
            _ => {}
        }
    }

    /// Return a permit without recording an outcome
    ///
    /// Used when a call ends with an error the breaker does not handle, or
    /// is abandoned. A released trial lets the next caller try instead.
    pub fn release(&self, permit: CallPermit) {
        if permit == CallPermit::Trial {
            let mut state = self.state.lock();
            if state.circuit == CircuitState::HalfOpen {
                state.trial_in_flight = false;
            }
        }
    }

    /// Current state as callers would observe it
    ///
    /// An open circuit whose break has elapsed reports `HalfOpen` even
    /// before the next call performs the transition.
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let state = self.state.lock();
        match state.circuit {
            CircuitState::Open if !state.isolated => {
                let opened_at = state.opened_at.unwrap_or(state.changed_at);
                if now.saturating_duration_since(opened_at) >= self.config.break_duration {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            other => other,
        }
    }

    /// Whether a new call would be rejected right now
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Time left in the current break, `None` unless open on a timer
    pub fn retry_after(&self) -> Option<Duration> {
        let now = self.clock.now();
        let state = self.state.lock();
        if state.circuit != CircuitState::Open || state.isolated {
            return None;
        }
        let opened_at = state.opened_at.unwrap_or(state.changed_at);
        self.config.break_duration.checked_sub(now.saturating_duration_since(opened_at))
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = self.clock.now();
        let circuit = self.state();
        let mut state = self.state.lock();
        CircuitBreakerMetrics {
            state: circuit,
            window: state.window.snapshot(now),
            total_calls: self.counters.total_calls.load(Ordering::Relaxed),
            rejected_calls: self.counters.rejected_calls.load(Ordering::Relaxed),
            total_successes: self.counters.successes.load(Ordering::Relaxed),
            total_failures: self.counters.failures.load(Ordering::Relaxed),
            last_opened: state.opened_at,
            state_change_time: state.changed_at,
            isolated: state.isolated,
        }
    }

    /// Hold the circuit open until [`CircuitBreaker::reset`]
    pub fn isolate(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.isolated = true;
        state.trial_in_flight = false;
        state.opened_at = Some(now);
        self.transition(&mut state, CircuitState::Open, now);
        warn!(breaker = %self.name, "Circuit breaker isolated");
    }

    /// Close the circuit and forget the window
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.isolated = false;
        state.trial_in_flight = false;
        state.opened_at = None;
        state.window.clear();
        self.transition(&mut state, CircuitState::Closed, now);
        info!(breaker = %self.name, "Circuit breaker manually reset to closed state");
    }

    fn evaluate(&self, state: &mut BreakerState, now: Instant) {
        let health = state.window.snapshot(now);
        if health.throughput() >= self.config.minimum_throughput
            && health.failure_ratio() >= self.config.failure_threshold
        {
            warn!(
                breaker = %self.name,
                failures = health.failures,
                throughput = health.throughput(),
                failure_ratio = health.failure_ratio(),
                "Failure ratio reached threshold"
            );
            self.open(state, now);
        }
    }

    fn open(&self, state: &mut BreakerState, now: Instant) {
        state.opened_at = Some(now);
        state.window.clear();
        self.transition(state, CircuitState::Open, now);
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = state.circuit;
        if from == to {
            return;
        }
        let held_ms = now.saturating_duration_since(state.changed_at).as_millis() as u64;
        state.circuit = to;
        state.changed_at = now;

        match to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                %from,
                %to,
                break_ms = self.config.break_duration.as_millis() as u64,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(
                breaker = %self.name,
                %from,
                %to,
                open_for_ms = held_ms,
                "Circuit breaker half-open, admitting trial call"
            ),
            CircuitState::Closed => info!(
                breaker = %self.name,
                %from,
                %to,
                held_ms,
                "Circuit breaker closed"
            ),
        }
    }
}
