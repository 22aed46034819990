//! Translation of endpoint resilience settings into policies

use conduit_common::error::ErrorClassification;
use conduit_common::resilience::{
    CircuitBreakerConfig, Clock, ConfigError, Jitter, PolicyPrimitive, ResilienceHandler,
    ResiliencePolicySet, RetryConfig, SystemClock,
};
use conduit_domain::{BackoffKind, ConduitError, JitterKind, ResilienceSettings};

/// Builds policy sets and handlers from [`ResilienceSettings`]
///
/// Disabled settings still produce a primitive, marked disabled, so the
/// resulting set mirrors the configuration one to one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResiliencePolicyFactory;

impl ResiliencePolicyFactory {
    /// Circuit breaker and retry primitives, triggered by transient failures
    pub fn policies<E>(
        settings: &ResilienceSettings,
    ) -> Result<ResiliencePolicySet<E>, ConduitError>
    where
        E: ErrorClassification + 'static,
    {
        settings.validate()?;

        let cb = &settings.circuit_breaker;
        let breaker = CircuitBreakerConfig::builder()
            .failure_threshold(cb.failure_threshold)
            .sampling_duration(cb.sampling_duration())
            .minimum_throughput(cb.minimum_throughput)
            .break_duration(cb.break_duration())
            .build()
            .map_err(config_error)?;

        let retry = &settings.retry;
        let wait = retry.wait_duration();
        let jitter = match retry.jitter {
            JitterKind::None => Jitter::None,
            JitterKind::Full => Jitter::Full,
            JitterKind::Equal => Jitter::Equal,
        };
        let builder = RetryConfig::builder().max_retries(retry.attempts).jitter(jitter);
        let builder = match retry.backoff {
            BackoffKind::Fixed => builder.fixed_backoff(wait),
            BackoffKind::Linear => builder.linear_backoff(wait, wait, retry.max_wait()),
            BackoffKind::Exponential => builder.exponential_backoff(wait, 2.0, retry.max_wait()),
        };
        let retry_config = builder.build().map_err(config_error)?;

        Ok(vec![
            PolicyPrimitive::circuit_breaker(breaker).enabled(cb.enabled),
            PolicyPrimitive::retry(retry_config).enabled(retry.enabled),
        ])
    }

    /// Handler for `endpoint` using the system clock
    pub fn handler<E>(
        endpoint: &str,
        settings: &ResilienceSettings,
    ) -> Result<ResilienceHandler<E>, ConduitError>
    where
        E: ErrorClassification + std::error::Error + Send + Sync + 'static,
    {
        Self::handler_with_clock(endpoint, settings, SystemClock)
    }

    pub fn handler_with_clock<E, C>(
        endpoint: &str,
        settings: &ResilienceSettings,
        clock: C,
    ) -> Result<ResilienceHandler<E, C>, ConduitError>
    where
        E: ErrorClassification + std::error::Error + Send + Sync + 'static,
        C: Clock,
    {
        let policies = Self::policies(settings)?;
        ResilienceHandler::from_policies_with_clock(endpoint, policies, clock).map_err(config_error)
    }
}

fn config_error(err: ConfigError) -> ConduitError {
    ConduitError::Config(err.to_string())
}
