//! Configuration structures
//!
//! These types are read-only from the pipeline's and the resilience
//! handler's point of view. Loading them from files and the environment is
//! the job of `conduit-infra`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BREAK_DURATION_SECS, DEFAULT_CONSUMER_BINDING, DEFAULT_CULTURE_HEADER,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_LOG_LEVEL, DEFAULT_MAX_CONCURRENT_CALLS,
    DEFAULT_MINIMUM_THROUGHPUT, DEFAULT_RESILIENCE_ENDPOINT, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_MAX_WAIT_MS, DEFAULT_RETRY_WAIT_MS, DEFAULT_SAMPLING_DURATION_SECS,
    DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
use crate::impl_domain_enum_conversions;
use crate::types::{ProcessingErrorAction, ScopedKey};
use crate::{ConduitError, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    /// Resilience settings keyed by logical endpoint name.
    pub resilience: BTreeMap<String, ResilienceSettings>,
    /// Consumer settings keyed by binding (topic/queue) name.
    pub consumers: BTreeMap<String, ConsumerSettings>,
    pub logging: LoggingConfig,
}

impl Config {
    /// Settings for `endpoint`, falling back to the `"default"` entry and
    /// then to [`ResilienceSettings::default`] (no policies).
    pub fn resilience_for(&self, endpoint: &str) -> ResilienceSettings {
        self.resilience
            .get(endpoint)
            .or_else(|| self.resilience.get(DEFAULT_RESILIENCE_ENDPOINT))
            .cloned()
            .unwrap_or_default()
    }

    /// Settings for `binding`, falling back to the `"default"` entry.
    pub fn consumer_for(&self, binding: &str) -> ConsumerSettings {
        self.consumers
            .get(binding)
            .or_else(|| self.consumers.get(DEFAULT_CONSUMER_BINDING))
            .cloned()
            .unwrap_or_default()
    }

    /// Validate every section, reporting the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        for (name, settings) in &self.resilience {
            settings
                .validate()
                .map_err(|e| ConduitError::Config(format!("resilience.{name}: {e}")))?;
        }
        for (name, settings) in &self.consumers {
            settings
                .validate()
                .map_err(|e| ConduitError::Config(format!("consumers.{name}: {e}")))?;
        }
        Ok(())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Configuration consumed by the pipeline stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Headers copied into the ambient per-call context.
    #[serde(alias = "contextKeys")]
    pub context_keys: Vec<ScopedKey>,
    /// Headers attached to the structured logging scope.
    #[serde(alias = "loggingKeys")]
    pub logging_keys: Vec<ScopedKey>,
    /// Header carrying the culture code.
    #[serde(alias = "cultureHeader")]
    pub culture_header: String,
    /// Culture used when the header is absent.
    #[serde(alias = "defaultCulture")]
    pub default_culture: Option<String>,
    /// Also publish the active culture into the ambient context.
    #[serde(alias = "injectCultureIntoContext")]
    pub inject_culture_into_context: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_keys: Vec::new(),
            logging_keys: Vec::new(),
            culture_header: DEFAULT_CULTURE_HEADER.to_string(),
            default_culture: None,
            inject_culture_into_context: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        for key in self.context_keys.iter().chain(&self.logging_keys) {
            if key.name.trim().is_empty() {
                return Err(ConduitError::Config("scoped key name must not be empty".into()));
            }
        }
        if self.culture_header.trim().is_empty() {
            return Err(ConduitError::Config("pipeline.culture_header must not be empty".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Resilience
// ============================================================================

/// Resilience settings for one logical endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    #[serde(alias = "circuitBreaker")]
    pub circuit_breaker: CircuitBreakerSettings,
    pub retry: RetrySettings,
}

impl ResilienceSettings {
    pub fn validate(&self) -> Result<()> {
        self.circuit_breaker.validate()?;
        self.retry.validate()
    }

    /// True when neither primitive is enabled.
    pub fn is_passthrough(&self) -> bool {
        !self.circuit_breaker.enabled && !self.retry.enabled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    /// Failure ratio (0.0..=1.0) at which the breaker opens.
    #[serde(alias = "failureThreshold")]
    pub failure_threshold: f64,
    #[serde(alias = "samplingDurationSeconds")]
    pub sampling_duration_seconds: u64,
    #[serde(alias = "minimumThroughput")]
    pub minimum_throughput: u32,
    #[serde(alias = "durationOfBreakSeconds")]
    pub duration_of_break_seconds: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            sampling_duration_seconds: DEFAULT_SAMPLING_DURATION_SECS,
            minimum_throughput: DEFAULT_MINIMUM_THROUGHPUT,
            duration_of_break_seconds: DEFAULT_BREAK_DURATION_SECS,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn sampling_duration(&self) -> Duration {
        Duration::from_secs(self.sampling_duration_seconds)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_secs(self.duration_of_break_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return Err(ConduitError::Config(format!(
                "circuit_breaker.failure_threshold must be in (0, 1], got {}",
                self.failure_threshold
            )));
        }
        if self.sampling_duration_seconds == 0 {
            return Err(ConduitError::Config(
                "circuit_breaker.sampling_duration_seconds must be greater than 0".into(),
            ));
        }
        if self.minimum_throughput == 0 {
            return Err(ConduitError::Config(
                "circuit_breaker.minimum_throughput must be greater than 0".into(),
            ));
        }
        if self.duration_of_break_seconds == 0 {
            return Err(ConduitError::Config(
                "circuit_breaker.duration_of_break_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// How the wait between retries evolves with the attempt number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Linear,
    Exponential,
}

impl_domain_enum_conversions!(BackoffKind {
    Fixed => "fixed",
    Linear => "linear",
    Exponential => "exponential",
});

/// Randomization applied to each computed retry wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterKind {
    #[default]
    None,
    /// Anywhere between zero and the computed wait.
    Full,
    /// Between half the computed wait and the full wait.
    Equal,
}

impl_domain_enum_conversions!(JitterKind {
    None => "none",
    Full => "full",
    Equal => "equal",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub enabled: bool,
    /// Retries after the initial attempt.
    pub attempts: u32,
    #[serde(alias = "waitDurationMs")]
    pub wait_duration_ms: u64,
    pub backoff: BackoffKind,
    /// Upper bound for computed waits (linear and exponential backoff).
    #[serde(alias = "maxWaitMs")]
    pub max_wait_ms: u64,
    pub jitter: JitterKind,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            attempts: DEFAULT_RETRY_ATTEMPTS,
            wait_duration_ms: DEFAULT_RETRY_WAIT_MS,
            backoff: BackoffKind::Fixed,
            max_wait_ms: DEFAULT_RETRY_MAX_WAIT_MS,
            jitter: JitterKind::None,
        }
    }
}

impl RetrySettings {
    pub fn wait_duration(&self) -> Duration {
        Duration::from_millis(self.wait_duration_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.attempts == 0 {
            return Err(ConduitError::Config("retry.attempts must be greater than 0".into()));
        }
        if self.max_wait_ms < self.wait_duration_ms {
            return Err(ConduitError::Config(
                "retry.max_wait_ms must not be smaller than retry.wait_duration_ms".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Consumers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    /// Messages processed concurrently by one consumer.
    #[serde(alias = "maxConcurrentCalls")]
    pub max_concurrent_calls: usize,
    /// Settlement for messages whose handler failed.
    #[serde(alias = "onProcessingError")]
    pub on_processing_error: ProcessingErrorAction,
    /// Time allowed for in-flight messages to finish on stop.
    #[serde(alias = "shutdownTimeoutMs")]
    pub shutdown_timeout_ms: u64,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            on_processing_error: ProcessingErrorAction::Requeue,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ConsumerSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_calls == 0 {
            return Err(ConduitError::Config("max_concurrent_calls must be greater than 0".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl_domain_enum_conversions!(LogFormat {
    Json => "json",
    Pretty => "pretty",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when no environment override is set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: DEFAULT_LOG_LEVEL.to_string(), format: LogFormat::Json }
    }
}
