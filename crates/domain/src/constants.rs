//! Domain constants
//!
//! Centralized location for header names, reserved context keys and
//! configuration defaults.

// Header and context keys
pub const DEFAULT_CULTURE_HEADER: &str = "culture";
/// Reserved ambient-context key under which the active culture is injected.
pub const CULTURE_CONTEXT_KEY: &str = "Culture";
/// Resilience entry consulted when an endpoint has no settings of its own.
pub const DEFAULT_RESILIENCE_ENDPOINT: &str = "default";
/// Consumer entry consulted when a binding has no settings of its own.
pub const DEFAULT_CONSUMER_BINDING: &str = "default";
pub const MESSAGE_ID_HEADER: &str = "message-id";
pub const CONTENT_TYPE_HEADER: &str = "content-type";

// Circuit breaker defaults
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_SAMPLING_DURATION_SECS: u64 = 30;
pub const DEFAULT_MINIMUM_THROUGHPUT: u32 = 10;
pub const DEFAULT_BREAK_DURATION_SECS: u64 = 30;

// Retry defaults
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_WAIT_MS: u64 = 200;
pub const DEFAULT_RETRY_MAX_WAIT_MS: u64 = 30_000;

// Consumer defaults
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 1;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
