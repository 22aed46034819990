//! Observability bootstrap
//!
//! Installs the process-wide `tracing` subscriber. Everything else in the
//! workspace only emits through `tracing` macros and never configures
//! output itself.

pub mod logging;

pub use logging::{filter_directive, init_tracing, LOG_ENV};
