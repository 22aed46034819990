//! # Conduit Domain
//!
//! Message and configuration types shared by every Conduit crate.
//!
//! This crate contains:
//! - The message envelope (`Envelope<T>`, `Headers`)
//! - Scoped key declarations and acknowledgement decisions
//! - Configuration structures for the pipeline, resilience policies,
//!   consumers and logging
//! - Domain error types and Result definitions
//!
//! ## Architecture
//! - No dependencies on other Conduit crates
//! - Only external dependencies allowed
//! - Pure data structures and validation

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
