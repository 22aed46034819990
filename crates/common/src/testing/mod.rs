//! Testing utilities and helpers
//!
//! - **[`async_utils`]**: eventual-consistency assertions for async tests
//! - **[`errors`]**: [`ClassifiedError`], an error with a chosen failure class
//! - **[`logs`]**: capture structured log output for assertions
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "runtime")]
//! # {
//! use conduit_common::testing::MockClock;
//!
//! fn test_with_mock_time() {
//!     let clock = MockClock::new();
//!     clock.advance(std::time::Duration::from_secs(5));
//!     // ... test with controlled time
//! }
//! # }
//! ```

pub mod async_utils;
pub mod errors;
pub mod logs;

pub use async_utils::timeout_ok;
pub use errors::ClassifiedError;
pub use logs::LogCapture;

pub use crate::resilience::{Clock, MockClock, SystemClock};
