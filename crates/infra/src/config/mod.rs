//! Configuration loading
//!
//! Reads [`conduit_domain::Config`] from a TOML or JSON file and applies
//! environment overrides on top.

pub mod loader;

// Re-export commonly used items
pub use loader::{apply_env_overrides, load, load_from, load_from_file, find_config_file};
