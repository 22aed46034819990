//! Configuration loader
//!
//! Loads [`Config`] from a file, then applies environment overrides and
//! validates the result.
//!
//! ## Loading Strategy
//! 1. An explicit path passed by the caller
//! 2. Otherwise the path in `CONDUIT_CONFIG`
//! 3. Otherwise the first file found by [`find_config_file`]
//! 4. Otherwise [`Config::default`]
//!
//! An explicit or `CONDUIT_CONFIG` path that does not exist is an error;
//! finding no file is not.
//!
//! ## Environment Variables
//! - `CONDUIT_CONFIG`: Config file path
//! - `CONDUIT_DEFAULT_CULTURE`: Culture used when a message carries none
//! - `CONDUIT_INJECT_CULTURE`: Publish the culture into the ambient context
//!   (true/false)
//! - `CONDUIT_LOG_LEVEL`: Default log filter directive
//! - `CONDUIT_LOG_FORMAT`: `json` or `pretty`
//! - `CONDUIT_MAX_CONCURRENT_CALLS`: Concurrency for every consumer binding
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./conduit.toml`
//! 2. `./conduit.json`
//! 3. `./config/conduit.toml`
//! 4. The same names relative to the executable location

use std::path::{Path, PathBuf};

use conduit_domain::constants::DEFAULT_CONSUMER_BINDING;
use conduit_domain::{ConduitError, Config, LogFormat, Result};

pub const CONFIG_PATH_ENV: &str = "CONDUIT_CONFIG";
pub const DEFAULT_CULTURE_ENV: &str = "CONDUIT_DEFAULT_CULTURE";
pub const INJECT_CULTURE_ENV: &str = "CONDUIT_INJECT_CULTURE";
pub const LOG_LEVEL_ENV: &str = "CONDUIT_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "CONDUIT_LOG_FORMAT";
pub const MAX_CONCURRENT_CALLS_ENV: &str = "CONDUIT_MAX_CONCURRENT_CALLS";

const CONFIG_FILE_NAMES: [&str; 3] = ["conduit.toml", "conduit.json", "config/conduit.toml"];

/// Load configuration using the full fallback strategy
///
/// # Errors
/// Returns `ConduitError::Config` if a configured file is missing or
/// malformed, an override is invalid, or validation fails.
pub fn load() -> Result<Config> {
    load_from(None)
}

/// Load configuration, preferring `path` over every other source
pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let explicit = path.or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

    let mut config = match explicit {
        Some(path) => load_from_file(&path)?,
        None => match find_config_file() {
            Some(path) => load_from_file(&path)?,
            None => {
                tracing::debug!("No config file found, using defaults");
                Config::default()
            }
        },
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from one file without overrides or validation
///
/// Supports JSON and TOML (detected by file extension).
///
/// # Errors
/// Returns `ConduitError::Config` if the file does not exist, cannot be
/// read, or does not parse.
pub fn load_from_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(ConduitError::Config(format!("Config file not found: {}", path.display())));
    }

    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConduitError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, path)
}

/// Parse configuration, choosing the format from the path's extension
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ConduitError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ConduitError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(ConduitError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the standard locations
pub fn find_config_file() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Apply `CONDUIT_*` environment overrides in place
///
/// # Errors
/// Returns `ConduitError::Config` for unparseable values.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(culture) = env_var(DEFAULT_CULTURE_ENV) {
        config.pipeline.default_culture = Some(culture);
    }
    config.pipeline.inject_culture_into_context =
        env_bool(INJECT_CULTURE_ENV, config.pipeline.inject_culture_into_context);

    if let Some(level) = env_var(LOG_LEVEL_ENV) {
        config.logging.level = level;
    }
    if let Some(format) = env_var(LOG_FORMAT_ENV) {
        config.logging.format = format.to_ascii_lowercase().parse::<LogFormat>().map_err(|_| {
            ConduitError::Config(format!("Invalid {LOG_FORMAT_ENV}: {format}"))
        })?;
    }

    if let Some(raw) = env_var(MAX_CONCURRENT_CALLS_ENV) {
        let calls = raw.parse::<usize>().map_err(|e| {
            ConduitError::Config(format!("Invalid {MAX_CONCURRENT_CALLS_ENV}: {e}"))
        })?;
        config.consumers.entry(DEFAULT_CONSUMER_BINDING.to_string()).or_default();
        for settings in config.consumers.values_mut() {
            settings.max_concurrent_calls = calls;
        }
    }

    Ok(())
}

/// Non-empty environment variable
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
