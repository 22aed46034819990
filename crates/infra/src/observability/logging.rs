//! Tracing subscriber initialisation

use conduit_domain::constants::DEFAULT_LOG_LEVEL;
use conduit_domain::{LogFormat, LoggingConfig};
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Filter override consulted before `RUST_LOG`
pub const LOG_ENV: &str = "CONDUIT_LOG";

static INITIALISED: OnceCell<()> = OnceCell::new();

/// Install the global subscriber described by `config`
///
/// The filter comes from `CONDUIT_LOG`, then `RUST_LOG`, then
/// `config.level`, skipping directives that do not parse. Returns `true`
/// only for the call that installed the subscriber; later calls, or a
/// subscriber installed by someone else, return `false` and leave the
/// existing one in place.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let mut installed = false;
    INITIALISED.get_or_init(|| {
        let directive = filter_directive(
            std::env::var(LOG_ENV).ok().as_deref(),
            std::env::var("RUST_LOG").ok().as_deref(),
            &config.level,
        );

        let fmt_layer = match config.format {
            LogFormat::Json => fmt::layer()
                .with_target(false)
                .json()
                .with_current_span(true)
                .boxed(),
            LogFormat::Pretty => fmt::layer().with_target(true).pretty().boxed(),
        };

        installed = tracing_subscriber::registry()
            .with(EnvFilter::new(&directive))
            .with(fmt_layer)
            .try_init()
            .is_ok();

        if installed {
            info!(filter = %directive, format = %config.format, "tracing initialised");
        }
    });
    installed
}

/// First candidate that parses as an `EnvFilter` directive
///
/// Falls back to the default level when none of them do.
pub fn filter_directive(log_env: Option<&str>, rust_log: Option<&str>, level: &str) -> String {
    [log_env, rust_log, Some(level)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .find(|directive| EnvFilter::try_new(directive).is_ok())
        .unwrap_or(DEFAULT_LOG_LEVEL)
        .to_string()
}
