//! Log subscriber setup for the binary

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::{PlaybackError, Result};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `cli_level_override`, which wins over the configured
/// level.
///
/// # Errors
///
/// Returns error if the level is not a valid filter or a subscriber is
/// already installed
pub fn init(config: &LoggingConfig, cli_level_override: Option<&str>) -> Result<()> {
    let filter = resolve_filter(
        std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
        config,
        cli_level_override,
    )?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match config.format.unwrap_or_default() {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| PlaybackError::ConfigError(format!("initialize logging subscriber: {e}")))
}

fn resolve_filter(
    env_directives: Option<&str>,
    config: &LoggingConfig,
    cli_level_override: Option<&str>,
) -> Result<EnvFilter> {
    let raw = env_directives
        .filter(|d| !d.trim().is_empty())
        .or(cli_level_override)
        .or(config.level.as_deref())
        .unwrap_or(DEFAULT_LOG_LEVEL);

    EnvFilter::try_new(raw.trim().to_ascii_lowercase()).map_err(|_| {
        PlaybackError::ConfigError(format!(
            "invalid log level `{raw}`; expected one of trace, debug, info, warn, error, off"
        ))
    })
}
