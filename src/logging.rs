//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::{Result, VcrError};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` if set, then `cli_level_override`, then
/// `[logging] level`, then `info`.
///
/// # Errors
///
/// Returns error if the filter is invalid or a subscriber is already installed
pub fn init(config: &LoggingConfig, cli_level_override: Option<&str>) -> Result<()> {
    let filter = resolve_filter(
        std::env::var("RUST_LOG").ok().as_deref(),
        config,
        cli_level_override,
    )?;

    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .pretty()
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init(),
    }
    .map_err(|e| VcrError::Other(format!("Failed to initialize logging: {e}")))
}

fn resolve_filter(
    env_level: Option<&str>,
    config: &LoggingConfig,
    cli_level_override: Option<&str>,
) -> Result<EnvFilter> {
    let raw = env_level
        .filter(|level| !level.trim().is_empty())
        .or(cli_level_override)
        .or(config.level.as_deref())
        .unwrap_or(DEFAULT_LOG_LEVEL);

    EnvFilter::try_new(raw.trim())
        .map_err(|e| VcrError::ConfigError(format!("Invalid log level '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: Some(level.to_string()),
            format: LogFormat::Json,
        }
    }

    #[test]
    fn test_default_level() {
        let filter = resolve_filter(None, &LoggingConfig::default(), None).unwrap();
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_precedence() {
        let config = configured("warn");

        assert_eq!(
            resolve_filter(None, &config, None).unwrap().to_string(),
            "warn"
        );
        assert_eq!(
            resolve_filter(None, &config, Some("debug"))
                .unwrap()
                .to_string(),
            "debug"
        );
        assert_eq!(
            resolve_filter(Some("vcrproxy=trace"), &config, Some("debug"))
                .unwrap()
                .to_string(),
            "vcrproxy=trace"
        );
        assert_eq!(
            resolve_filter(Some("  "), &config, None).unwrap().to_string(),
            "warn"
        );
    }

    #[test]
    fn test_invalid_level() {
        let result = resolve_filter(None, &configured("vcrproxy=verbose"), None);
        assert!(matches!(result, Err(VcrError::ConfigError(_))));
    }
}
