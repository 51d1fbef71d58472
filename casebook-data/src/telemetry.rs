//! Tracing subscriber initialisation
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and a JSON
//! or human-readable fmt layer. Library code only emits events; installing
//! a subscriber is left to the embedding application.

use casebook_core::{CasebookError, CasebookResult, ConfigError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter directives used when `RUST_LOG` is unset
    pub default_filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: "casebook=info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    /// Read `CASEBOOK_LOG` and `CASEBOOK_LOG_FORMAT` (`json` or `pretty`).
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let default_filter = lookup("CASEBOOK_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.default_filter);
        let format = match lookup("CASEBOOK_LOG_FORMAT").as_deref().map(str::trim) {
            Some("pretty") | Some("text") => LogFormat::Pretty,
            _ => defaults.format,
        };
        Self {
            default_filter,
            format,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> CasebookResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| {
            CasebookError::from(ConfigError::InvalidValue {
                field: "CASEBOOK_LOG".to_string(),
                value: config.default_filter.clone(),
                reason: e.to_string(),
            })
        })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
    };

    result.map_err(|e| {
        CasebookError::from(ConfigError::InvalidValue {
            field: "tracing".to_string(),
            value: format!("{:?}", config.format),
            reason: format!("Failed to init subscriber: {}", e),
        })
    })?;

    tracing::info!(
        filter = %config.default_filter,
        format = ?config.format,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TelemetryConfig::from_vars(|_| None);
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.default_filter, "casebook=info");
    }

    #[test]
    fn test_from_vars() {
        let config = TelemetryConfig::from_vars(|key| match key {
            "CASEBOOK_LOG" => Some("casebook_data=debug".to_string()),
            "CASEBOOK_LOG_FORMAT" => Some("pretty".to_string()),
            _ => None,
        });
        assert_eq!(config.default_filter, "casebook_data=debug");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let config = TelemetryConfig {
            default_filter: "casebook=notalevel[".to_string(),
            format: LogFormat::Json,
        };
        // RUST_LOG would take precedence over the configured filter
        if std::env::var("RUST_LOG").is_err() {
            let err = init_tracing(&config).unwrap_err();
            assert!(matches!(err, CasebookError::Config(_)));
        }
    }
}
