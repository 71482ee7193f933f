//! Logging setup.
//!
//! The library only emits `tracing` events; binaries embedding it call
//! [`init_tracing`] once to install a subscriber.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive` (for example
/// `"logflow=debug,warn"`).
///
/// # Errors
///
/// Returns `ConfigError::Logging` if the directive is invalid or a global
/// subscriber is already installed.
pub fn init_tracing(format: LogFormat, default_directive: &str) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|err| ConfigError::Logging(format!("invalid log directive: {err}")))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| ConfigError::Logging(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_deserializes() {
        let format: LogFormat = serde_json::from_value(serde_json::json!("json")).unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing(LogFormat::Pretty, "warn");
        assert!(init_tracing(LogFormat::Json, "warn").is_err());
    }
}
