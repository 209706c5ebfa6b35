//! Logging setup for binaries and host applications embedding the client.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "freightline=info,freightline_client=info";

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Fallback filter directive.
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `FREIGHTLINE_LOG_FORMAT` (`json` or `text`).
    pub fn from_env() -> Self {
        let json = std::env::var("FREIGHTLINE_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        Self {
            json,
            ..Self::default()
        }
    }

    /// Set the fallback filter.
    #[must_use]
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Toggle JSON output.
    #[must_use]
    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global subscriber configured from the environment.
pub fn init() -> Result<(), TryInitError> {
    init_with(&TelemetryConfig::from_env())
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_with(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let json = config.json.then(|| fmt::layer().json().with_target(true));
    let text = (!config.json).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(config.filter())
        .with(json)
        .with(text)
        .try_init()?;

    tracing::debug!(json = config.json, "Telemetry initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::new();
        assert_eq!(config.default_filter, DEFAULT_FILTER);
        assert!(!config.json);
    }

    #[test]
    fn test_builder() {
        let config = TelemetryConfig::new()
            .with_default_filter("freightline_client=debug")
            .json(true);
        assert_eq!(config.default_filter, "freightline_client=debug");
        assert!(config.json);
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::new();
        let _ = init_with(&config);
        assert!(init_with(&config).is_err());
    }
}
