//! Logging bootstrap.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log lines.
    pub service_name: String,
    /// Log level filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "skiff".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create a configuration with the given service name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the default log level filter.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

static INIT: Once = Once::new();

/// Install the global tracing subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init_telemetry(config: &TelemetryConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();

        tracing::info!(service = %config.service_name, "telemetry initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = TelemetryConfig::new("skiff-test").with_log_level("warn");
        init_telemetry(&config);
        init_telemetry(&config);
    }
}
