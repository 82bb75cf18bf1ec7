// Telemetry Module
//
// Structured logging for cellarclub processes:
// - `TelemetryConfig::from_env` reads the service name and log filter
// - `init_telemetry` installs a tracing-subscriber fmt layer behind an EnvFilter
// - `session_span` scopes everything one principal session logs

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name recorded on startup
    pub service_name: String,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Whether to emit ANSI colors
    pub ansi: bool,
    /// Log filter (e.g., "info", "debug", "cellarclub_core=debug")
    pub log_filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "cellarclub".to_string(),
            enable_console: true,
            ansi: true,
            log_filter: None,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `CELLARCLUB_SERVICE_NAME`: Service name (default: "cellarclub")
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    /// - `NO_COLOR`: Disable ANSI colors when set
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("CELLARCLUB_SERVICE_NAME")
                .unwrap_or_else(|_| "cellarclub".to_string()),
            enable_console: true,
            ansi: std::env::var_os("NO_COLOR").is_none(),
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
        }
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

/// Guard that flushes a shutdown line when dropped
pub struct TelemetryGuard {
    service_name: String,
    installed: bool,
}

impl TelemetryGuard {
    /// False when another subscriber was already installed
    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.installed {
            tracing::debug!(service = %self.service_name, "Telemetry shut down");
        }
    }
}

/// Initialize logging with the given configuration
///
/// Returns a guard; keep it alive for the lifetime of the process.
///
/// # Example
///
/// ```ignore
/// use cellarclub_core::telemetry::{init_telemetry, TelemetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let _guard = init_telemetry(TelemetryConfig::from_env());
///     // ... your application code
/// }
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let console_layer = if config.enable_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(config.ansi)
                .with_writer(std::io::stderr)
                .with_filter(config.filter()),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(service = %config.service_name, "Telemetry initialized");
    }

    TelemetryGuard {
        service_name: config.service_name,
        installed,
    }
}

/// Span wrapping everything one principal session does
pub fn session_span(principal: Uuid) -> tracing::Span {
    tracing::info_span!("notification_session", user_id = %principal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "cellarclub");
        assert!(config.enable_console);
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_invalid_filter_falls_back_to_info() {
        let config = TelemetryConfig::default().with_log_filter("cellarclub=verbose");
        assert_eq!(config.filter().to_string(), "info");
    }

    #[test]
    fn test_second_init_is_harmless() {
        let _first = init_telemetry(TelemetryConfig::default());
        let second = init_telemetry(TelemetryConfig::default());
        assert!(!second.is_installed());
    }
}
