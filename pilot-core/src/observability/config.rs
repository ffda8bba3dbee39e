//! Configuration types for logging.

use std::env;
use std::str::FromStr;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON format for log shippers.
    Json,
    /// Human-readable pretty format with colors.
    Pretty,
    /// Compact single-line format.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::default(),
        })
    }
}

/// Configuration for the tracing subscriber.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log output format.
    log_format: LogFormat,
    /// Log level filter (e.g., "info", "debug,kube=warn").
    log_filter: String,
    /// Whether to include source location in logs.
    include_location: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: "info".to_string(),
            include_location: false,
        }
    }
}

impl TracingConfig {
    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PILOT_LOG_FORMAT`: "json", "pretty", or "compact"
    /// - `PILOT_LOG_LEVEL` or `RUST_LOG`: Log filter string
    /// - `PILOT_LOG_LOCATION`: "true" to include file and line
    pub fn from_env() -> Self {
        let log_format = env::var("PILOT_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse::<LogFormat>().ok())
            .unwrap_or_else(|| {
                // JSON when shipped from a pod, pretty in a terminal.
                if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
                    LogFormat::Pretty
                } else {
                    LogFormat::Json
                }
            });

        let log_filter = env::var("PILOT_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        Self {
            log_format,
            log_filter,
            include_location: env::var("PILOT_LOG_LOCATION")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
        }
    }

    /// Replace the log filter, keeping format and location settings.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Get the log format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Get the log filter.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Check if source location should be included.
    pub fn include_location(&self) -> bool {
        self.include_location
    }
}
