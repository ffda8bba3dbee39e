//! Tracing subscriber setup with format selection.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use super::config::{LogFormat, TracingConfig};

/// Initialize the global subscriber with the given configuration.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format() {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_file(config.include_location())
                        .with_line_number(config.include_location())
                        .flatten_event(true),
                )
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .pretty()
                        .with_file(config.include_location())
                        .with_line_number(config.include_location()),
                )
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_file(config.include_location())
                        .with_line_number(config.include_location()),
                )
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
    }
    Ok(())
}
