//! Structured logging setup.
//!
//! Logging format is controlled via `PILOT_LOG_FORMAT`:
//! - `json` - Structured JSON output (default outside a terminal)
//! - `pretty` - Human-readable colored output (default in a terminal)
//! - `compact` - Compact single-line format
//!
//! The filter comes from `PILOT_LOG_LEVEL`, then `RUST_LOG`, then `info`.
//!
//! # Example
//!
//! ```ignore
//! use pilot_core::observability::{TracingConfig, init_tracing};
//!
//! init_tracing(&TracingConfig::from_env())?;
//! ```

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig};
pub use tracing_setup::init_tracing;
