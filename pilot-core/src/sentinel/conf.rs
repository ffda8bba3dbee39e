//! Sentinel configuration rendering.

use crate::config::MonitorConfig;
use crate::error::{PilotError, PilotResult};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Inputs of a rendered `sentinel.conf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelConf {
    /// Monitor settings.
    pub monitor: MonitorConfig,
    /// Primary host.
    pub host: String,
    /// Primary port.
    pub port: u16,
}

impl SentinelConf {
    /// Create a configuration for the primary at `host:port`.
    pub fn new(monitor: MonitorConfig, host: impl Into<String>, port: u16) -> Self {
        Self {
            monitor,
            host: host.into(),
            port,
        }
    }

    /// Render the configuration text. Same inputs, same bytes.
    pub fn render(&self) -> String {
        let m = &self.monitor;
        let mut out = String::with_capacity(256);
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "sentinel monitor {} {} {} {}",
            m.master_name, self.host, self.port, m.quorum
        );
        let _ = writeln!(
            out,
            "sentinel down-after-milliseconds {} {}",
            m.master_name, m.down_after_ms
        );
        let _ = writeln!(
            out,
            "sentinel failover-timeout {} {}",
            m.master_name, m.failover_timeout_ms
        );
        let _ = writeln!(
            out,
            "sentinel parallel-syncs {} {}",
            m.master_name, m.parallel_syncs
        );
        out
    }

    /// Write the rendered configuration to `path`, replacing any previous
    /// content, and return the path.
    pub async fn write(&self, path: &Path) -> PilotResult<PathBuf> {
        tokio::fs::write(path, self.render())
            .await
            .map_err(|source| PilotError::ConfigWrite {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            master = %self.monitor.master_name,
            host = %self.host,
            port = self.port,
            "Wrote sentinel config"
        );
        Ok(path.to_path_buf())
    }
}
