//! Sentinel query through the `redis-cli` binary.

use super::{MasterRecord, SentinelFuture, SentinelQuery, parse_reply};
use crate::config::{DEFAULT_SENTINEL_PORT, PilotConfig};
use crate::error::{PilotError, PilotResult};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs `redis-cli -h <host> -p <port> --csv SENTINEL get-master-addr-by-name <name>`.
///
/// The child is killed when it overruns the timeout.
#[derive(Debug, Clone)]
pub struct RedisCliSentinel {
    cli: PathBuf,
    host: String,
    port: u16,
    timeout: Duration,
}

impl RedisCliSentinel {
    /// Create a query against `host` on the well-known sentinel port.
    pub fn new(cli: impl Into<PathBuf>, host: impl Into<String>) -> Self {
        Self {
            cli: cli.into(),
            host: host.into(),
            port: DEFAULT_SENTINEL_PORT,
            timeout: Duration::from_secs(1),
        }
    }

    /// Create a query from the sidecar configuration.
    pub fn from_config(config: &PilotConfig) -> Self {
        Self::new(&config.redis_cli, &config.sentinel_service)
            .with_port(config.sentinel_port)
            .with_timeout(config.sentinel_timeout())
    }

    /// Set the sentinel port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the query timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments passed to the client binary.
    pub fn args(&self, master_name: &str) -> Vec<String> {
        vec![
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "--csv".to_string(),
            "SENTINEL".to_string(),
            "get-master-addr-by-name".to_string(),
            master_name.to_string(),
        ]
    }

    async fn query(&self, master_name: &str) -> PilotResult<Option<MasterRecord>> {
        tracing::debug!(
            sentinel = %self.host,
            port = self.port,
            master = %master_name,
            "Querying sentinel for master address"
        );

        let child = Command::new(&self.cli)
            .args(self.args(master_name))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PilotError::SentinelTransport(format!(
                    "failed to spawn {}: {}",
                    self.cli.display(),
                    e
                ))
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| PilotError::SentinelTransport(e.to_string()))?,
            Err(_) => return Err(PilotError::SentinelTimeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PilotError::SentinelTransport(format!(
                "{} exited with {}: {}",
                self.cli.display(),
                output.status,
                stderr.trim()
            )));
        }

        parse_reply(&String::from_utf8_lossy(&output.stdout))
    }
}

impl SentinelQuery for RedisCliSentinel {
    fn master_addr<'a>(&'a self, master_name: &'a str) -> SentinelFuture<'a, Option<MasterRecord>> {
        Box::pin(self.query(master_name))
    }
}
