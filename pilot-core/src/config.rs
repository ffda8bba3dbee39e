//! Sidecar configuration.

use crate::error::{PilotError, PilotResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Well-known sentinel port.
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;

/// Well-known redis port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// File name of the rendered sentinel configuration.
pub const SENTINEL_CONFIG_NAME: &str = "sentinel.conf";

/// Configuration for one bootstrap run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Namespace the replica pods live in.
    pub namespace: String,

    /// Host name of the sentinel service.
    pub sentinel_service: String,

    /// Port the sentinel service listens on.
    pub sentinel_port: u16,

    /// Base label selector shared by every replica of the group.
    pub labels: BTreeMap<String, String>,

    /// Force sentinel mode even without `--sentinel` in the arguments.
    pub sentinel: bool,

    /// Settings rendered into the sentinel configuration.
    pub monitor: MonitorConfig,

    /// Port redis listens on inside each pod.
    pub redis_port: u16,

    /// Path to the redis server binary.
    pub redis_server: PathBuf,

    /// Path to the redis command line client.
    pub redis_cli: PathBuf,

    /// Polling cadence.
    pub polling: PollingConfig,

    /// Where the sentinel configuration is written.
    pub sentinel_config_path: PathBuf,

    /// Flag appended with `<host> <port>` when starting as a replica.
    pub replication_flag: String,

    /// Consecutive client initialization failures tolerated before giving up.
    pub max_client_init_failures: u32,

    /// Arguments passed through to the server process.
    pub args: Vec<String>,
}

/// Sentinel monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Logical name of the monitored primary.
    pub master_name: String,

    /// Number of sentinels that must agree the primary is down.
    pub quorum: u32,

    /// Milliseconds of silence before a sentinel marks the primary down.
    pub down_after_ms: u64,

    /// Failover timeout in milliseconds.
    pub failover_timeout_ms: u64,

    /// Replicas reconfigured in parallel after a failover.
    pub parallel_syncs: u32,
}

/// Polling cadence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Jitter window (min, max) in milliseconds for the replica loop.
    /// A single interval is drawn from this range per run so concurrent
    /// replicas do not poll in lockstep.
    pub jitter_ms: (u64, u64),

    /// Fixed interval in milliseconds for the sentinel-mode loop.
    pub sentinel_interval_ms: u64,

    /// Upper bound in milliseconds for one sentinel query.
    pub sentinel_timeout_ms: u64,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            sentinel_service: "redis-sentinel".to_string(),
            sentinel_port: DEFAULT_SENTINEL_PORT,
            labels: BTreeMap::new(),
            sentinel: false,
            monitor: MonitorConfig::default(),
            redis_port: DEFAULT_REDIS_PORT,
            redis_server: PathBuf::from("/usr/bin/redis-server"),
            redis_cli: PathBuf::from("/usr/bin/redis-cli"),
            polling: PollingConfig::default(),
            sentinel_config_path: std::env::temp_dir().join(SENTINEL_CONFIG_NAME),
            replication_flag: "--replicate-from".to_string(),
            max_client_init_failures: 5,
            args: Vec::new(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            master_name: "redis-master".to_string(),
            quorum: 2,
            down_after_ms: 60_000,
            failover_timeout_ms: 180_000,
            parallel_syncs: 1,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            jitter_ms: (2_000, 7_000),
            sentinel_interval_ms: 5_000,
            sentinel_timeout_ms: 1_000,
        }
    }
}

impl PilotConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PilotConfigBuilder {
        PilotConfigBuilder::default()
    }

    /// Get the jitter window as a Duration range.
    pub fn jitter(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.polling.jitter_ms.0),
            Duration::from_millis(self.polling.jitter_ms.1),
        )
    }

    /// Get the sentinel-mode poll interval.
    pub fn sentinel_interval(&self) -> Duration {
        Duration::from_millis(self.polling.sentinel_interval_ms)
    }

    /// Get the sentinel query timeout.
    pub fn sentinel_timeout(&self) -> Duration {
        Duration::from_millis(self.polling.sentinel_timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> PilotResult<()> {
        if self.namespace.is_empty() {
            return Err(PilotError::InvalidConfig("namespace is required".into()));
        }
        if self.sentinel_service.is_empty() {
            return Err(PilotError::InvalidConfig(
                "sentinel_service is required".into(),
            ));
        }
        if self.monitor.master_name.is_empty() {
            return Err(PilotError::InvalidConfig("master_name is required".into()));
        }
        if self.monitor.master_name.chars().any(char::is_whitespace) {
            return Err(PilotError::InvalidConfig(format!(
                "master_name must not contain whitespace: {:?}",
                self.monitor.master_name
            )));
        }
        if self.monitor.quorum == 0 {
            return Err(PilotError::InvalidConfig("quorum must be > 0".into()));
        }
        if self.monitor.parallel_syncs == 0 {
            return Err(PilotError::InvalidConfig(
                "parallel_syncs must be > 0".into(),
            ));
        }

        let (min, max) = self.polling.jitter_ms;
        if min == 0 || min > max {
            return Err(PilotError::InvalidConfig(format!(
                "jitter window ({}, {}) must satisfy 0 < min <= max",
                min, max
            )));
        }
        if self.polling.sentinel_interval_ms == 0 || self.polling.sentinel_timeout_ms == 0 {
            return Err(PilotError::InvalidConfig(
                "sentinel interval and timeout must be > 0".into(),
            ));
        }

        Ok(())
    }
}

/// Builder for PilotConfig.
#[derive(Debug, Default)]
pub struct PilotConfigBuilder {
    config: PilotConfig,
}

impl PilotConfigBuilder {
    /// Set the namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set the sentinel service host.
    pub fn sentinel_service(mut self, service: impl Into<String>) -> Self {
        self.config.sentinel_service = service.into();
        self
    }

    /// Set the sentinel port.
    pub fn sentinel_port(mut self, port: u16) -> Self {
        self.config.sentinel_port = port;
        self
    }

    /// Add a base selector label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.labels.insert(key.into(), value.into());
        self
    }

    /// Set all base selector labels at once.
    pub fn labels(mut self, labels: impl IntoIterator<Item = (String, String)>) -> Self {
        self.config.labels = labels.into_iter().collect();
        self
    }

    /// Force sentinel mode.
    pub fn sentinel(mut self, sentinel: bool) -> Self {
        self.config.sentinel = sentinel;
        self
    }

    /// Set the monitored primary name.
    pub fn master_name(mut self, name: impl Into<String>) -> Self {
        self.config.monitor.master_name = name.into();
        self
    }

    /// Set the sentinel quorum.
    pub fn quorum(mut self, quorum: u32) -> Self {
        self.config.monitor.quorum = quorum;
        self
    }

    /// Set the down-after timeout in milliseconds.
    pub fn down_after_ms(mut self, ms: u64) -> Self {
        self.config.monitor.down_after_ms = ms;
        self
    }

    /// Set the failover timeout in milliseconds.
    pub fn failover_timeout_ms(mut self, ms: u64) -> Self {
        self.config.monitor.failover_timeout_ms = ms;
        self
    }

    /// Set the parallel-syncs count.
    pub fn parallel_syncs(mut self, n: u32) -> Self {
        self.config.monitor.parallel_syncs = n;
        self
    }

    /// Set the redis port.
    pub fn redis_port(mut self, port: u16) -> Self {
        self.config.redis_port = port;
        self
    }

    /// Set the redis server binary.
    pub fn redis_server(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.redis_server = path.into();
        self
    }

    /// Set the redis client binary.
    pub fn redis_cli(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.redis_cli = path.into();
        self
    }

    /// Set the replica jitter window in milliseconds.
    pub fn jitter_ms(mut self, min: u64, max: u64) -> Self {
        self.config.polling.jitter_ms = (min, max);
        self
    }

    /// Set the sentinel-mode poll interval in milliseconds.
    pub fn sentinel_interval_ms(mut self, ms: u64) -> Self {
        self.config.polling.sentinel_interval_ms = ms;
        self
    }

    /// Set the sentinel query timeout in milliseconds.
    pub fn sentinel_timeout_ms(mut self, ms: u64) -> Self {
        self.config.polling.sentinel_timeout_ms = ms;
        self
    }

    /// Set where the sentinel configuration is written.
    pub fn sentinel_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sentinel_config_path = path.into();
        self
    }

    /// Set the replication flag.
    pub fn replication_flag(mut self, flag: impl Into<String>) -> Self {
        self.config.replication_flag = flag.into();
        self
    }

    /// Set the client initialization failure budget.
    pub fn max_client_init_failures(mut self, n: u32) -> Self {
        self.config.max_client_init_failures = n;
        self
    }

    /// Set the pass-through server arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PilotResult<PilotConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parse a `key=value` label argument.
pub fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.contains('=') => {
            Ok((key.to_string(), value.to_string()))
        }
        _ => Err(format!("must be like \"key=value\", got {:?}", raw)),
    }
}
