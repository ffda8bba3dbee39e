//! redis-pilot - bootstrap sidecar for Redis replicas running as Kubernetes pods.
//!
//! Finds or elects the primary, then starts `redis-server` as primary,
//! replica or sentinel with the final argument list.

use anyhow::{Context, Result};
use clap::Parser;
use pilot_core::config::parse_label;
use pilot_core::observability::{TracingConfig, init_tracing};
use pilot_core::{Bootstrap, KubeDirectory, PilotConfig, RedisCliSentinel};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Start redis as primary, replica or sentinel depending on the cluster state.
#[derive(Parser, Debug)]
#[command(name = "redis-pilot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Namespace of the redis pods
    #[arg(long, env = "PILOT_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Sentinel service name
    #[arg(long, env = "PILOT_SENTINEL_SERVICE", default_value = "redis-sentinel")]
    sentinel_service: String,

    /// Sentinel service port
    #[arg(long, env = "PILOT_SENTINEL_PORT", default_value_t = 26379)]
    sentinel_port: u16,

    /// Pod selector labels: --labels key1=value1 --labels key2=value2
    #[arg(long = "labels", env = "PILOT_LABELS", value_delimiter = ',', value_parser = parse_label)]
    labels: Vec<(String, String)>,

    /// Run as sentinel
    #[arg(long, env = "PILOT_SENTINEL")]
    sentinel: bool,

    /// Sentinel master name
    #[arg(long, env = "PILOT_MASTER_NAME", default_value = "redis-master")]
    master_name: String,

    /// Sentinel master quorum
    #[arg(long, env = "PILOT_QUORUM", default_value_t = 2)]
    quorum: u32,

    /// Sentinel down after milliseconds
    #[arg(long, env = "PILOT_DOWN_AFTER_MILLISECONDS", default_value_t = 60_000)]
    down_after_milliseconds: u64,

    /// Sentinel failover timeout in milliseconds
    #[arg(long, env = "PILOT_FAILOVER_TIMEOUT", default_value_t = 180_000)]
    failover_timeout: u64,

    /// Sentinel parallel syncs
    #[arg(long, env = "PILOT_PARALLEL_SYNCS", default_value_t = 1)]
    parallel_syncs: u32,

    /// Port redis listens on in every pod
    #[arg(long, env = "PILOT_REDIS_PORT", default_value_t = 6379)]
    redis_port: u16,

    /// Path to redis-server
    #[arg(long, env = "PILOT_REDIS_SERVER", default_value = "/usr/bin/redis-server")]
    redis_server: PathBuf,

    /// Path to redis-cli
    #[arg(long, env = "PILOT_REDIS_CLI", default_value = "/usr/bin/redis-cli")]
    redis_cli: PathBuf,

    /// Where to write the sentinel config (defaults to the temp dir)
    #[arg(long, env = "PILOT_SENTINEL_CONFIG")]
    sentinel_config: Option<PathBuf>,

    /// Flag passed with "<host> <port>" when starting as a replica
    #[arg(long, env = "PILOT_REPLICATION_FLAG", default_value = "--replicate-from", allow_hyphen_values = true)]
    replication_flag: String,

    /// Arguments passed through to redis-server
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    fn into_config(self) -> Result<PilotConfig> {
        let mut builder = PilotConfig::builder()
            .namespace(self.namespace)
            .sentinel_service(self.sentinel_service)
            .sentinel_port(self.sentinel_port)
            .labels(self.labels)
            .sentinel(self.sentinel)
            .master_name(self.master_name)
            .quorum(self.quorum)
            .down_after_ms(self.down_after_milliseconds)
            .failover_timeout_ms(self.failover_timeout)
            .parallel_syncs(self.parallel_syncs)
            .redis_port(self.redis_port)
            .redis_server(self.redis_server)
            .redis_cli(self.redis_cli)
            .replication_flag(self.replication_flag)
            .args(self.args);

        if let Some(path) = self.sentinel_config {
            builder = builder.sentinel_config_path(path);
        }

        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut tracing_config = TracingConfig::from_env();
    if cli.verbose > 0 {
        let filter = match cli.verbose {
            1 => "debug",
            _ => "trace",
        };
        tracing_config = tracing_config.with_filter(filter);
    }
    init_tracing(&tracing_config)?;

    let config = cli.into_config().context("Invalid configuration")?;
    tracing::info!(
        namespace = %config.namespace,
        sentinel_service = %config.sentinel_service,
        master = %config.monitor.master_name,
        "Starting redis-pilot"
    );

    let directory = Arc::new(KubeDirectory::new(&config.namespace));
    let sentinel = Arc::new(RedisCliSentinel::from_config(&config));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping bootstrap");
            on_signal.cancel();
        }
    });

    let plan = Bootstrap::new(config, directory, sentinel)
        .run(&cancel)
        .await
        .context("Bootstrap failed")?;

    let mut child = plan.spawn()?;
    let status = child.wait().await.context("Failed to wait for redis-server")?;
    tracing::info!(%status, "redis-server exited");

    std::process::exit(status.code().unwrap_or(1));
}
