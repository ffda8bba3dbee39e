//! Server launch arguments.

use crate::config::PilotConfig;
use crate::error::{PilotError, PilotResult};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Argument that switches the redis server into sentinel mode.
pub const SENTINEL_MODE_ARG: &str = "--sentinel";

/// Role the server is started in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Sentinel monitoring the primary.
    Sentinel {
        /// Rendered sentinel configuration.
        config_path: PathBuf,
    },
    /// Replica following the primary.
    Replica {
        /// Primary host.
        host: String,
        /// Primary port.
        port: u16,
    },
    /// The primary itself.
    Primary,
}

/// Final program and arguments for the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Server binary.
    pub program: PathBuf,
    /// Full argument list.
    pub args: Vec<String>,
    /// Role the arguments encode.
    pub role: Role,
}

impl LaunchPlan {
    /// Sentinel: config path first, `--sentinel` present exactly once.
    pub fn sentinel(config: &PilotConfig, config_path: PathBuf) -> Self {
        let mut args = Vec::with_capacity(config.args.len() + 2);
        args.push(config_path.display().to_string());
        args.extend(config.args.iter().cloned());
        if !config.args.iter().any(|a| a == SENTINEL_MODE_ARG) {
            args.push(SENTINEL_MODE_ARG.to_string());
        }

        Self {
            program: config.redis_server.clone(),
            args,
            role: Role::Sentinel { config_path },
        }
    }

    /// Replica: replication flag with host and port appended.
    pub fn replica(config: &PilotConfig, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let mut args = config.args.clone();
        args.push(config.replication_flag.clone());
        args.push(host.clone());
        args.push(port.to_string());

        Self {
            program: config.redis_server.clone(),
            args,
            role: Role::Replica { host, port },
        }
    }

    /// Primary: pass-through arguments unchanged.
    pub fn primary(config: &PilotConfig) -> Self {
        Self {
            program: config.redis_server.clone(),
            args: config.args.clone(),
            role: Role::Primary,
        }
    }

    /// Whether the arguments carry the replication flag.
    pub fn replicates(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Start the server with inherited stdio.
    pub fn spawn(&self) -> PilotResult<Child> {
        tracing::info!(
            program = %self.program.display(),
            args = ?self.args,
            role = ?self.role,
            "Starting server"
        );

        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| PilotError::Launch(format!("{}: {}", self.program.display(), e)))
    }
}
