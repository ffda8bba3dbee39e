//! Error types for the bootstrap sidecar.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while discovering, electing or launching a primary.
#[derive(Debug, Error)]
pub enum PilotError {
    /// The Kubernetes client could not be constructed.
    #[error("Kubernetes client initialization failed: {0}")]
    ClientInit(String),

    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Generic pod directory failure (list or update).
    #[error("Pod directory error: {0}")]
    Directory(String),

    /// A label update was rejected because another writer changed the pod first.
    #[error("Update conflict on pod {pod}")]
    Conflict {
        /// Pod name.
        pod: String,
    },

    /// The sentinel query did not complete in time and was killed.
    #[error("Sentinel query timed out after {0:?}")]
    SentinelTimeout(Duration),

    /// The sentinel query could not be executed or exited with an error.
    #[error("Sentinel query failed: {0}")]
    SentinelTransport(String),

    /// The sentinel reply could not be parsed.
    #[error("Malformed sentinel reply: {0}")]
    SentinelReply(String),

    /// The sentinel configuration file could not be written.
    #[error("Failed to write sentinel config {path}: {source}")]
    ConfigWrite {
        /// Target path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The server process could not be started.
    #[error("Launch failed: {0}")]
    Launch(String),

    /// The bootstrap loop was cancelled before reaching a launchable state.
    #[error("Bootstrap cancelled")]
    Cancelled,
}

/// Result type for sidecar operations.
pub type PilotResult<T> = Result<T, PilotError>;

impl PilotError {
    /// Whether this error must abort startup.
    ///
    /// Everything that is not fatal is absorbed by the polling loop and
    /// retried on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigWrite { .. } | Self::InvalidConfig(_) | Self::Launch(_) | Self::Cancelled
        )
    }

    /// Whether this error comes from client construction.
    pub fn is_client_init(&self) -> bool {
        matches!(self, Self::ClientInit(_))
    }
}
