//! Redis bootstrap sidecar.
//!
//! Decides whether one replica pod in a group starts as the primary, as a
//! replica of an existing primary, or as a sentinel monitoring it, and
//! produces the final redis server arguments.
//!
//! # Components
//!
//! - [`MasterResolver`]: finds the current primary from sentinel, then labels
//! - [`ElectionCoordinator`]: marks a pod as primary when none is known
//! - [`Bootstrap`]: the polling state machine tying both together
//! - [`SentinelConf`]: renders `sentinel.conf`
//!
//! # Example
//!
//! ```ignore
//! use pilot_core::{Bootstrap, KubeDirectory, PilotConfig, RedisCliSentinel};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = PilotConfig::builder().label("app", "redis").build()?;
//! let directory = Arc::new(KubeDirectory::new(&config.namespace));
//! let sentinel = Arc::new(RedisCliSentinel::from_config(&config));
//!
//! let plan = Bootstrap::new(config, directory, sentinel)
//!     .run(&CancellationToken::new())
//!     .await?;
//! let status = plan.spawn()?.wait().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod election;
pub mod error;
pub mod observability;
pub mod pod;
pub mod resolver;
pub mod sentinel;
pub mod testing;

pub use bootstrap::{Bootstrap, LaunchPlan, Role, State};
pub use config::{MonitorConfig, PilotConfig, PilotConfigBuilder, PollingConfig};
pub use directory::{KubeDirectory, PodDirectory};
pub use election::{ElectionCoordinator, ElectionOutcome};
pub use error::{PilotError, PilotResult};
pub use pod::{LabelSelector, PodPhase, PodRecord};
pub use resolver::MasterResolver;
pub use sentinel::{MasterRecord, RedisCliSentinel, SentinelConf, SentinelQuery};
