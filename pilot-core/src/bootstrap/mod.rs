//! Bootstrap state machine.
//!
//! Decides how the local redis server starts:
//!
//! ```text
//! SentinelMode ──(running master)──────────────────────────────▶ Launched
//!
//! PollingForMaster ──(running master)──▶ ReplicaReady ──────────▶ Launched
//!        │  ▲  ▲
//!        │  │  └──(master not running yet)
//!   (none found)
//!        ▼  │ (retry / found / error)
//! ClaimingMaster ──(claimed)────────────────────────────────────▶ Launched
//! ```
//!
//! Transient failures are logged and retried on the next tick. Only a config
//! write failure, repeated client initialization failure or cancellation
//! ends the loop early.

mod launch;

pub use launch::{LaunchPlan, Role, SENTINEL_MODE_ARG};

use crate::config::PilotConfig;
use crate::directory::PodDirectory;
use crate::election::{ElectionCoordinator, ElectionOutcome};
use crate::error::{PilotError, PilotResult};
use crate::pod::{LabelSelector, PodRecord};
use crate::resolver::MasterResolver;
use crate::sentinel::{SentinelConf, SentinelQuery};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// State of the bootstrap loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Waiting for a running primary to monitor.
    SentinelMode,
    /// Waiting for a running primary to replicate from.
    PollingForMaster,
    /// No primary known, trying to mark one.
    ClaimingMaster,
    /// A running primary was found.
    ReplicaReady(PodRecord),
    /// Arguments are final.
    Launched(LaunchPlan),
}

impl State {
    /// Whether the loop waits one tick before handling this state.
    fn polls(&self) -> bool {
        matches!(self, Self::SentinelMode | Self::PollingForMaster)
    }
}

/// Drives discovery and election until the server can be launched.
pub struct Bootstrap {
    config: PilotConfig,
    resolver: MasterResolver,
    election: ElectionCoordinator,
    rng: StdRng,
    client_init_failures: u32,
}

impl Bootstrap {
    /// Create a bootstrap over the given directory and sentinel.
    pub fn new(
        config: PilotConfig,
        directory: Arc<dyn PodDirectory>,
        sentinel: Arc<dyn SentinelQuery>,
    ) -> Self {
        let selector = LabelSelector::new(config.labels.clone());
        let resolver = MasterResolver::new(
            directory.clone(),
            sentinel,
            selector.clone(),
            config.monitor.master_name.clone(),
        );
        let election = ElectionCoordinator::new(directory, selector);

        Self {
            config,
            resolver,
            election,
            rng: StdRng::from_entropy(),
            client_init_failures: 0,
        }
    }

    /// Use a seeded RNG for the poll jitter.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    /// Whether the server starts as a sentinel.
    pub fn sentinel_mode(&self) -> bool {
        self.config.sentinel || self.config.args.iter().any(|a| a == SENTINEL_MODE_ARG)
    }

    /// Starting state.
    pub fn initial_state(&self) -> State {
        if self.sentinel_mode() {
            State::SentinelMode
        } else {
            State::PollingForMaster
        }
    }

    /// Interval between polls.
    ///
    /// Sentinel mode polls on a fixed beat. Replicas draw from the jitter
    /// window so that pods started together do not race on every tick.
    pub fn tick_interval(&mut self) -> Duration {
        if self.sentinel_mode() {
            return self.config.sentinel_interval();
        }
        let (min, max) = self.config.jitter();
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    /// Run until the server can be launched.
    ///
    /// Returns [`PilotError::Cancelled`] if `cancel` fires first.
    pub async fn run(&mut self, cancel: &CancellationToken) -> PilotResult<LaunchPlan> {
        let interval = self.tick_interval();
        let mut state = self.initial_state();
        tracing::info!(
            state = ?state,
            interval_ms = interval.as_millis() as u64,
            selector = %self.resolver.selector(),
            "Starting bootstrap"
        );

        loop {
            if let State::Launched(plan) = state {
                return Ok(plan);
            }

            if state.polls() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(PilotError::Cancelled),
                    _ = tokio::time::sleep(interval) => {}
                }
            }

            state = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PilotError::Cancelled),
                next = self.step(state) => next?,
            };
        }
    }

    /// Perform one transition.
    ///
    /// Returns an error only for failures that must abort startup.
    pub async fn step(&mut self, state: State) -> PilotResult<State> {
        match state {
            State::SentinelMode => self.step_sentinel().await,
            State::PollingForMaster => self.step_polling().await,
            State::ClaimingMaster => self.step_claiming().await,
            State::ReplicaReady(master) => {
                // Running masters always have an IP; step_polling checks it.
                let host = master.ip.unwrap_or_default();
                tracing::info!(pod = %master.name, host = %host, "Master server found");
                Ok(State::Launched(LaunchPlan::replica(
                    &self.config,
                    host,
                    self.config.redis_port,
                )))
            }
            State::Launched(plan) => Ok(State::Launched(plan)),
        }
    }

    async fn step_sentinel(&mut self) -> PilotResult<State> {
        let master = match self.resolver.resolve().await {
            Ok(master) => {
                self.client_init_failures = 0;
                master
            }
            Err(e) => {
                self.absorb(e)?;
                return Ok(State::SentinelMode);
            }
        };

        let (master, host) = match master {
            Some(pod) if pod.is_running() && pod.ip.is_some() => {
                let host = pod.ip.clone().unwrap_or_default();
                (pod, host)
            }
            Some(pod) => {
                tracing::debug!(pod = %pod.name, phase = %pod.phase, "Master not running yet");
                return Ok(State::SentinelMode);
            }
            None => {
                tracing::debug!("Waiting for master");
                return Ok(State::SentinelMode);
            }
        };

        let conf = SentinelConf::new(self.config.monitor.clone(), host, self.config.redis_port);
        let path = match conf.write(&self.config.sentinel_config_path).await {
            Ok(path) => path,
            Err(e) => {
                self.absorb(e)?;
                return Ok(State::SentinelMode);
            }
        };

        tracing::info!(pod = %master.name, "Sentinel mode active");
        Ok(State::Launched(LaunchPlan::sentinel(&self.config, path)))
    }

    async fn step_polling(&mut self) -> PilotResult<State> {
        tracing::debug!("Waiting for master server");
        match self.resolver.resolve().await {
            Ok(Some(pod)) if pod.is_running() && pod.ip.is_some() => {
                self.client_init_failures = 0;
                Ok(State::ReplicaReady(pod))
            }
            Ok(Some(pod)) => {
                self.client_init_failures = 0;
                tracing::debug!(pod = %pod.name, phase = %pod.phase, "Master not running yet");
                Ok(State::PollingForMaster)
            }
            Ok(None) => {
                self.client_init_failures = 0;
                tracing::info!("Master server not found, trying to claim one");
                Ok(State::ClaimingMaster)
            }
            Err(e) => {
                self.absorb(e)?;
                Ok(State::PollingForMaster)
            }
        }
    }

    async fn step_claiming(&mut self) -> PilotResult<State> {
        match self.election.claim().await {
            Ok(ElectionOutcome::Claimed(pod)) => {
                self.client_init_failures = 0;
                tracing::info!(pod = %pod.name, "Starting as master");
                Ok(State::Launched(LaunchPlan::primary(&self.config)))
            }
            Ok(ElectionOutcome::Found(pod)) => {
                self.client_init_failures = 0;
                tracing::debug!(pod = %pod.name, "Master appeared during claim");
                Ok(State::PollingForMaster)
            }
            Ok(ElectionOutcome::Retry) => {
                self.client_init_failures = 0;
                Ok(State::PollingForMaster)
            }
            Err(e) => {
                self.absorb(e)?;
                Ok(State::PollingForMaster)
            }
        }
    }

    /// Log a failure and decide whether the loop may continue.
    fn absorb(&mut self, err: PilotError) -> PilotResult<()> {
        if err.is_fatal() {
            tracing::error!(error = %err, "Fatal bootstrap failure");
            return Err(err);
        }

        if err.is_client_init() {
            self.client_init_failures += 1;
            if self.client_init_failures >= self.config.max_client_init_failures {
                tracing::error!(
                    error = %err,
                    attempts = self.client_init_failures,
                    "Kubernetes client unavailable, giving up"
                );
                return Err(err);
            }
        }

        tracing::warn!(error = %err, "Transient failure, retrying on next tick");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::PodPhase;
    use crate::testing::{MemoryDirectory, StaticSentinel};

    fn pod(name: &str, ip: &str, phase: PodPhase) -> PodRecord {
        PodRecord::new(name, phase)
            .with_ip(ip)
            .with_label("app", "redis")
    }

    fn config() -> PilotConfig {
        PilotConfig::builder().label("app", "redis").build().unwrap()
    }

    fn bootstrap(
        config: PilotConfig,
        directory: &Arc<MemoryDirectory>,
        sentinel: &Arc<StaticSentinel>,
    ) -> Bootstrap {
        Bootstrap::new(config, directory.clone(), sentinel.clone()).with_seed(7)
    }

    #[test]
    fn test_initial_state() {
        let directory = Arc::new(MemoryDirectory::new());
        let sentinel = Arc::new(StaticSentinel::unreachable());

        let replica = bootstrap(config(), &directory, &sentinel);
        assert_eq!(replica.initial_state(), State::PollingForMaster);

        let mut forced = config();
        forced.sentinel = true;
        assert_eq!(
            bootstrap(forced, &directory, &sentinel).initial_state(),
            State::SentinelMode
        );

        let mut by_arg = config();
        by_arg.args = vec!["--sentinel".into()];
        assert_eq!(
            bootstrap(by_arg, &directory, &sentinel).initial_state(),
            State::SentinelMode
        );
    }

    #[test]
    fn test_tick_interval_within_window() {
        let directory = Arc::new(MemoryDirectory::new());
        let sentinel = Arc::new(StaticSentinel::unreachable());
        let mut boot = bootstrap(config(), &directory, &sentinel);

        for _ in 0..100 {
            let interval = boot.tick_interval();
            assert!(interval >= Duration::from_secs(2));
            assert!(interval < Duration::from_secs(7));
        }

        let mut sentinel_config = config();
        sentinel_config.sentinel = true;
        let mut boot = bootstrap(sentinel_config, &directory, &sentinel);
        assert_eq!(boot.tick_interval(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_polling_transitions() {
        let directory = Arc::new(MemoryDirectory::with_pods([pod(
            "redis-0",
            "10.0.0.5",
            PodPhase::Pending,
        )
        .with_master_label()]));
        let sentinel = Arc::new(StaticSentinel::unreachable());
        let mut boot = bootstrap(config(), &directory, &sentinel);

        // Designated but not running: keep polling, do not claim.
        let next = boot.step(State::PollingForMaster).await.unwrap();
        assert_eq!(next, State::PollingForMaster);
        assert_eq!(directory.update_calls(), 0);

        directory.set_phase("redis-0", PodPhase::Running);
        let next = boot.step(State::PollingForMaster).await.unwrap();
        assert!(matches!(next, State::ReplicaReady(ref p) if p.name == "redis-0"));

        let launched = boot.step(next).await.unwrap();
        match launched {
            State::Launched(plan) => {
                assert_eq!(plan.args, vec!["--replicate-from", "10.0.0.5", "6379"]);
            }
            other => panic!("expected Launched, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_polling_without_master_moves_to_claim() {
        let directory = Arc::new(MemoryDirectory::with_pods([pod(
            "redis-0",
            "10.0.0.5",
            PodPhase::Running,
        )]));
        let sentinel = Arc::new(StaticSentinel::empty());
        let mut boot = bootstrap(config(), &directory, &sentinel);

        assert_eq!(
            boot.step(State::PollingForMaster).await.unwrap(),
            State::ClaimingMaster
        );
        let next = boot.step(State::ClaimingMaster).await.unwrap();
        assert!(matches!(next, State::Launched(ref plan) if plan.role == Role::Primary));
    }

    #[tokio::test]
    async fn test_claim_failure_returns_to_polling() {
        let directory = Arc::new(MemoryDirectory::new());
        let sentinel = Arc::new(StaticSentinel::empty());
        let mut boot = bootstrap(config(), &directory, &sentinel);

        assert_eq!(
            boot.step(State::ClaimingMaster).await.unwrap(),
            State::PollingForMaster
        );

        directory.fail_lists(1);
        assert_eq!(
            boot.step(State::ClaimingMaster).await.unwrap(),
            State::PollingForMaster
        );
    }

    #[tokio::test]
    async fn test_directory_errors_are_absorbed() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.fail_lists(3);
        let sentinel = Arc::new(StaticSentinel::unreachable());
        let mut boot = bootstrap(config(), &directory, &sentinel);

        for _ in 0..3 {
            assert_eq!(
                boot.step(State::PollingForMaster).await.unwrap(),
                State::PollingForMaster
            );
        }
    }

    #[tokio::test]
    async fn test_persistent_client_init_failure_is_fatal() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.fail_client_init(10);
        let sentinel = Arc::new(StaticSentinel::unreachable());
        let mut cfg = config();
        cfg.max_client_init_failures = 3;
        let mut boot = bootstrap(cfg, &directory, &sentinel);

        assert!(boot.step(State::PollingForMaster).await.is_ok());
        assert!(boot.step(State::PollingForMaster).await.is_ok());
        let err = boot.step(State::PollingForMaster).await.unwrap_err();
        assert!(err.is_client_init());
    }

    #[tokio::test]
    async fn test_client_init_budget_resets_on_success() {
        let directory = Arc::new(MemoryDirectory::new());
        let sentinel = Arc::new(StaticSentinel::unreachable());
        let mut cfg = config();
        cfg.max_client_init_failures = 2;
        let mut boot = bootstrap(cfg, &directory, &sentinel);

        directory.fail_client_init(1);
        assert!(boot.step(State::PollingForMaster).await.is_ok());
        // A successful poll in between clears the count.
        assert!(boot.step(State::PollingForMaster).await.is_ok());
        directory.fail_client_init(1);
        assert!(boot.step(State::PollingForMaster).await.is_ok());
    }

    #[tokio::test]
    async fn test_sentinel_config_write_failure_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let directory = Arc::new(MemoryDirectory::with_pods([pod(
            "redis-0",
            "10.0.0.5",
            PodPhase::Running,
        )
        .with_master_label()]));
        let sentinel = Arc::new(StaticSentinel::empty());
        let mut cfg = config();
        cfg.sentinel = true;
        cfg.sentinel_config_path = dir.path().join("missing").join("sentinel.conf");
        let mut boot = bootstrap(cfg, &directory, &sentinel);

        let err = boot.step(State::SentinelMode).await.unwrap_err();
        assert!(matches!(err, PilotError::ConfigWrite { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let directory = Arc::new(MemoryDirectory::new());
        let sentinel = Arc::new(StaticSentinel::unreachable());
        let mut boot = bootstrap(config(), &directory, &sentinel);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = boot.run(&cancel).await.unwrap_err();
        assert!(matches!(err, PilotError::Cancelled));
        assert_eq!(directory.list_calls(), 0);
    }
}
