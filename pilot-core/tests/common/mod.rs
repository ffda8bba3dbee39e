//! Common test utilities for pilot-core tests.

use pilot_core::directory::{DirectoryFuture, PodDirectory};
use pilot_core::testing::{MemoryDirectory, StaticSentinel};
use pilot_core::{Bootstrap, LabelSelector, PilotConfig, PodPhase, PodRecord};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Barrier;

/// Label every test pod carries.
pub const APP: (&str, &str) = ("app", "redis");

/// A redis pod with the test selector labels.
pub fn pod(name: &str, ip: &str, phase: PodPhase) -> PodRecord {
    PodRecord::new(name, phase)
        .with_ip(ip)
        .with_label(APP.0, APP.1)
}

/// The base selector used by every test.
#[allow(dead_code)]
pub fn selector() -> LabelSelector {
    LabelSelector::new([(APP.0.to_string(), APP.1.to_string())])
}

/// Test context holding the collaborators of one bootstrap run.
#[allow(dead_code)]
pub struct TestPilot {
    /// Temp directory for the sentinel config (kept alive for the test).
    pub temp_dir: TempDir,
    /// Pod directory.
    pub directory: Arc<MemoryDirectory>,
    /// Sentinel.
    pub sentinel: Arc<StaticSentinel>,
    /// Configuration.
    pub config: PilotConfig,
}

#[allow(dead_code)]
impl TestPilot {
    /// Create a replica-mode context over `pods`.
    pub fn new(pods: impl IntoIterator<Item = PodRecord>, sentinel: StaticSentinel) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = PilotConfig::builder()
            .label(APP.0, APP.1)
            .sentinel_config_path(temp_dir.path().join("sentinel.conf"))
            .build()
            .expect("Invalid config");

        Self {
            temp_dir,
            directory: Arc::new(MemoryDirectory::with_pods(pods)),
            sentinel: Arc::new(sentinel),
            config,
        }
    }

    /// Switch to sentinel mode.
    pub fn sentinel_mode(mut self) -> Self {
        self.config.sentinel = true;
        self
    }

    /// Build a bootstrap over this context.
    pub fn bootstrap(&self) -> Bootstrap {
        Bootstrap::new(
            self.config.clone(),
            self.directory.clone(),
            self.sentinel.clone(),
        )
        .with_seed(42)
    }
}

/// Directory that holds every lister at a barrier until all have listed.
///
/// Lets several claimants read the same snapshot before any of them writes.
#[allow(dead_code)]
pub struct LockstepDirectory {
    inner: Arc<MemoryDirectory>,
    barrier: Barrier,
}

#[allow(dead_code)]
impl LockstepDirectory {
    /// Wrap `inner` for `parties` concurrent listers.
    pub fn new(inner: Arc<MemoryDirectory>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
        }
    }
}

impl PodDirectory for LockstepDirectory {
    fn list<'a>(&'a self, selector: &'a LabelSelector) -> DirectoryFuture<'a, Vec<PodRecord>> {
        Box::pin(async move {
            let pods = self.inner.list(selector).await;
            self.barrier.wait().await;
            pods
        })
    }

    fn update<'a>(&'a self, pod: &'a PodRecord) -> DirectoryFuture<'a, PodRecord> {
        self.inner.update(pod)
    }
}
