//! In-memory pod directory.

use crate::directory::{DirectoryFuture, PodDirectory};
use crate::error::{PilotError, PilotResult};
use crate::pod::{LabelSelector, PodPhase, PodRecord};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Inner {
    pods: Vec<PodRecord>,
    version: u64,
}

impl Inner {
    fn next_version(&mut self) -> Option<String> {
        self.version += 1;
        Some(self.version.to_string())
    }
}

/// Pod directory held in memory.
///
/// Every stored record carries a resource version. An update whose snapshot
/// version is stale fails with [`PilotError::Conflict`], so of several
/// writers holding the same snapshot exactly one wins.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    inner: Mutex<Inner>,
    list_failures: AtomicUsize,
    client_init_failures: AtomicUsize,
    drop_updates: AtomicBool,
    list_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory holding `pods`.
    pub fn with_pods(pods: impl IntoIterator<Item = PodRecord>) -> Self {
        let directory = Self::new();
        for pod in pods {
            directory.insert(pod);
        }
        directory
    }

    /// Insert or replace a pod, assigning it a fresh version.
    pub fn insert(&self, mut pod: PodRecord) {
        let mut inner = self.inner.lock();
        pod.resource_version = inner.next_version();
        match inner.pods.iter_mut().find(|p| p.name == pod.name) {
            Some(existing) => *existing = pod,
            None => inner.pods.push(pod),
        }
    }

    /// Change the phase of a pod.
    pub fn set_phase(&self, name: &str, phase: PodPhase) {
        let mut inner = self.inner.lock();
        let version = inner.next_version();
        if let Some(pod) = inner.pods.iter_mut().find(|p| p.name == name) {
            pod.phase = phase;
            pod.resource_version = version;
        }
    }

    /// Get a pod by name.
    pub fn get(&self, name: &str) -> Option<PodRecord> {
        self.inner.lock().pods.iter().find(|p| p.name == name).cloned()
    }

    /// Number of pods carrying the primary marker.
    pub fn marked_masters(&self) -> usize {
        self.inner
            .lock()
            .pods
            .iter()
            .filter(|p| p.is_marked_master())
            .count()
    }

    /// Fail the next `n` list calls with a directory error.
    pub fn fail_lists(&self, n: usize) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls with a client initialization error.
    pub fn fail_client_init(&self, n: usize) {
        self.client_init_failures.store(n, Ordering::SeqCst);
    }

    /// Accept updates without applying them, returning the stored record.
    pub fn drop_updates(&self, drop: bool) {
        self.drop_updates.store(drop, Ordering::SeqCst);
    }

    /// Number of list calls served.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of update calls served.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn list_now(&self, selector: &LabelSelector) -> PilotResult<Vec<PodRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.client_init_failures) {
            return Err(PilotError::ClientInit("no service account token".into()));
        }
        if Self::take_failure(&self.list_failures) {
            return Err(PilotError::Directory("list failed".into()));
        }

        Ok(self
            .inner
            .lock()
            .pods
            .iter()
            .filter(|p| selector.matches(&p.labels))
            .cloned()
            .collect())
    }

    fn update_now(&self, pod: &PodRecord) -> PilotResult<PodRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.client_init_failures) {
            return Err(PilotError::ClientInit("no service account token".into()));
        }

        let mut inner = self.inner.lock();
        let index = inner
            .pods
            .iter()
            .position(|p| p.name == pod.name)
            .ok_or_else(|| PilotError::Directory(format!("pod {} not found", pod.name)))?;

        if self.drop_updates.load(Ordering::SeqCst) {
            return Ok(inner.pods[index].clone());
        }
        if inner.pods[index].resource_version != pod.resource_version {
            return Err(PilotError::Conflict {
                pod: pod.name.clone(),
            });
        }

        let version = inner.next_version();
        let stored = &mut inner.pods[index];
        stored.labels = pod.labels.clone();
        stored.resource_version = version;
        Ok(stored.clone())
    }
}

impl PodDirectory for MemoryDirectory {
    fn list<'a>(&'a self, selector: &'a LabelSelector) -> DirectoryFuture<'a, Vec<PodRecord>> {
        Box::pin(std::future::ready(self.list_now(selector)))
    }

    fn update<'a>(&'a self, pod: &'a PodRecord) -> DirectoryFuture<'a, PodRecord> {
        Box::pin(std::future::ready(self.update_now(pod)))
    }
}
