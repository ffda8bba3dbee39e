//! Current primary lookup.
//!
//! Two sources are consulted in order:
//!
//! 1. Sentinel. Once a quorum is running it tracks failovers, so its answer
//!    wins whenever it maps onto a live pod.
//! 2. The primary marker label, which is the only signal before sentinel
//!    exists or while it is still converging.

use crate::directory::PodDirectory;
use crate::error::PilotResult;
use crate::pod::{LabelSelector, PodRecord};
use crate::sentinel::SentinelQuery;
use std::sync::Arc;

/// Finds the pod currently acting as primary.
#[derive(Clone)]
pub struct MasterResolver {
    directory: Arc<dyn PodDirectory>,
    sentinel: Arc<dyn SentinelQuery>,
    selector: LabelSelector,
    master_name: String,
}

impl MasterResolver {
    /// Create a resolver over the pods matching `selector`.
    pub fn new(
        directory: Arc<dyn PodDirectory>,
        sentinel: Arc<dyn SentinelQuery>,
        selector: LabelSelector,
        master_name: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            sentinel,
            selector,
            master_name: master_name.into(),
        }
    }

    /// Get the base selector.
    pub fn selector(&self) -> &LabelSelector {
        &self.selector
    }

    /// Resolve the current primary.
    ///
    /// Sentinel failures are logged and fall through to the label lookup.
    /// Directory failures are returned.
    pub async fn resolve(&self) -> PilotResult<Option<PodRecord>> {
        match self.sentinel.master_addr(&self.master_name).await {
            Ok(Some(record)) => {
                let pods = self.directory.list(&self.selector).await?;
                if let Some(pod) = pods.into_iter().find(|p| p.has_ip(&record.host)) {
                    tracing::debug!(
                        pod = %pod.name,
                        master = %record,
                        "Sentinel master matches pod"
                    );
                    return Ok(Some(pod));
                }
                tracing::debug!(master = %record, "Sentinel master matches no pod");
            }
            Ok(None) => {
                tracing::debug!(master = %self.master_name, "Sentinel knows no master");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    master = %self.master_name,
                    "Sentinel query failed, falling back to labels"
                );
            }
        }

        let masters = self.selector.masters();
        tracing::debug!(selector = %masters, "Checking pods by master label");
        let pods = self.directory.list(&masters).await?;
        Ok(pods.into_iter().next())
    }
}
