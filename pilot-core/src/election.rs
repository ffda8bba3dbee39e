//! Primary election by label.
//!
//! When no primary is known, one pod is marked with the primary label through
//! a read-modify-write against the directory. This is single-writer-wins:
//! a claimant whose write is rejected, or whose returned record does not
//! carry the marker, simply retries on the next poll. The marker only drives
//! role selection at startup, so a lost race never touches data.

use crate::directory::PodDirectory;
use crate::error::{PilotError, PilotResult};
use crate::pod::{LabelSelector, MASTER_LABEL, MASTER_LABEL_TRUE, PodRecord};
use std::sync::Arc;

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// A primary was already marked.
    Found(PodRecord),
    /// This process marked the pod as primary.
    Claimed(PodRecord),
    /// No candidate, or the claim was lost.
    Retry,
}

/// Marks a pod as primary when none exists.
#[derive(Clone)]
pub struct ElectionCoordinator {
    directory: Arc<dyn PodDirectory>,
    selector: LabelSelector,
}

impl ElectionCoordinator {
    /// Create a coordinator over the pods matching `selector`.
    pub fn new(directory: Arc<dyn PodDirectory>, selector: LabelSelector) -> Self {
        Self {
            directory,
            selector,
        }
    }

    /// Try to mark a pod as primary.
    ///
    /// Every claimant targets the first listed pod, so concurrent writers
    /// contend on the same record and at most one of them wins. Conflicts are reported as [`ElectionOutcome::Retry`]; other directory
    /// failures are returned.
    pub async fn claim(&self) -> PilotResult<ElectionOutcome> {
        let pods = self.directory.list(&self.selector).await?;

        if let Some(existing) = pods.iter().find(|p| p.is_marked_master()) {
            tracing::info!(pod = %existing.name, "Master already marked by another claimant");
            return Ok(ElectionOutcome::Found(existing.clone()));
        }

        let mut candidate = match pods.into_iter().next() {
            Some(pod) => pod,
            None => {
                tracing::warn!(selector = %self.selector, "No candidate pods to mark as master");
                return Ok(ElectionOutcome::Retry);
            }
        };

        tracing::info!(pod = %candidate.name, "Master not found, marking pod as master");
        candidate
            .labels
            .insert(MASTER_LABEL.to_string(), MASTER_LABEL_TRUE.to_string());

        let updated = match self.directory.update(&candidate).await {
            Ok(updated) => updated,
            Err(PilotError::Conflict { pod }) => {
                tracing::info!(pod = %pod, "Lost master claim to a concurrent writer");
                return Ok(ElectionOutcome::Retry);
            }
            Err(e) => return Err(e),
        };

        // The call succeeding is not enough: the stored record must say so.
        if !updated.is_marked_master() {
            tracing::warn!(pod = %updated.name, "Can not set pod as master");
            return Ok(ElectionOutcome::Retry);
        }

        tracing::info!(
            pod = %updated.name,
            host = updated.ip.as_deref().unwrap_or("<none>"),
            "Pod marked as master"
        );
        Ok(ElectionOutcome::Claimed(updated))
    }
}
