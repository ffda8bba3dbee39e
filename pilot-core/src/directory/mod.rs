//! Pod directory abstraction.
//!
//! The directory lists pods by label and persists label changes. It is only
//! eventually consistent, so callers re-check every record returned from
//! [`PodDirectory::update`] instead of trusting that the call succeeded.

mod k8s;

pub use k8s::KubeDirectory;

use crate::error::PilotResult;
use crate::pod::{LabelSelector, PodRecord};
use std::future::Future;
use std::pin::Pin;

/// A boxed future for async directory operations.
pub type DirectoryFuture<'a, T> = Pin<Box<dyn Future<Output = PilotResult<T>> + Send + 'a>>;

/// Source of pod snapshots for one namespace.
pub trait PodDirectory: Send + Sync {
    /// List every pod whose labels are a superset of `selector`.
    ///
    /// No ordering is guaranteed.
    fn list<'a>(&'a self, selector: &'a LabelSelector) -> DirectoryFuture<'a, Vec<PodRecord>>;

    /// Persist the labels of `pod` and return the record as stored.
    ///
    /// Implementations may reject the write with
    /// [`PilotError::Conflict`](crate::error::PilotError::Conflict) when the
    /// snapshot is stale, or may return a record that does not carry the
    /// requested labels.
    fn update<'a>(&'a self, pod: &'a PodRecord) -> DirectoryFuture<'a, PodRecord>;
}
