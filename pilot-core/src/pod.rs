//! Pod snapshots and label selectors.
//!
//! The sidecar never owns pod state. It reads [`PodRecord`] snapshots from a
//! [`PodDirectory`](crate::directory::PodDirectory) and requests label changes.

use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::fmt;

/// Label marking the pod that should run as primary.
pub const MASTER_LABEL: &str = "master";

/// Value of [`MASTER_LABEL`] on the primary.
pub const MASTER_LABEL_TRUE: &str = "true";

/// Pod lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PodPhase {
    /// Accepted but not all containers are running.
    Pending,
    /// Bound to a node and all containers started.
    Running,
    /// All containers terminated and at least one failed.
    Failed,
    /// All containers terminated successfully.
    Succeeded,
    /// State could not be obtained.
    #[default]
    Unknown,
}

impl PodPhase {
    /// Parse the Kubernetes phase string.
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Failed" => Self::Failed,
            "Succeeded" => Self::Succeeded,
            _ => Self::Unknown,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Failed => "Failed",
            Self::Succeeded => "Succeeded",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a pod as seen by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PodRecord {
    /// Pod name.
    pub name: String,
    /// Pod IP, if one has been assigned.
    pub ip: Option<String>,
    /// Lifecycle phase.
    pub phase: PodPhase,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Version of the record this snapshot was read at.
    pub resource_version: Option<String>,
}

impl PodRecord {
    /// Create a record with no IP and no labels.
    pub fn new(name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            ..Default::default()
        }
    }

    /// Set the pod IP.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Mark this pod as primary.
    pub fn with_master_label(self) -> Self {
        self.with_label(MASTER_LABEL, MASTER_LABEL_TRUE)
    }

    /// Whether the pod carries the primary marker with the true value.
    pub fn is_marked_master(&self) -> bool {
        self.labels.get(MASTER_LABEL).map(String::as_str) == Some(MASTER_LABEL_TRUE)
    }

    /// Whether the pod is running.
    pub fn is_running(&self) -> bool {
        self.phase == PodPhase::Running
    }

    /// Whether the pod's IP equals `host`.
    pub fn has_ip(&self, host: &str) -> bool {
        self.ip.as_deref() == Some(host)
    }
}

impl From<&Pod> for PodRecord {
    fn from(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            ip: status.and_then(|s| s.pod_ip.clone()),
            phase: status
                .and_then(|s| s.phase.as_deref())
                .map(PodPhase::parse)
                .unwrap_or_default(),
            labels: pod.metadata.labels.clone().unwrap_or_default(),
            resource_version: pod.metadata.resource_version.clone(),
        }
    }
}

/// Required label key/value pairs used to query the directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector {
    labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Create a selector from a base label set.
    pub fn new(labels: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    /// Return a copy with one extra constraint merged in.
    ///
    /// An existing key is overridden by the extra value.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut labels = self.labels.clone();
        labels.insert(key.into(), value.into());
        Self { labels }
    }

    /// Return a copy constrained to pods carrying the primary marker.
    pub fn masters(&self) -> Self {
        self.with(MASTER_LABEL, MASTER_LABEL_TRUE)
    }

    /// Whether `labels` is a superset of this selector.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }

    /// Whether the selector has no constraints.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate over the required pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.labels.iter()
    }

    /// Render as a Kubernetes equality-based selector string.
    pub fn to_query(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}
