//! Cluster state access.
//!
//! [`ClusterState`] is the narrow read/write facade the engine talks to. It
//! knows nothing about the resource taxonomy being checked; it answers
//! "exists / how many / how many ready / is this URL up" and executes
//! remediation actions.

pub mod actions;
pub mod k8s;
pub mod probe;
pub mod readiness;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{RemediationAction, ResourceRef, SelectorRef};

pub use k8s::KubeClusterState;
pub use probe::EndpointProber;

/// Errors from read queries against the control plane.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// The control plane cannot be reached. No check can proceed.
    #[error("control plane unreachable: {0}")]
    Connectivity(String),

    /// The control plane answered but the query failed (e.g. forbidden).
    #[error("query failed: {0}")]
    Query(String),
}

impl ClusterError {
    /// Whether this error must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

/// Errors raised by a remediation action.
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("invalid manifest {source_name}: {message}")]
    Manifest {
        source_name: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout_secs}s")]
    CommandTimedOut { command: String, timeout_secs: u64 },

    #[error("{api_version} {kind} is not served by the cluster")]
    UnsupportedKind { api_version: String, kind: String },
}

/// Ready and total instance counts for a selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: u32,
    pub total: u32,
}

impl Readiness {
    #[must_use]
    pub fn new(ready: u32, total: u32) -> Self {
        Self { ready, total }
    }

    /// Fraction of ready instances; `None` when nothing matched.
    #[must_use]
    pub fn ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| f64::from(self.ready) / f64::from(self.total))
    }

    /// Absence is not readiness: an empty set never meets any threshold.
    #[must_use]
    pub fn meets(&self, threshold: f64) -> bool {
        self.ratio().is_some_and(|ratio| ratio >= threshold)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ready", self.ready, self.total)
    }
}

/// Result of probing an HTTP endpoint. Probing never fails as such.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Reachable,
    UnexpectedStatus(u16),
    TimedOut,
    Unreachable(String),
}

impl ProbeOutcome {
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reachable => write!(f, "reachable"),
            Self::UnexpectedStatus(status) => write!(f, "unexpected HTTP status {status}"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Unreachable(reason) => write!(f, "unreachable: {reason}"),
        }
    }
}

/// Read/write facade over the control plane.
///
/// Implementations must be safe to share across the concurrent checks of a
/// tier; no per-call state may leak between calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterState: Send + Sync {
    /// Verify the control plane answers at all.
    async fn ping(&self) -> Result<(), ClusterError>;

    /// Whether the named resource exists. Unknown kinds do not exist.
    async fn exists(&self, resource: &ResourceRef) -> Result<bool, ClusterError>;

    /// Number of resources matching the selector.
    async fn count(&self, selector: &SelectorRef) -> Result<u32, ClusterError>;

    /// Ready and total counts for resources matching the selector.
    async fn readiness(&self, selector: &SelectorRef) -> Result<Readiness, ClusterError>;

    /// Probe an HTTP endpoint. Network failures are outcomes, not errors.
    async fn probe(&self, url: &str, expected_status: u16, timeout: Duration) -> ProbeOutcome;

    /// Execute a remediation action. Must be safe to call repeatedly.
    async fn apply(&self, action: &RemediationAction) -> Result<(), RemediationError>;
}
