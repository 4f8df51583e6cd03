//! Run configuration.
//!
//! Everything here comes from the command line (or its environment
//! fallbacks); nothing is persisted between runs.

use std::path::PathBuf;
use std::time::Duration;

/// Default number of checks evaluated concurrently within one tier.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default upper bound for a whole run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// How to reach the control plane.
#[derive(Debug, Clone, Default)]
pub struct ClusterConnection {
    /// Explicit kubeconfig; falls back to in-cluster or default inference.
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use instead of the current one.
    pub context: Option<String>,
}

/// Knobs for one pass of the pipeline.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Apply remediation actions instead of only suggesting them.
    pub remediate: bool,
    /// Maximum checks in flight within a tier.
    pub concurrency: usize,
    /// Whole-run deadline; unfinished checks are reported as skipped.
    pub run_timeout: Duration,
    /// Replaces every action's settle interval when set.
    pub settle_override: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            remediate: false,
            concurrency: DEFAULT_CONCURRENCY,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            settle_override: None,
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn with_remediation(mut self, remediate: bool) -> Self {
        self.remediate = remediate;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_settle_override(mut self, settle: Duration) -> Self {
        self.settle_override = Some(settle);
        self
    }
}
