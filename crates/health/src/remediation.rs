//! Remediation of failing checks.
//!
//! Per failing, remediable check the engine walks a fixed state machine:
//!
//! ```text
//! Failed -> Applying -> Settling -> Reverifying -> Remediated
//!              |                         |
//!              +------> RemediationFailed <+
//! ```
//!
//! The re-check runs exactly once. A second failure is reported to the
//! operator instead of retried so a persistent root cause (a wrong credential
//! rather than a missing one) stays visible.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{CheckSpec, RemediationAction};
use crate::cluster::{ClusterError, ClusterState};
use crate::executor::CheckExecutor;
use crate::report::{CheckResult, CheckStatus};

/// States of a single remediation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationPhase {
    Failed,
    Applying,
    Settling,
    Reverifying,
    Remediated,
    RemediationFailed,
}

impl RemediationPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Remediated | Self::RemediationFailed)
    }
}

impl fmt::Display for RemediationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Failed => "failed",
            Self::Applying => "applying",
            Self::Settling => "settling",
            Self::Reverifying => "reverifying",
            Self::Remediated => "remediated",
            Self::RemediationFailed => "remediation-failed",
        };
        f.write_str(name)
    }
}

/// Remediation information attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationNote {
    pub action: String,
    pub description: String,
    /// Literal command an operator can run by hand.
    pub command: String,
    /// False when auto-remediation was off and this is only a suggestion.
    pub attempted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<RemediationPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemediationNote {
    fn new(action_name: &str, description: &str, action: &RemediationAction) -> Self {
        Self {
            action: action_name.to_string(),
            description: description.to_string(),
            command: action.command(),
            attempted: false,
            phases: Vec::new(),
            error: None,
        }
    }

    /// Number of times the check was re-evaluated after the action.
    #[must_use]
    pub fn reverify_count(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| **p == RemediationPhase::Reverifying)
            .count()
    }
}

/// Converts `Failed` results into `Remediated` or `RemediationFailed`.
pub struct RemediationEngine {
    cluster: Arc<dyn ClusterState>,
    executor: CheckExecutor,
    actions: BTreeMap<String, RemediationAction>,
    enabled: bool,
    settle_override: Option<Duration>,
    attempted: Mutex<HashSet<String>>,
}

impl RemediationEngine {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterState>,
        actions: BTreeMap<String, RemediationAction>,
        enabled: bool,
    ) -> Self {
        Self {
            executor: CheckExecutor::new(Arc::clone(&cluster)),
            cluster,
            actions,
            enabled,
            settle_override: None,
            attempted: Mutex::new(HashSet::new()),
        }
    }

    /// Replace every action's settle interval.
    #[must_use]
    pub fn with_settle_override(mut self, settle: Option<Duration>) -> Self {
        self.settle_override = settle;
        self
    }

    /// Record an attempt for `check_id`; false if one was already made.
    fn claim_attempt(&self, check_id: &str) -> bool {
        self.attempted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(check_id.to_string())
    }

    /// Handle a `Failed` result for `spec`.
    ///
    /// Observational checks come back unchanged. With auto-remediation off the
    /// result gains a suggestion but stays `Failed`.
    ///
    /// # Errors
    ///
    /// Only a fatal [`ClusterError`] raised while re-verifying is returned.
    pub async fn remediate(
        &self,
        spec: &CheckSpec,
        mut failed: CheckResult,
    ) -> Result<CheckResult, ClusterError> {
        if failed.status != CheckStatus::Failed {
            return Ok(failed);
        }
        let Some(remediation) = &spec.remediation else {
            return Ok(failed);
        };
        let Some(action) = self.actions.get(&remediation.action) else {
            warn!(check = %spec.id, action = %remediation.action, "Unknown remediation action");
            return Ok(failed);
        };

        let mut note = RemediationNote::new(&remediation.action, &remediation.description, action);

        if !self.enabled {
            info!(
                check = %spec.id,
                fix = %note.description,
                command = %note.command,
                "Remediation available (auto-remediation disabled)"
            );
            failed.remediation = Some(note);
            return Ok(failed);
        }

        // No action runs on a refused attempt, so the check stays `Failed`;
        // `RemediationFailed` is reserved for actions that actually ran.
        if !self.claim_attempt(&spec.id) {
            warn!(check = %spec.id, "Remediation already attempted in this run");
            note.error = Some("remediation already attempted in this run".to_string());
            failed.remediation = Some(note);
            return Ok(failed);
        }
        note.attempted = true;

        let settle = self.settle_override.unwrap_or_else(|| action.settle());
        let mut phase = RemediationPhase::Failed;
        let mut recheck: Option<CheckResult> = None;
        note.phases.push(phase);

        while !phase.is_terminal() {
            phase = match phase {
                RemediationPhase::Failed => RemediationPhase::Applying,
                RemediationPhase::Applying => {
                    info!(check = %spec.id, action = %remediation.action, "Applying remediation");
                    match self.cluster.apply(action).await {
                        Ok(()) => RemediationPhase::Settling,
                        Err(e) => {
                            warn!(check = %spec.id, error = %e, "Remediation action failed");
                            note.error = Some(e.to_string());
                            RemediationPhase::RemediationFailed
                        }
                    }
                }
                RemediationPhase::Settling => {
                    debug!(
                        check = %spec.id,
                        settle_secs = settle.as_secs(),
                        "Waiting for changes to settle"
                    );
                    tokio::time::sleep(settle).await;
                    RemediationPhase::Reverifying
                }
                RemediationPhase::Reverifying => {
                    let result = self.executor.evaluate(spec).await?;
                    let next = if result.status == CheckStatus::Passed {
                        RemediationPhase::Remediated
                    } else {
                        RemediationPhase::RemediationFailed
                    };
                    recheck = Some(result);
                    next
                }
                RemediationPhase::Remediated | RemediationPhase::RemediationFailed => phase,
            };
            note.phases.push(phase);
        }

        let mut result = match recheck {
            Some(mut result) => {
                result.detail = if phase == RemediationPhase::Remediated {
                    format!("{} (was: {})", result.detail, failed.detail)
                } else {
                    format!("still failing after remediation: {}", result.detail)
                };
                result
            }
            None => failed,
        };

        if phase == RemediationPhase::Remediated {
            info!(check = %spec.id, "Remediation confirmed");
            result.status = CheckStatus::Remediated;
        } else {
            warn!(check = %spec.id, "Remediation did not fix the check");
            result.status = CheckStatus::RemediationFailed;
        }
        result.remediation = Some(note);
        Ok(result)
    }
}
