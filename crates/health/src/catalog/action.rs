//! Remediation action registry entries.
//!
//! Actions are named in the catalog's `actions` map and referenced by checks.
//! Each action is an idempotent mutation; the engine treats it as opaque and
//! only cares about success or failure.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settle interval after a manifest apply (plain resource creation).
const APPLY_SETTLE_SECS: u64 = 5;
/// Settle interval after an external command.
const COMMAND_SETTLE_SECS: u64 = 10;
/// Settle interval after anything that makes pods roll.
const ROLLOUT_SETTLE_SECS: u64 = 30;

/// Default wall-clock bound for `RunCommand` actions.
fn default_command_timeout() -> u64 {
    120
}

/// Workload kinds that support `kubectl rollout restart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::StatefulSet => write!(f, "statefulset"),
            Self::DaemonSet => write!(f, "daemonset"),
        }
    }
}

/// What a remediation action does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Server-side apply every YAML document from the given files and inline blobs.
    ApplyManifests {
        #[serde(default)]
        paths: Vec<PathBuf>,
        #[serde(default)]
        inline: Vec<String>,
    },
    /// Delete pods matching a selector so their controllers recreate them.
    DeletePods { namespace: String, selector: String },
    /// Bump the pod template restart annotation of a workload.
    RolloutRestart {
        kind: WorkloadKind,
        name: String,
        namespace: String,
    },
    /// Run an external setup procedure. Non-zero exit is a failure.
    RunCommand {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_command_timeout")]
        timeout_secs: u64,
    },
}

/// A named, idempotent mutation procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    #[serde(flatten)]
    pub kind: ActionKind,

    /// Override for the post-action settle interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_secs: Option<u64>,
}

impl RemediationAction {
    #[must_use]
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            settle_secs: None,
        }
    }

    /// Bounded wait between applying this action and re-verifying.
    ///
    /// Creating plain resources converges quickly; anything that restarts
    /// pods needs time for the rollout to make progress.
    #[must_use]
    pub fn settle(&self) -> Duration {
        let secs = self.settle_secs.unwrap_or(match self.kind {
            ActionKind::ApplyManifests { .. } => APPLY_SETTLE_SECS,
            ActionKind::RunCommand { .. } => COMMAND_SETTLE_SECS,
            ActionKind::DeletePods { .. } | ActionKind::RolloutRestart { .. } => {
                ROLLOUT_SETTLE_SECS
            }
        });
        Duration::from_secs(secs)
    }

    /// The literal command an operator can run to perform this action by hand.
    #[must_use]
    pub fn command(&self) -> String {
        match &self.kind {
            ActionKind::ApplyManifests { paths, inline } => {
                let mut cmd = String::from("kubectl apply --server-side");
                for path in paths {
                    cmd.push_str(" -f ");
                    cmd.push_str(&shell_quote(&path.display().to_string()));
                }
                if !inline.is_empty() {
                    cmd.push_str(" -f - <<'");
                    cmd.push_str(HEREDOC_DELIMITER);
                    cmd.push_str("'\n");
                    let documents: Vec<&str> = inline
                        .iter()
                        .map(|doc| doc.trim_start_matches("---").trim_matches('\n'))
                        .collect();
                    cmd.push_str(&documents.join("\n---\n"));
                    cmd.push('\n');
                    cmd.push_str(HEREDOC_DELIMITER);
                }
                cmd
            }
            ActionKind::DeletePods {
                namespace,
                selector,
            } => format!(
                "kubectl delete pods -n {namespace} -l {}",
                shell_quote(selector)
            ),
            ActionKind::RolloutRestart {
                kind,
                name,
                namespace,
            } => format!("kubectl rollout restart {kind}/{name} -n {namespace}"),
            ActionKind::RunCommand { program, args, .. } => std::iter::once(program.as_str())
                .chain(args.iter().map(String::as_str))
                .map(shell_quote)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Terminates the heredoc carrying inline manifests in a manual command.
const HEREDOC_DELIMITER: &str = "MANIFESTS";

/// Quote a shell word only when it needs it.
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
