//! Evaluation of a single check against current cluster state.
//!
//! The executor never mutates anything; it only classifies what it sees as
//! `Passed` or `Failed`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::catalog::{CheckKind, CheckSpec};
use crate::cluster::{ClusterError, ClusterState};
use crate::report::{CheckResult, CheckStatus, Observed};

/// Evaluates [`CheckSpec`]s against a [`ClusterState`].
#[derive(Clone)]
pub struct CheckExecutor {
    cluster: Arc<dyn ClusterState>,
}

impl CheckExecutor {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterState>) -> Self {
        Self { cluster }
    }

    /// Evaluate one check.
    ///
    /// # Errors
    ///
    /// Only [`ClusterError::Connectivity`] is returned; query errors become a
    /// `Failed` result carrying the error as detail.
    pub async fn evaluate(&self, spec: &CheckSpec) -> Result<CheckResult, ClusterError> {
        let result = match self.observe(spec).await {
            Ok(result) => result,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => CheckResult::new(
                spec,
                CheckStatus::Failed,
                Observed::Error {
                    message: err.to_string(),
                },
                err.to_string(),
            ),
        };

        match result.status {
            CheckStatus::Passed => {
                debug!(check = %spec.id, observed = %result.observed, "Check passed");
            }
            _ if result.advisory => {
                warn!(check = %spec.id, detail = %result.detail, "Advisory check failed");
            }
            _ => debug!(check = %spec.id, detail = %result.detail, "Check failed"),
        }

        Ok(result)
    }

    async fn observe(&self, spec: &CheckSpec) -> Result<CheckResult, ClusterError> {
        let result = match &spec.kind {
            CheckKind::Existence { resource } => {
                let present = self.cluster.exists(resource).await?;
                let (status, detail) = if present {
                    (CheckStatus::Passed, format!("{resource} found"))
                } else {
                    (CheckStatus::Failed, format!("{resource} not found"))
                };
                CheckResult::new(spec, status, Observed::Presence { present }, detail)
            }
            CheckKind::MinimumCount { selector, min } => {
                let count = self.cluster.count(selector).await?;
                let status = if count >= *min {
                    CheckStatus::Passed
                } else {
                    CheckStatus::Failed
                };
                CheckResult::new(
                    spec,
                    status,
                    Observed::Count { count, min: *min },
                    format!("{count} {selector} (minimum {min})"),
                )
            }
            CheckKind::ReadinessFraction { selector, ratio } => {
                let readiness = self.cluster.readiness(selector).await?;
                let status = if readiness.meets(*ratio) {
                    CheckStatus::Passed
                } else {
                    CheckStatus::Failed
                };
                let detail = if readiness.total == 0 {
                    format!("no {selector}")
                } else {
                    format!("{readiness} for {selector}")
                };
                CheckResult::new(spec, status, Observed::readiness(readiness, *ratio), detail)
            }
            CheckKind::EndpointReachable {
                url,
                expected_status,
                timeout_secs,
            } => {
                let outcome = self
                    .cluster
                    .probe(url, *expected_status, Duration::from_secs(*timeout_secs))
                    .await;
                let status = if outcome.is_reachable() {
                    CheckStatus::Passed
                } else {
                    CheckStatus::Failed
                };
                let detail = format!("{url}: {outcome}");
                CheckResult::new(spec, status, Observed::Probe { outcome }, detail)
            }
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ResourceRef, SelectorRef};
    use crate::cluster::{MockClusterState, ProbeOutcome, Readiness};

    fn pods() -> SelectorRef {
        SelectorRef {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            namespace: Some("cto".to_string()),
            selector: Some("app.kubernetes.io/name=cto-tools".to_string()),
        }
    }

    fn spec(kind: CheckKind) -> CheckSpec {
        CheckSpec {
            id: "check".to_string(),
            description: "a check".to_string(),
            tier: 1,
            kind,
            remediation: None,
        }
    }

    fn executor(mock: MockClusterState) -> CheckExecutor {
        CheckExecutor::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_existence() {
        let mut mock = MockClusterState::new();
        mock.expect_exists().returning(|r| Ok(r.name == "present"));
        let executor = executor(mock);

        let present = spec(CheckKind::Existence {
            resource: ResourceRef {
                api_version: "v1".to_string(),
                kind: "ServiceAccount".to_string(),
                name: "present".to_string(),
                namespace: Some("cto".to_string()),
            },
        });
        let mut missing = present.clone();
        if let CheckKind::Existence { resource } = &mut missing.kind {
            resource.name = "missing".to_string();
        }

        let result = executor.evaluate(&present).await.unwrap();
        assert_eq!(result.status, CheckStatus::Passed);
        assert_eq!(result.observed, Observed::Presence { present: true });

        let result = executor.evaluate(&missing).await.unwrap();
        assert_eq!(result.status, CheckStatus::Failed);
        assert_eq!(result.detail, "ServiceAccount cto/missing not found");
    }

    #[tokio::test]
    async fn test_minimum_count_boundaries() {
        for (count, min, expected) in [
            (0, 1, CheckStatus::Failed),
            (1, 2, CheckStatus::Failed),
            (2, 2, CheckStatus::Passed),
            (3, 2, CheckStatus::Passed),
            (0, 0, CheckStatus::Passed),
        ] {
            let mut mock = MockClusterState::new();
            mock.expect_count().returning(move |_| Ok(count));
            let result = executor(mock)
                .evaluate(&spec(CheckKind::MinimumCount {
                    selector: pods(),
                    min,
                }))
                .await
                .unwrap();
            assert_eq!(result.status, expected, "count={count} min={min}");
            assert_eq!(result.observed, Observed::Count { count, min });
        }
    }

    #[tokio::test]
    async fn test_readiness_with_no_instances_fails() {
        for ready in [0, 3] {
            let mut mock = MockClusterState::new();
            mock.expect_readiness()
                .returning(move |_| Ok(Readiness::new(ready, 0)));
            let result = executor(mock)
                .evaluate(&spec(CheckKind::ReadinessFraction {
                    selector: pods(),
                    ratio: 0.5,
                }))
                .await
                .unwrap();
            assert_eq!(result.status, CheckStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_readiness_threshold() {
        let mut mock = MockClusterState::new();
        mock.expect_readiness()
            .returning(|_| Ok(Readiness::new(2, 3)));
        let executor = executor(mock);

        let strict = spec(CheckKind::ReadinessFraction {
            selector: pods(),
            ratio: 1.0,
        });
        let tolerant = spec(CheckKind::ReadinessFraction {
            selector: pods(),
            ratio: 0.6,
        });

        assert_eq!(
            executor.evaluate(&strict).await.unwrap().status,
            CheckStatus::Failed
        );
        assert_eq!(
            executor.evaluate(&tolerant).await.unwrap().status,
            CheckStatus::Passed
        );
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_advisory() {
        let mut mock = MockClusterState::new();
        mock.expect_probe()
            .returning(|_, _, _| ProbeOutcome::TimedOut);
        let result = executor(mock)
            .evaluate(&spec(CheckKind::EndpointReachable {
                url: "http://10.255.255.1/health".to_string(),
                expected_status: 200,
                timeout_secs: 1,
            }))
            .await
            .unwrap();
        assert_eq!(result.status, CheckStatus::Failed);
        assert!(result.advisory);
        assert_eq!(
            result.observed,
            Observed::Probe {
                outcome: ProbeOutcome::TimedOut
            }
        );
    }

    #[tokio::test]
    async fn test_query_error_becomes_failed_result() {
        let mut mock = MockClusterState::new();
        mock.expect_count()
            .returning(|_| Err(ClusterError::Query("secrets is forbidden".into())));
        let result = executor(mock)
            .evaluate(&spec(CheckKind::MinimumCount {
                selector: pods(),
                min: 1,
            }))
            .await
            .unwrap();
        assert_eq!(result.status, CheckStatus::Failed);
        assert!(result.detail.contains("forbidden"));
    }

    #[tokio::test]
    async fn test_connectivity_error_propagates() {
        let mut mock = MockClusterState::new();
        mock.expect_readiness()
            .returning(|_| Err(ClusterError::Connectivity("connection refused".into())));
        let err = executor(mock)
            .evaluate(&spec(CheckKind::ReadinessFraction {
                selector: pods(),
                ratio: 1.0,
            }))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
