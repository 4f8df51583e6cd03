//! The tiered check pipeline.
//!
//! Tiers run in ascending order with a barrier between them; checks inside a
//! tier fan out over a bounded pool. A connectivity failure stops the run at
//! once, and the run deadline turns whatever has not finished into `Skipped`.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, CheckSpec};
use crate::cluster::{ClusterError, ClusterState};
use crate::config::RunOptions;
use crate::executor::CheckExecutor;
use crate::remediation::RemediationEngine;
use crate::report::{CheckResult, CheckStatus, HealthReport};

/// How a tier ended.
enum TierOutcome {
    Completed(Vec<CheckResult>),
    TimedOut(Vec<CheckResult>),
    Aborted(Vec<CheckResult>, ClusterError),
}

/// Runs a catalog against a cluster and produces a [`HealthReport`].
pub struct HealthCheckRunner {
    cluster: Arc<dyn ClusterState>,
    options: RunOptions,
}

impl HealthCheckRunner {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterState>, options: RunOptions) -> Self {
        Self { cluster, options }
    }

    /// Execute one full pass over `catalog`.
    ///
    /// Never fails: fatal errors are recorded on the report (see
    /// [`HealthReport::aborted`]) so the caller always has something to print.
    pub async fn run(&self, catalog: &Catalog) -> HealthReport {
        let mut report = HealthReport::new(self.options.remediate);
        let deadline = Instant::now() + self.options.run_timeout;

        info!(
            checks = catalog.len(),
            remediate = self.options.remediate,
            "Starting health checks"
        );

        if let Err(err) = self.cluster.ping().await {
            error!(error = %err, "Control plane unreachable, aborting");
            report.abort(&err);
            report.finish();
            return report;
        }

        let executor = CheckExecutor::new(Arc::clone(&self.cluster));
        let engine = RemediationEngine::new(
            Arc::clone(&self.cluster),
            catalog.actions.clone(),
            self.options.remediate,
        )
        .with_settle_override(self.options.settle_override);

        let tiers = catalog.tiers();
        for (position, (tier, checks)) in tiers.iter().enumerate() {
            info!(tier, checks = checks.len(), "Running tier");

            match self.run_tier(&executor, &engine, checks, deadline).await {
                TierOutcome::Completed(results) => report.extend(results),
                TierOutcome::TimedOut(results) => {
                    warn!(tier, "Run timeout elapsed; remaining checks skipped");
                    report.extend(results);
                    for (_, later) in &tiers[position + 1..] {
                        report.extend(later.iter().map(|spec| {
                            CheckResult::skipped(spec, "run timeout elapsed before check started")
                        }));
                    }
                    break;
                }
                TierOutcome::Aborted(results, err) => {
                    error!(tier, error = %err, "Control plane unreachable, aborting");
                    report.extend(results);
                    report.abort(&err);
                    break;
                }
            }
        }

        report.finish();
        info!(
            issues = report.issue_count(),
            remediated = report.remediated_count(),
            status = %report.overall_status(),
            "Health checks complete"
        );
        report
    }

    /// Evaluate one check and, if it failed, hand it to the remediation engine.
    async fn run_check(
        executor: &CheckExecutor,
        engine: &RemediationEngine,
        spec: &CheckSpec,
    ) -> Result<CheckResult, ClusterError> {
        let result = executor.evaluate(spec).await?;
        if result.status == CheckStatus::Failed {
            engine.remediate(spec, result).await
        } else {
            Ok(result)
        }
    }

    /// Run all checks of one tier, at most `concurrency` at a time.
    ///
    /// Results are returned in catalog order regardless of completion order.
    async fn run_tier(
        &self,
        executor: &CheckExecutor,
        engine: &RemediationEngine,
        checks: &[&CheckSpec],
        deadline: Instant,
    ) -> TierOutcome {
        let mut slots: Vec<Option<CheckResult>> = vec![None; checks.len()];

        let mut pending = stream::iter(checks.iter().enumerate())
            .map(move |(index, spec)| async move {
                (index, Self::run_check(executor, engine, spec).await)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((index, Ok(result)))) => slots[index] = Some(result),
                Ok(Some((_, Err(err)))) => {
                    return TierOutcome::Aborted(slots.into_iter().flatten().collect(), err);
                }
                Ok(None) => break,
                Err(_) => {
                    let results = slots
                        .into_iter()
                        .zip(checks)
                        .map(|(slot, spec)| {
                            slot.unwrap_or_else(|| {
                                CheckResult::skipped(
                                    spec,
                                    "run timeout elapsed before check completed",
                                )
                            })
                        })
                        .collect();
                    return TierOutcome::TimedOut(results);
                }
            }
        }

        TierOutcome::Completed(slots.into_iter().flatten().collect())
    }
}
