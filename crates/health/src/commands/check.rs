//! Check command - evaluate the cluster and optionally remediate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use cto_health::config::DEFAULT_CONCURRENCY;
use cto_health::report::EXIT_HEALTHY;
use cto_health::ui;
use cto_health::{
    CheckFilter, CheckStatus, ClusterConnection, HealthCheckRunner, HealthReport, KubeClusterState,
    OverallStatus, RunOptions,
};

use super::load_catalog;

/// Run the check catalog against a cluster.
#[derive(Args)]
pub struct CheckCommand {
    /// Path to kubeconfig file (defaults to ~/.kube/config or in-cluster).
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use.
    #[arg(long)]
    context: Option<String>,

    /// Apply remediation actions for failing checks.
    #[arg(
        long,
        env = "CTO_HEALTH_REMEDIATE",
        default_value = "false",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    remediate: bool,

    /// Check catalog file (defaults to the built-in catalog).
    ///
    /// Relative manifest paths in a catalog file resolve against the file's
    /// directory; those in the built-in catalog resolve against the current
    /// directory, so run it from a platform checkout.
    #[arg(long, env = "CTO_HEALTH_CATALOG", value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Only run the check with this id (repeatable).
    #[arg(long = "check", value_name = "ID")]
    checks: Vec<String>,

    /// Only run checks in this tier (repeatable).
    #[arg(long = "tier", value_name = "N")]
    tiers: Vec<u32>,

    /// Only run checks targeting this namespace.
    #[arg(long)]
    namespace: Option<String>,

    /// Maximum checks evaluated concurrently within a tier.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Whole-run timeout in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 600)]
    timeout: u64,

    /// Override every action's settle interval, in seconds.
    #[arg(long, value_name = "SECS")]
    settle: Option<u64>,

    /// Re-run up to this many times while the cluster stays degraded.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    repeat: u32,

    /// Seconds to wait between repeated runs.
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    interval: u64,

    /// Output report as JSON.
    #[arg(long, default_value = "false")]
    json: bool,
}

impl CheckCommand {
    /// Run the check command and return the process exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog is invalid, the filters select nothing,
    /// or no Kubernetes client can be built.
    pub async fn run(&self) -> Result<u8> {
        let catalog = load_catalog(self.catalog.as_deref())?;
        let filter = self.filter();
        let catalog = if filter.is_empty() {
            catalog
        } else {
            catalog.filtered(&filter)
        };
        if catalog.is_empty() {
            bail!("No checks match the given filters");
        }

        info!(
            checks = catalog.len(),
            remediation = if self.remediate { "enabled" } else { "disabled" },
            "Loaded check catalog"
        );

        let cluster = KubeClusterState::connect(&ClusterConnection {
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
        })
        .await?;
        let runner = HealthCheckRunner::new(Arc::new(cluster), self.options());

        let mut attempt = 1;
        let report = loop {
            let report = runner.run(&catalog).await;
            if report.is_aborted()
                || report.overall_status() == OverallStatus::Healthy
                || attempt >= self.repeat
            {
                break report;
            }

            if !self.json {
                report.print_summary();
            }
            info!(
                attempt,
                issues = report.issue_count(),
                "Cluster degraded, re-running in {}s",
                self.interval
            );
            tokio::time::sleep(Duration::from_secs(self.interval)).await;
            attempt += 1;
        };

        self.print(&report)?;
        let code = report.exit_code();
        if code != EXIT_HEALTHY {
            info!(code, "Exiting with non-zero status");
        }
        Ok(code)
    }

    fn filter(&self) -> CheckFilter {
        CheckFilter {
            ids: self.checks.clone(),
            tiers: self.tiers.clone(),
            namespace: self.namespace.clone(),
        }
    }

    fn options(&self) -> RunOptions {
        let options = RunOptions::default()
            .with_remediation(self.remediate)
            .with_concurrency(self.concurrency)
            .with_run_timeout(Duration::from_secs(self.timeout));
        match self.settle {
            Some(secs) => options.with_settle_override(Duration::from_secs(secs)),
            None => options,
        }
    }

    fn print(&self, report: &HealthReport) -> Result<()> {
        if self.json {
            println!("{}", report.to_json()?);
            return Ok(());
        }

        report.print_summary();
        let fixable = report
            .results
            .iter()
            .any(|r| r.status == CheckStatus::Failed && r.remediation.is_some());
        if !self.remediate && fixable {
            println!();
            ui::print_warning("Re-run with --remediate to apply the suggested fixes");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        check: CheckCommand,
    }

    fn parse(args: &[&str]) -> CheckCommand {
        Harness::parse_from(std::iter::once("cto-health").chain(args.iter().copied())).check
    }

    #[test]
    fn test_defaults() {
        let cmd = parse(&[]);
        let options = cmd.options();
        assert_eq!(options.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(options.run_timeout, Duration::from_secs(600));
        assert!(options.settle_override.is_none());
        assert_eq!(cmd.repeat, 1);
        assert!(cmd.filter().is_empty());
    }

    #[test]
    fn test_filters_and_overrides() {
        let cmd = parse(&[
            "--check",
            "controller-ready",
            "--check",
            "namespace-cto",
            "--tier",
            "1",
            "--namespace",
            "cto",
            "--settle",
            "0",
            "--concurrency",
            "0",
        ]);
        let filter = cmd.filter();
        assert_eq!(filter.ids, vec!["controller-ready", "namespace-cto"]);
        assert_eq!(filter.tiers, vec![1]);
        assert_eq!(filter.namespace.as_deref(), Some("cto"));

        let options = cmd.options();
        assert_eq!(options.settle_override, Some(Duration::ZERO));
        assert_eq!(options.concurrency, 1);
    }

    #[test]
    #[serial]
    fn test_remediate_accepts_boolish_env_values() {
        for (value, expected) in [
            ("1", true),
            ("yes", true),
            ("true", true),
            ("0", false),
            ("off", false),
        ] {
            std::env::set_var("CTO_HEALTH_REMEDIATE", value);
            let cmd = parse(&[]);
            std::env::remove_var("CTO_HEALTH_REMEDIATE");
            assert_eq!(cmd.remediate, expected, "CTO_HEALTH_REMEDIATE={value}");
        }
    }

    #[test]
    #[serial]
    fn test_remediate_flag_without_env() {
        std::env::remove_var("CTO_HEALTH_REMEDIATE");
        assert!(!parse(&[]).remediate);
        assert!(parse(&["--remediate"]).remediate);
    }

    #[test]
    fn test_repeat_must_be_positive() {
        let parsed = Harness::try_parse_from(["cto-health", "--repeat", "0"]);
        assert!(parsed.is_err());
    }
}
