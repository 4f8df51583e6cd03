//! Check results and the aggregate health report.

use std::fmt;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::catalog::CheckSpec;
use crate::cluster::{ClusterError, ProbeOutcome, Readiness};
use crate::remediation::RemediationNote;
use crate::ui;

/// Exit code for a healthy cluster.
pub const EXIT_HEALTHY: u8 = 0;
/// Exit code when issues were found, remediated or not.
pub const EXIT_DEGRADED: u8 = 1;
/// Exit code when a fatal connectivity or configuration error stopped the run.
pub const EXIT_FATAL: u8 = 2;

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    Remediated,
    RemediationFailed,
    Skipped,
}

impl CheckStatus {
    /// Report tag for this status.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Passed => "[PASS]",
            Self::Failed => "[FAIL]",
            Self::Remediated => "[FIXED]",
            Self::RemediationFailed => "[FIX-FAILED]",
            Self::Skipped => "[SKIP]",
        }
    }

    /// Everything except a pass or a confirmed fix counts as an issue.
    #[must_use]
    pub fn is_issue(self) -> bool {
        !matches!(self, Self::Passed | Self::Remediated)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What was actually observed when the check ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observed {
    Presence { present: bool },
    Count { count: u32, min: u32 },
    Readiness { ready: u32, total: u32, ratio: f64 },
    Probe { outcome: ProbeOutcome },
    Error { message: String },
    Nothing,
}

impl Observed {
    #[must_use]
    pub fn readiness(readiness: Readiness, ratio: f64) -> Self {
        Self::Readiness {
            ready: readiness.ready,
            total: readiness.total,
            ratio,
        }
    }
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presence { present: true } => write!(f, "present"),
            Self::Presence { present: false } => write!(f, "absent"),
            Self::Count { count, min } => write!(f, "{count} (min {min})"),
            Self::Readiness {
                ready,
                total,
                ratio,
            } => write!(f, "{ready}/{total} ready (need {:.0}%)", ratio * 100.0),
            Self::Probe { outcome } => write!(f, "{outcome}"),
            Self::Error { message } => write!(f, "error: {message}"),
            Self::Nothing => write!(f, "-"),
        }
    }
}

/// The outcome of evaluating one check at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    pub description: String,
    pub tier: u32,
    pub status: CheckStatus,
    pub observed: Observed,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
    /// Endpoint results only warn; they never make a run fatal.
    pub advisory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationNote>,
}

impl CheckResult {
    #[must_use]
    pub fn new(
        spec: &CheckSpec,
        status: CheckStatus,
        observed: Observed,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            check_id: spec.id.clone(),
            description: spec.description.clone(),
            tier: spec.tier,
            status,
            observed,
            timestamp: Utc::now(),
            detail: detail.into(),
            advisory: spec.kind.is_advisory(),
            remediation: None,
        }
    }

    /// A check that never ran to completion.
    #[must_use]
    pub fn skipped(spec: &CheckSpec, reason: impl Into<String>) -> Self {
        Self::new(spec, CheckStatus::Skipped, Observed::Nothing, reason)
    }

    #[must_use]
    pub fn is_issue(&self) -> bool {
        self.status.is_issue()
    }
}

/// Aggregate verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// The aggregate of a full run. Built fresh every run and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub remediation_enabled: bool,
    /// Results in tier order, catalog order within a tier.
    pub results: Vec<CheckResult>,
    /// Set when a fatal error ended the run early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

/// Serialized form with the derived totals included.
#[derive(Serialize)]
struct ReportDocument<'a> {
    #[serde(flatten)]
    report: &'a HealthReport,
    overall_status: OverallStatus,
    issue_count: usize,
    remediated_count: usize,
    exit_code: u8,
}

impl HealthReport {
    #[must_use]
    pub fn new(remediation_enabled: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            remediation_enabled,
            results: Vec::new(),
            aborted: None,
        }
    }

    /// Fold a sequence of results into a finished report.
    #[must_use]
    pub fn from_results(
        remediation_enabled: bool,
        results: impl IntoIterator<Item = CheckResult>,
    ) -> Self {
        let mut report = Self::new(remediation_enabled);
        report.extend(results);
        report.finish();
        report
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = CheckResult>) {
        self.results.extend(results);
    }

    /// Mark the run as ended by a fatal error.
    pub fn abort(&mut self, error: &ClusterError) {
        self.aborted = Some(error.to_string());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    #[must_use]
    pub fn total_checks(&self) -> usize {
        self.results.len()
    }

    /// Results that are neither passed nor remediated.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_issue()).count()
    }

    #[must_use]
    pub fn remediated_count(&self) -> usize {
        self.count(CheckStatus::Remediated)
    }

    #[must_use]
    pub fn count(&self, status: CheckStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    #[must_use]
    pub fn overall_status(&self) -> OverallStatus {
        if self.issue_count() == 0 {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        }
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Process exit code: 0 healthy, 1 degraded, 2 aborted.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_aborted() {
            EXIT_FATAL
        } else if self.overall_status() == OverallStatus::Healthy {
            EXIT_HEALTHY
        } else {
            EXIT_DEGRADED
        }
    }

    #[must_use]
    pub fn result(&self, check_id: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.check_id == check_id)
    }

    /// Results grouped by tier, preserving order.
    fn by_tier(&self) -> Vec<(u32, Vec<&CheckResult>)> {
        let mut groups: Vec<(u32, Vec<&CheckResult>)> = Vec::new();
        for result in &self.results {
            match groups.last_mut() {
                Some((tier, group)) if *tier == result.tier => group.push(result),
                _ => groups.push((result.tier, vec![result])),
            }
        }
        groups
    }

    /// JSON document including the derived totals.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ReportDocument {
            report: self,
            overall_status: self.overall_status(),
            issue_count: self.issue_count(),
            remediated_count: self.remediated_count(),
            exit_code: self.exit_code(),
        })
    }

    /// Print a colored summary to stdout.
    pub fn print_summary(&self) {
        ui::print_section("CLUSTER HEALTH REPORT");

        for (tier, results) in self.by_tier() {
            println!();
            println!("{}", format!("Tier {tier}").bold());
            for result in results {
                let tag = match result.status {
                    CheckStatus::Passed => result.status.tag().green(),
                    CheckStatus::Remediated => result.status.tag().cyan(),
                    CheckStatus::Failed if result.advisory => result.status.tag().yellow(),
                    CheckStatus::Failed | CheckStatus::RemediationFailed => {
                        result.status.tag().red()
                    }
                    CheckStatus::Skipped => result.status.tag().bright_black(),
                };
                println!("  {tag} {}", result.description);
                for line in detail_lines(result) {
                    ui::print_detail(&line);
                }
            }
        }

        println!();
        println!("{}", "─".repeat(70).bright_black());
        for line in self.summary_lines() {
            println!("  {line}");
        }
        let verdict = match (self.is_aborted(), self.overall_status()) {
            (true, _) => "ABORTED".red().bold(),
            (false, OverallStatus::Healthy) => "HEALTHY".green().bold(),
            (false, OverallStatus::Degraded) => "DEGRADED".yellow().bold(),
        };
        println!("  Status: {verdict}");
        println!("{}", "═".repeat(70).bright_black());
        println!();
    }

    fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Checks: {}", self.total_checks()),
            format!("Issues: {}", self.issue_count()),
            format!("Remediated: {}", self.remediated_count()),
        ];
        if let Some(reason) = &self.aborted {
            lines.push(format!("Aborted: {reason}"));
        }
        lines
    }
}

/// Detail and suggestion lines printed under a non-passing check.
fn detail_lines(result: &CheckResult) -> Vec<String> {
    let mut lines = Vec::new();
    if result.status == CheckStatus::Passed {
        return lines;
    }

    if !result.detail.is_empty() {
        lines.push(result.detail.clone());
    }

    if let Some(note) = &result.remediation {
        if let Some(error) = &note.error {
            lines.push(format!("remediation error: {error}"));
        }
        if result.status != CheckStatus::Remediated {
            let prefix = if note.attempted { "Manual fix" } else { "Suggested fix" };
            lines.push(format!("{prefix}: {}", note.description));
            let mut command = note.command.lines();
            if let Some(first) = command.next() {
                lines.push(format!("  $ {first}"));
            }
            lines.extend(command.map(|line| format!("    {line}")));
        }
    }

    lines
}

impl fmt::Display for HealthReport {
    /// Plain-text summary, identical in content to [`HealthReport::print_summary`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (tier, results) in self.by_tier() {
            writeln!(f, "Tier {tier}")?;
            for result in results {
                writeln!(f, "  {} {}", result.status.tag(), result.description)?;
                for line in detail_lines(result) {
                    writeln!(f, "      {line}")?;
                }
            }
        }
        for line in self.summary_lines() {
            writeln!(f, "{line}")?;
        }
        let verdict = if self.is_aborted() {
            "ABORTED".to_string()
        } else {
            self.overall_status().to_string()
        };
        write!(f, "Status: {verdict}")
    }
}
