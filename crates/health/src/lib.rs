//! CTO Platform health checks.
//!
//! A declarative reconcile-verify-repair loop against a live cluster:
//! checks from a [`Catalog`] are evaluated tier by tier, failures are
//! optionally repaired and re-verified once, and everything is folded into
//! a [`HealthReport`] whose exit code CI can gate on.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cto_health::{Catalog, ClusterConnection, HealthCheckRunner, KubeClusterState, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cluster = KubeClusterState::connect(&ClusterConnection::default()).await?;
//!     let runner = HealthCheckRunner::new(Arc::new(cluster), RunOptions::default());
//!     let report = runner.run(&Catalog::builtin()?).await;
//!     report.print_summary();
//!     std::process::exit(i32::from(report.exit_code()));
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod executor;
pub mod remediation;
pub mod report;
pub mod runner;
pub mod ui;

// Re-export commonly used types at the crate root
pub use catalog::{Catalog, CatalogError, CheckFilter, CheckKind, CheckSpec};
pub use cluster::{ClusterError, ClusterState, KubeClusterState};
pub use config::{ClusterConnection, RunOptions};
pub use executor::CheckExecutor;
pub use remediation::RemediationEngine;
pub use report::{CheckResult, CheckStatus, HealthReport, OverallStatus};
pub use runner::HealthCheckRunner;
