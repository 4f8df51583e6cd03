//! CTO cluster health CLI.
//!
//! Runs the tiered check catalog against a Kubernetes cluster, optionally
//! remediates what it finds, and exits with 0 (healthy), 1 (degraded) or
//! 2 (fatal).

#![allow(clippy::doc_markdown)]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cto_health::report::EXIT_FATAL;
use cto_health::ui;

mod commands;

use commands::catalog::CatalogCommand;
use commands::check::CheckCommand;

/// CTO Platform - cluster health checks and remediation.
#[derive(Parser)]
#[command(
    name = "cto-health",
    version,
    about = "CTO Platform cluster health checker",
    long_about = "Verify that a CTO Platform cluster is healthy.\n\n\
                  Checks run in tiers so that foundational resources are verified\n\
                  before the workloads that depend on them. With --remediate, failing\n\
                  checks trigger their catalog action, wait for the cluster to settle,\n\
                  and are verified once more."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the cluster against the check catalog.
    ///
    /// Exits 0 when every check passes or was remediated, 1 when issues
    /// remain, and 2 when the control plane is unreachable or the
    /// configuration is invalid.
    Check(CheckCommand),

    /// Validate and list the check catalog.
    Catalog(CatalogCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "info,cto_health=debug,kube=info"
    } else {
        "warn,cto_health=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Check(cmd) => cmd.run().await,
        Commands::Catalog(cmd) => cmd.run(),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            ui::print_error(&format!("{err:#}"));
            ExitCode::from(EXIT_FATAL)
        }
    }
}
