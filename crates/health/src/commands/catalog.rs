//! Catalog command - validate and list the check catalog.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use cto_health::report::EXIT_HEALTHY;
use cto_health::ui;

use super::load_catalog;

/// Validate a check catalog and list its checks by tier.
#[derive(Args)]
pub struct CatalogCommand {
    /// Check catalog file (defaults to the built-in catalog).
    #[arg(long, env = "CTO_HEALTH_CATALOG", value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Print the parsed catalog as JSON.
    #[arg(long, default_value = "false")]
    json: bool,
}

impl CatalogCommand {
    /// Run the catalog command.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or fails validation.
    pub fn run(&self) -> Result<u8> {
        let catalog = load_catalog(self.catalog.as_deref())?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&catalog)?);
            return Ok(EXIT_HEALTHY);
        }

        let source = self
            .catalog
            .as_ref()
            .map_or_else(|| "built-in".to_string(), |p| p.display().to_string());
        ui::print_section("CHECK CATALOG");
        ui::print_kv("Source", &source);
        ui::print_kv("Checks", &catalog.len().to_string());
        ui::print_kv("Actions", &catalog.actions.len().to_string());

        for (tier, checks) in catalog.tiers() {
            println!();
            println!("{}", format!("Tier {tier}").bold());
            for spec in checks {
                let advisory = if spec.kind.is_advisory() {
                    " (advisory)".yellow().to_string()
                } else {
                    String::new()
                };
                ui::print_list_item(&format!(
                    "{} [{}] {}{advisory}",
                    spec.id.cyan(),
                    spec.kind.label(),
                    spec.description
                ));
                if let Some(remediation) = &spec.remediation {
                    let command = catalog
                        .action(&remediation.action)
                        .map(cto_health::catalog::RemediationAction::command)
                        .unwrap_or_default();
                    ui::print_detail(&format!("fix: {}", remediation.description));
                    for (index, line) in command.lines().enumerate() {
                        let prefix = if index == 0 { "  $ " } else { "    " };
                        ui::print_detail(&format!("{prefix}{line}"));
                    }
                }
            }
        }

        println!();
        ui::print_success("Catalog is valid");
        Ok(EXIT_HEALTHY)
    }
}
