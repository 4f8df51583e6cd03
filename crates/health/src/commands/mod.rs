//! CLI subcommands.

pub mod catalog;
pub mod check;

use std::path::Path;

use anyhow::{Context, Result};
use cto_health::Catalog;

/// Load the catalog at `path`, or the built-in one when no path is given.
pub(crate) fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    match path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("Invalid check catalog {}", path.display())),
        None => Catalog::builtin().context("Built-in check catalog is invalid"),
    }
}
