//! `lockvendor hashes` command handler

use anyhow::{Context, Result, bail};
use colored::*;
use std::path::{Path, PathBuf};

use crate::engine::{self, Prepared};

/// Print the merged hash cache (plus overrides) as JSON, or with `check`
/// compare it against a persisted hash file.
pub fn run_hashes(root: &Path, hashes: &[PathBuf], check: Option<&Path>) -> Result<()> {
    let settings = super::load_settings(root)?;
    let overrides = super::load_overrides(hashes)?;
    let prepared = Prepared::load(root, &settings)?;
    let extended = prepared.resolver(overrides).extended();

    let Some(check) = check else {
        let json = serde_json::to_string_pretty(&extended).context("Failed to encode hashes")?;
        println!("{json}");
        return Ok(());
    };

    println!("{} Checking hashes against {}...", "🔒".blue(), check.display());
    let drift = engine::drift_against(check, &extended)?;
    if drift.is_empty() {
        println!("{} {} hashes match", "✓".green(), extended.len());
        return Ok(());
    }
    print!("{drift}");
    bail!(
        "{} added, {} removed, {} changed",
        drift.added.len(),
        drift.removed.len(),
        drift.changed.len()
    )
}
