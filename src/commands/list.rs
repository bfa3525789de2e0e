//! `lockvendor list` command handler

use anyhow::Result;
use colored::*;
use std::path::Path;

use crate::engine::Prepared;
use crate::hashes::{HashCache, Resolution};
use crate::ui::Table;

/// Print every package of the aggregated lock and where its hash comes from.
pub fn run_list(root: &Path) -> Result<()> {
    let settings = super::load_settings(root)?;
    let prepared = Prepared::load(root, &settings)?;
    let resolver = prepared.resolver(HashCache::new());

    for source in &prepared.lock.sources {
        println!("{} {}", "🔒".blue(), source.join("Cargo.lock").display());
    }

    let mut table = Table::new(&["Package", "Kind", "Hash"]);
    let mut missing = 0;
    for pkg in prepared.classified.all() {
        let hash = match resolver.resolve(pkg, settings.tree_hashing) {
            Ok(Resolution::Known { origin, .. }) => origin.to_string().green().to_string(),
            Ok(Resolution::Compute) => "from tree".yellow().to_string(),
            Err(_) => {
                missing += 1;
                "missing".red().to_string()
            }
        };
        table.add_row(vec![pkg.id.clone(), pkg.kind.to_string(), hash]);
    }
    for id in &prepared.classified.local {
        table.add_row(vec![
            id.clone(),
            "path".dimmed().to_string(),
            "skipped".dimmed().to_string(),
        ]);
    }

    if table.is_empty() {
        println!("{} No packages found.", "!".yellow());
        return Ok(());
    }
    table.print();

    if missing > 0 {
        println!(
            "{} {} packages have no trusted hash; vendoring will fail until one is supplied.",
            "x".red(),
            missing
        );
    }
    Ok(())
}
