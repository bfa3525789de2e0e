//! `lockvendor vendor` command handler

use anyhow::{Context, Result, bail};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::warn;

use crate::engine::{self, Prepared, VendorOptions, VendorOutcome};
use crate::fetch::{FetchedPackage, NetworkContext};
use crate::source::SourceKind;

pub struct VendorArgs {
    pub root: PathBuf,
    pub out: PathBuf,
    pub hashes: Vec<PathBuf>,
    pub write_hashes: Option<PathBuf>,
    pub tree_hashing: bool,
    pub deny_drift: bool,
    pub jobs: Option<usize>,
}

/// Run `lockvendor vendor`
pub fn run_vendor(args: &VendorArgs) -> Result<()> {
    let mut settings = super::load_settings(&args.root)?;
    if args.tree_hashing {
        settings.tree_hashing = true;
    }
    if let Some(jobs) = args.jobs {
        settings.jobs = jobs;
    }
    let overrides = super::load_overrides(&args.hashes)?;
    let hash_file = args
        .write_hashes
        .clone()
        .unwrap_or_else(|| args.root.join(&settings.hash_cache_file));

    println!(
        "{} Vendoring dependencies of {}...",
        "📦".blue(),
        args.root.display().to_string().bold()
    );
    let prepared = Prepared::load(&args.root, &settings)?;
    if prepared.classified.is_empty() {
        println!("{} Nothing to fetch.", "!".yellow());
    }

    let pb = ProgressBar::new(prepared.classified.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    let on_fetched = |pkg: &FetchedPackage| {
        pb.set_message(pkg.name.clone());
        pb.inc(1);
    };

    let ctx = NetworkContext::new(settings.tree_hashing);
    let options = VendorOptions {
        root: args.root.clone(),
        out_dir: args.out.clone(),
        overrides,
        settings,
    };
    let outcome = engine::run_prepared(&prepared, &options, &ctx, &on_fetched);
    pb.finish_and_clear();
    let outcome = outcome?;

    print_summary(&outcome);

    if args.write_hashes.is_some() || hash_file.is_file() {
        let drift = engine::drift_against(&hash_file, &outcome.extended_hashes)?;
        if !drift.is_empty() {
            warn!(file = %hash_file.display(), "hash drift");
            println!(
                "{} Hashes differ from {}:",
                "!".yellow(),
                hash_file.display()
            );
            print!("{drift}");
            if args.deny_drift {
                bail!("Hash drift against {}", hash_file.display());
            }
        }
    }

    if let Some(path) = &args.write_hashes {
        outcome
            .extended_hashes
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!(
            "{} Wrote {} hashes to {}",
            "✓".green(),
            outcome.extended_hashes.len(),
            path.display()
        );
    }

    println!(
        "\n  Point cargo at it with: {}",
        format!("--config {}", outcome.config_path.display()).cyan()
    );
    Ok(())
}

fn print_summary(outcome: &VendorOutcome) {
    let count = |kind: SourceKind| outcome.fetched.iter().filter(|p| p.kind == kind).count();
    println!(
        "{} Vendored {} packages ({} registry, {} git) into {}",
        "✓".green(),
        outcome.fetched.len(),
        count(SourceKind::RegistryCrate),
        count(SourceKind::Git),
        outcome.vendor_root.dir.display()
    );
    println!(
        "  {} vendor entries, {} collapsed duplicates, {} path dependencies skipped",
        outcome.vendor_root.entries.len(),
        outcome.vendor_root.collapsed(),
        outcome.skipped_local
    );
    if !outcome.computed_hashes.is_empty() {
        println!(
            "  {} {} git hashes computed from fetched trees",
            "+".cyan(),
            outcome.computed_hashes.len()
        );
    }
}
