//! One vendoring run, start to finish.
//!
//! Lock aggregation, classification and hash resolution all happen before
//! the first network request, so every error that can be detected offline
//! (bad lock files, unknown sources, missing hashes, conflicting config
//! sections) aborts the run before anything is downloaded.

use crate::config::Settings;
use crate::error::{Result, VendorError};
use crate::fetch::{FetchContext, FetchedPackage, Fetcher};
use crate::hashes::{HashCache, HashDrift, HashOrigin, HashResolver, Resolution};
use crate::lock::{self, AggregatedLock};
use crate::redirect;
use crate::source::{self, Classified, ClassifiedPackage};
use crate::vendor::{self, VendorRoot};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SOURCES_DIR: &str = "sources";
pub const VENDOR_DIR: &str = "vendor";
pub const CONFIG_FILE: &str = "config.toml";

/// Everything known about a project before fetching.
pub struct Prepared {
    pub lock: AggregatedLock,
    pub classified: Classified,
    /// Hash cache files merged in lock-file order.
    pub cache: HashCache,
}

impl Prepared {
    pub fn load(root: &Path, settings: &Settings) -> Result<Self> {
        let lock = lock::aggregate(root, &settings.extra_sources_dir)?;
        let classified = source::classify_all(&lock.lock, &settings.registry_index)?;
        let cache = HashCache::load_merged(&lock.sources, &settings.hash_cache_file)?;
        info!(
            lock_files = lock.sources.len(),
            registry = classified.registry.len(),
            git = classified.git.len(),
            local = classified.local.len(),
            "prepared lock"
        );
        Ok(Self {
            lock,
            classified,
            cache,
        })
    }

    pub fn resolver(&self, overrides: HashCache) -> HashResolver<'_> {
        let git_ids = self.classified.git.iter().map(|p| p.id.clone()).collect();
        HashResolver::new(&self.lock.lock, git_ids, self.cache.clone(), overrides)
    }
}

pub struct VendorOptions {
    pub root: PathBuf,
    pub out_dir: PathBuf,
    pub overrides: HashCache,
    pub settings: Settings,
}

#[derive(Debug)]
pub struct VendorOutcome {
    pub vendor_root: VendorRoot,
    pub config_path: PathBuf,
    pub fetched: Vec<FetchedPackage>,
    /// Merged cache plus overrides plus fresh hashes.
    pub extended_hashes: HashCache,
    /// Only the hashes computed during this run.
    pub computed_hashes: HashCache,
    pub skipped_local: usize,
}

/// Run the whole pipeline. `on_fetched` is called once per finished
/// package, possibly from several threads.
pub fn run(
    options: &VendorOptions,
    ctx: &dyn FetchContext,
    on_fetched: &(dyn Fn(&FetchedPackage) + Sync),
) -> Result<VendorOutcome> {
    let prepared = Prepared::load(&options.root, &options.settings)?;
    run_prepared(&prepared, options, ctx, on_fetched)
}

/// [`run`] for a project that was already loaded, e.g. to size a progress
/// bar before fetching starts.
pub fn run_prepared(
    prepared: &Prepared,
    options: &VendorOptions,
    ctx: &dyn FetchContext,
    on_fetched: &(dyn Fn(&FetchedPackage) + Sync),
) -> Result<VendorOutcome> {
    let settings = &options.settings;
    let mut resolver = prepared.resolver(options.overrides.clone());

    let tree_hashing = ctx.tree_hashing();
    let resolutions = prepared
        .classified
        .all()
        .map(|pkg| -> Result<(&ClassifiedPackage, Resolution)> {
            Ok((pkg, resolver.resolve(pkg, tree_hashing)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let out_dir = std::path::absolute(&options.out_dir)
        .map_err(|e| VendorError::io(&options.out_dir, e))?;
    let vendor_dir = out_dir.join(VENDOR_DIR);
    let config = redirect::render(
        &prepared.classified.git_sources(),
        &settings.vendor_dir_name,
        &vendor_dir,
    )?;

    let sources_dir = out_dir.join(SOURCES_DIR);
    fs::create_dir_all(&sources_dir).map_err(|e| VendorError::io(&sources_dir, e))?;
    let fetcher = Fetcher::new(ctx, settings, &sources_dir);

    info!(packages = resolutions.len(), "fetching");
    let fetch_all = || {
        resolutions
            .par_iter()
            .map(|(pkg, resolution)| -> Result<FetchedPackage> {
                let fetched = fetcher.fetch(pkg, resolution)?;
                on_fetched(&fetched);
                Ok(fetched)
            })
            .collect::<Result<Vec<_>>>()
    };
    let fetched = if settings.jobs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(settings.jobs)
            .build()
            .map_err(|e| VendorError::io(&sources_dir, std::io::Error::other(e)))?
            .install(fetch_all)?
    } else {
        fetch_all()?
    };

    for pkg in fetched.iter().filter(|p| p.origin == HashOrigin::Computed) {
        resolver.record_computed(&pkg.id, &pkg.hash);
    }

    let vendor_root = vendor::assemble(&fetched, &vendor_dir)?;
    let config_path = out_dir.join(CONFIG_FILE);
    fs::write(&config_path, config).map_err(|e| VendorError::io(&config_path, e))?;
    info!(
        entries = vendor_root.entries.len(),
        collapsed = vendor_root.collapsed(),
        "vendor root assembled"
    );

    Ok(VendorOutcome {
        vendor_root,
        config_path,
        fetched,
        extended_hashes: resolver.extended(),
        computed_hashes: resolver.computed().clone(),
        skipped_local: prepared.classified.local.len(),
    })
}

/// Drift between a persisted hash file and `current`. A missing file counts
/// as empty, so every current entry shows up as added.
pub fn drift_against(path: &Path, current: &HashCache) -> Result<HashDrift> {
    let previous = if path.is_file() {
        HashCache::load(path)?
    } else {
        HashCache::new()
    };
    Ok(HashDrift::between(&previous, current))
}
