//! Cargo lock file parsing and aggregation.
//!
//! A vendoring run reads the root `Cargo.lock` plus the lock file of every
//! direct subdirectory of the extra-sources directory, and merges them into
//! one [`LockFile`]. Deduplication by package id happens later, during
//! classification.

use crate::error::{Result, VendorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LOCK_FILE_NAME: &str = "Cargo.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Package {
    /// Canonical identity, `"{name} {version} ({source})"`.
    ///
    /// Path dependencies have no source and are never vendored, so their id
    /// only appears in diagnostics.
    pub fn id(&self) -> String {
        format!(
            "{} {} ({})",
            self.name,
            self.version,
            self.source.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LockFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, rename = "package")]
    pub packages: Vec<Package>,
    /// Legacy (v1) checksums, keyed `"checksum <id>"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl LockFile {
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let lock: LockFile = toml::from_str(content).map_err(|e| VendorError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        lock.validate().map_err(|message| VendorError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(lock)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| VendorError::io(path, e))?;
        Self::parse(&content, path)
    }

    /// Single validation pass over every package entry.
    fn validate(&self) -> std::result::Result<(), String> {
        for pkg in &self.packages {
            if pkg.name.trim().is_empty() {
                return Err(format!("package with version {} has an empty name", pkg.version));
            }
            semver::Version::parse(&pkg.version)
                .map_err(|e| format!("package {} has invalid version: {}", pkg.name, e))?;
            if let Some(sum) = &pkg.checksum
                && !is_sha256_hex(sum)
            {
                return Err(format!("package {} has malformed checksum '{}'", pkg.id(), sum));
            }
        }
        Ok(())
    }

    /// Concatenate packages and union metadata; `other` wins on key collisions.
    pub fn merge(&mut self, other: LockFile) {
        self.packages.extend(other.packages);
        self.metadata.extend(other.metadata);
        self.version = self.version.max(other.version);
    }

    /// Checksum recorded in `[metadata]` for a package id, if any.
    pub fn metadata_checksum(&self, id: &str) -> Option<&str> {
        self.metadata
            .get(&format!("checksum {}", id))
            .map(String::as_str)
    }
}

pub(crate) fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// The merged lock of a project, plus the directories the pieces came from.
#[derive(Debug, Default)]
pub struct AggregatedLock {
    pub lock: LockFile,
    /// Directory of every lock file read, root first. Hash cache files are
    /// looked up in these directories in this order.
    pub sources: Vec<PathBuf>,
}

/// Lock file paths for `root`: the root lock, then one per direct
/// subdirectory of `extra_sources_dir`, in sorted order.
pub fn discover_lock_files(root: &Path, extra_sources_dir: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    let root_lock = root.join(LOCK_FILE_NAME);
    if root_lock.is_file() {
        found.push(root_lock);
    }

    let extra = root.join(extra_sources_dir);
    if extra.is_dir() {
        let mut nested = Vec::new();
        for entry in fs::read_dir(&extra).map_err(|e| VendorError::io(&extra, e))? {
            let entry = entry.map_err(|e| VendorError::io(&extra, e))?;
            let candidate = entry.path().join(LOCK_FILE_NAME);
            if entry.path().is_dir() && candidate.is_file() {
                nested.push(candidate);
            }
        }
        nested.sort();
        found.extend(nested);
    }

    Ok(found)
}

/// Discover, parse and merge every lock file under `root`.
pub fn aggregate(root: &Path, extra_sources_dir: &str) -> Result<AggregatedLock> {
    let mut merged = AggregatedLock::default();
    for path in discover_lock_files(root, extra_sources_dir)? {
        let lock = LockFile::load(&path)?;
        debug!(path = %path.display(), packages = lock.packages.len(), "parsed lock file");
        merged.lock.merge(lock);
        if let Some(dir) = path.parent() {
            merged.sources.push(dir.to_path_buf());
        }
    }
    Ok(merged)
}
