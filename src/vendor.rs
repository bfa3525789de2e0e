//! Vendor root assembly.
//!
//! Fetched package directories are linked into one directory, each under a
//! name derived from the package's resolved content hash. Packages that
//! resolve to identical content (the same git revision vendored under two
//! version labels, or an id listed by several lock files) collapse into a
//! single entry. Links are relative, so the output tree can be moved.

use crate::error::{Result, VendorError};
use crate::fetch::FetchedPackage;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorEntry {
    pub content_name: String,
    /// The fetched package directory this entry points at.
    pub path: PathBuf,
    /// Every package id that maps to this entry.
    pub ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VendorRoot {
    pub dir: PathBuf,
    pub entries: BTreeMap<String, VendorEntry>,
}

impl VendorRoot {
    /// Number of packages that were folded into an existing entry.
    pub fn collapsed(&self) -> usize {
        self.entries.values().map(|e| e.ids.len() - 1).sum()
    }
}

/// Content-derived entry name: crate name plus a prefix of its hash.
pub fn content_name(crate_name: &str, hash: &str) -> String {
    let digest: String = hash
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(HASH_PREFIX_LEN)
        .collect();
    format!("{crate_name}-{digest}")
}

/// Group fetched packages by content name. The package with the smallest
/// id provides the directory, so the result does not depend on input order.
pub fn plan(fetched: &[FetchedPackage]) -> BTreeMap<String, VendorEntry> {
    let mut sorted: Vec<&FetchedPackage> = fetched.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut entries: BTreeMap<String, VendorEntry> = BTreeMap::new();
    for pkg in sorted {
        let name = content_name(&pkg.name, &pkg.hash);
        entries
            .entry(name.clone())
            .and_modify(|entry| {
                if !entry.ids.contains(&pkg.id) {
                    entry.ids.push(pkg.id.clone());
                }
            })
            .or_insert_with(|| VendorEntry {
                content_name: name,
                path: pkg.path.clone(),
                ids: vec![pkg.id.clone()],
            });
    }
    entries
}

/// Rebuild `vendor_dir` from `fetched`.
pub fn assemble(fetched: &[FetchedPackage], vendor_dir: &Path) -> Result<VendorRoot> {
    if vendor_dir.exists() {
        fs::remove_dir_all(vendor_dir).map_err(|e| VendorError::io(vendor_dir, e))?;
    }
    fs::create_dir_all(vendor_dir).map_err(|e| VendorError::io(vendor_dir, e))?;

    let entries = plan(fetched);
    for entry in entries.values() {
        let link = vendor_dir.join(&entry.content_name);
        link_entry(&entry.path, vendor_dir, &link).map_err(|e| VendorError::io(&link, e))?;
        debug!(entry = %entry.content_name, ids = entry.ids.len(), "linked vendor entry");
    }

    Ok(VendorRoot {
        dir: vendor_dir.to_path_buf(),
        entries,
    })
}

#[cfg(unix)]
fn link_entry(target: &Path, vendor_dir: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(relative_path(vendor_dir, target), link)
}

#[cfg(not(unix))]
fn link_entry(target: &Path, _vendor_dir: &Path, link: &Path) -> std::io::Result<()> {
    crate::fetch::copy_tree(target, link)
}

/// Path of `target` as seen from directory `from`.
pub fn relative_path(from: &Path, target: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let target: Vec<Component> = target.components().collect();
    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for part in &target[common..] {
        out.push(part.as_os_str());
    }
    out
}
