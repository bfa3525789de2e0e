//! Package retrieval and normalization.
//!
//! Every package is fetched into its own directory under `sources/`, named
//! from its id alone, so fetches never share an output path and can run in
//! parallel. A normalized package directory looks like any crate Cargo
//! would unpack itself, plus a `.cargo-checksum.json` stub.
//!
//! Network and git access go through [`FetchContext`]; the engine never
//! touches the network directly.

mod git;
mod network;
mod registry;

pub use git::{inherit_workspace_values, select_package_root};
pub use network::NetworkContext;
pub use registry::unpack_crate;

use crate::config::Settings;
use crate::error::{FetchFailure, FetchStep, Result, VendorError};
use crate::git_source::GitSourceSpec;
use crate::hashes::{HashOrigin, Resolution};
use crate::source::{ClassifiedPackage, SourceKind};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const CHECKSUM_FILE: &str = ".cargo-checksum.json";

/// Network and hashing capability handed to the fetcher.
pub trait FetchContext: Sync {
    /// Fetch the full body of `url`.
    fn download(&self, url: &str) -> std::result::Result<Vec<u8>, FetchFailure>;

    /// Materialize the repository of `spec` at its resolved revision,
    /// submodules included, into the empty directory `dest`.
    fn checkout(&self, spec: &GitSourceSpec, dest: &Path) -> std::result::Result<(), FetchFailure>;

    /// Whether hashing fetched trees is allowed in this environment.
    fn tree_hashing(&self) -> bool;

    fn hash_tree(&self, dir: &Path) -> std::result::Result<String, FetchFailure> {
        tree_digest(dir)
    }
}

/// A package that has been fetched and normalized.
#[derive(Debug, Clone)]
pub struct FetchedPackage {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub hash: String,
    pub origin: HashOrigin,
    pub path: PathBuf,
}

/// Contents of `.cargo-checksum.json`. Cargo only checks that the file
/// exists for directory sources, so per-file digests are left empty.
#[derive(Serialize)]
struct ChecksumManifest<'a> {
    files: BTreeMap<String, String>,
    package: &'a str,
}

pub fn write_checksum_manifest(dir: &Path, hash: &str) -> std::io::Result<()> {
    let manifest = ChecksumManifest {
        files: BTreeMap::new(),
        package: hash,
    };
    let json = serde_json::to_string(&manifest).map_err(std::io::Error::other)?;
    fs::write(dir.join(CHECKSUM_FILE), json)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Compare hex digests, ignoring case.
pub(crate) fn verify_digest(expected: &str, actual: &str) -> std::result::Result<(), FetchFailure> {
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(FetchFailure::HashMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Output directory key for a package: readable prefix plus a digest of
/// the full id, so distinct ids never collide.
pub fn staging_key(pkg: &ClassifiedPackage) -> String {
    let digest = sha256_hex(pkg.id.as_bytes());
    format!("{}-{}-{}", pkg.package.name, pkg.package.version, &digest[..16])
}

fn is_vcs_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_name() == ".git"
}

/// Deterministic sha256 over a directory tree.
///
/// Files are visited in sorted path order; each contributes its relative
/// path, its length and its bytes. Symlinks contribute their target.
/// `.git` entries and the checksum stub are ignored.
pub fn tree_digest(dir: &Path) -> std::result::Result<String, FetchFailure> {
    let mut hasher = Sha256::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_vcs_dir(e));

    for entry in walker {
        let entry = entry.map_err(|e| FetchFailure::Io(e.into()))?;
        let rel = relative_slash_path(dir, entry.path());
        if rel.is_empty() || rel == CHECKSUM_FILE || entry.file_type().is_dir() {
            continue;
        }

        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path())?;
            hasher.update(b"->");
            hasher.update(target.to_string_lossy().as_bytes());
        } else {
            let mut file = fs::File::open(entry.path())?;
            let len = entry.metadata().map_err(|e| FetchFailure::Io(e.into()))?.len();
            hasher.update(len.to_string().as_bytes());
            hasher.update([0u8]);
            let mut buffer = [0u8; 8192];
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
        }
        hasher.update([0u8]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn relative_slash_path(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Copy `src` into `dst`, skipping version-control metadata.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    let walker = WalkDir::new(src)
        .into_iter()
        .filter_entry(|e| !is_vcs_dir(e));
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);
        let ty = entry.file_type();
        if ty.is_dir() {
            fs::create_dir_all(&target)?;
        } else if ty.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        copy_tree(src, dst)
    } else {
        fs::copy(src, dst).map(|_| ())
    }
}

fn reset_dir(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)
}

/// Fetches packages into `<sources_dir>/<staging key>`.
pub struct Fetcher<'a> {
    ctx: &'a dyn FetchContext,
    settings: &'a Settings,
    sources_dir: PathBuf,
}

impl<'a> Fetcher<'a> {
    pub fn new(ctx: &'a dyn FetchContext, settings: &'a Settings, sources_dir: &Path) -> Self {
        Self {
            ctx,
            settings,
            sources_dir: sources_dir.to_path_buf(),
        }
    }

    pub fn fetch(&self, pkg: &ClassifiedPackage, resolution: &Resolution) -> Result<FetchedPackage> {
        let dest = self.sources_dir.join(staging_key(pkg));
        reset_dir(&dest).map_err(|e| VendorError::io(&dest, e))?;

        let (hash, origin) = match pkg.kind {
            SourceKind::RegistryCrate => {
                let Resolution::Known { hash, origin } = resolution else {
                    return Err(VendorError::MissingHash {
                        id: pkg.id.clone(),
                        hint: "registry crates need a checksum from the lock file".to_string(),
                    });
                };
                registry::fetch_registry_crate(self.ctx, self.settings, pkg, hash, &dest)?;
                (hash.clone(), *origin)
            }
            SourceKind::Git => {
                git::fetch_git_package(self.ctx, pkg, &dest)?;
                self.settle_git_hash(pkg, resolution, &dest)?
            }
        };

        write_checksum_manifest(&dest, &hash)
            .map_err(|e| FetchFailure::Io(e).at(&pkg.id, FetchStep::Copy))?;

        Ok(FetchedPackage {
            id: pkg.id.clone(),
            name: pkg.package.name.clone(),
            kind: pkg.kind,
            hash,
            origin,
            path: dest,
        })
    }

    /// Verify a trusted git hash against the tree when hashing is allowed,
    /// or compute it when none was available.
    fn settle_git_hash(
        &self,
        pkg: &ClassifiedPackage,
        resolution: &Resolution,
        dest: &Path,
    ) -> Result<(String, HashOrigin)> {
        match resolution {
            Resolution::Known { hash, origin } => {
                if self.ctx.tree_hashing() {
                    let actual = self
                        .ctx
                        .hash_tree(dest)
                        .map_err(|f| f.at(&pkg.id, FetchStep::Hash))?;
                    verify_digest(hash, &actual).map_err(|f| f.at(&pkg.id, FetchStep::Verify))?;
                }
                Ok((hash.clone(), *origin))
            }
            Resolution::Compute => {
                let hash = self
                    .ctx
                    .hash_tree(dest)
                    .map_err(|f| f.at(&pkg.id, FetchStep::Hash))?;
                Ok((hash, HashOrigin::Computed))
            }
        }
    }
}
