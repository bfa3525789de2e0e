//! Package classification by source kind.
//!
//! Path dependencies (no `source`) are set aside here and never reach the
//! fetcher. Everything else must be either the public registry or a git
//! remote; any other source string aborts the run.

use crate::config::{CRATES_IO_INDEX, CRATES_IO_SPARSE_INDEX};
use crate::error::{Result, VendorError};
use crate::git_source::{GIT_PREFIX, GitSourceSpec};
use crate::lock::{LockFile, Package};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceKind {
    RegistryCrate,
    Git,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::RegistryCrate => f.write_str("registry"),
            SourceKind::Git => f.write_str("git"),
        }
    }
}

/// A vendorable package with its identity and parsed source.
#[derive(Debug, Clone)]
pub struct ClassifiedPackage {
    pub id: String,
    pub package: Package,
    pub kind: SourceKind,
    /// Parsed source for [`SourceKind::Git`] packages.
    pub git: Option<GitSourceSpec>,
}

/// Packages of one run, deduplicated by id and ordered by id.
#[derive(Debug, Default)]
pub struct Classified {
    pub registry: Vec<ClassifiedPackage>,
    pub git: Vec<ClassifiedPackage>,
    /// Ids of path dependencies that were skipped.
    pub local: Vec<String>,
}

impl Classified {
    pub fn all(&self) -> impl Iterator<Item = &ClassifiedPackage> {
        self.registry.iter().chain(self.git.iter())
    }

    pub fn len(&self) -> usize {
        self.registry.len() + self.git.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct git sources by literal source string. Many crates of one
    /// repository share a single source string.
    pub fn git_sources(&self) -> BTreeMap<&str, &GitSourceSpec> {
        let mut sources = BTreeMap::new();
        for pkg in &self.git {
            if let (Some(source), Some(spec)) = (pkg.package.source.as_deref(), pkg.git.as_ref()) {
                sources.entry(source).or_insert(spec);
            }
        }
        sources
    }
}

/// Classify one package. `Ok(None)` means a path dependency.
pub fn classify(package: &Package, registry_index: &str) -> Result<Option<SourceKind>> {
    let Some(source) = package.source.as_deref() else {
        return Ok(None);
    };

    if let Some(index) = source.strip_prefix("registry+")
        && index == registry_index
    {
        return Ok(Some(SourceKind::RegistryCrate));
    }
    if source == CRATES_IO_SPARSE_INDEX && registry_index == CRATES_IO_INDEX {
        return Ok(Some(SourceKind::RegistryCrate));
    }
    if source.starts_with(GIT_PREFIX) {
        return Ok(Some(SourceKind::Git));
    }

    Err(VendorError::Classification {
        id: package.id(),
        source_str: source.to_string(),
    })
}

/// Classify every package of a merged lock, collapsing equal ids.
pub fn classify_all(lock: &LockFile, registry_index: &str) -> Result<Classified> {
    let mut by_id: BTreeMap<String, Package> = BTreeMap::new();
    for pkg in &lock.packages {
        let entry = by_id.entry(pkg.id()).or_insert_with(|| pkg.clone());
        if entry.checksum.is_none() {
            entry.checksum.clone_from(&pkg.checksum);
        }
    }

    let mut classified = Classified::default();
    for (id, package) in by_id {
        match classify(&package, registry_index)? {
            None => {
                debug!(%id, "skipping path dependency");
                classified.local.push(id);
            }
            Some(SourceKind::RegistryCrate) => classified.registry.push(ClassifiedPackage {
                id,
                package,
                kind: SourceKind::RegistryCrate,
                git: None,
            }),
            Some(SourceKind::Git) => {
                let spec = GitSourceSpec::parse(package.source.as_deref().unwrap_or_default())
                    .map_err(|e| e.for_package(&id))?;
                classified.git.push(ClassifiedPackage {
                    id,
                    package,
                    kind: SourceKind::Git,
                    git: Some(spec),
                });
            }
        }
    }
    Ok(classified)
}
