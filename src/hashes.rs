//! Content hash resolution.
//!
//! Registry crates carry their sha256 in the lock file. Git revisions are not
//! content hashes, so git packages are looked up in caller overrides and then
//! in the hash cache files found next to each lock file. A git hash is only
//! ever computed when the fetch context explicitly allows tree hashing; the
//! result then lands in the extended map so the next run can skip the work.

use crate::error::{Result, VendorError};
use crate::lock::LockFile;
use crate::source::{ClassifiedPackage, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `id → hash` map, serialized as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashCache(BTreeMap<String, String>);

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn insert(&mut self, id: impl Into<String>, hash: impl Into<String>) {
        self.0.insert(id.into(), hash.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|id, _| keep(id));
    }

    /// Right-biased union: entries of `other` replace ours.
    pub fn merge(&mut self, other: HashCache) {
        self.0.extend(other.0);
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| VendorError::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| VendorError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merge `<dir>/<file_name>` for every dir that has one, in order.
    pub fn load_merged(dirs: &[PathBuf], file_name: &str) -> Result<Self> {
        let mut merged = HashCache::new();
        for dir in dirs {
            let path = dir.join(file_name);
            if path.is_file() {
                let cache = HashCache::load(&path)?;
                debug!(path = %path.display(), entries = cache.len(), "loaded hash cache");
                merged.merge(cache);
            }
        }
        Ok(merged)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_string_pretty(self).map_err(|source| VendorError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        content.push('\n');
        fs::write(path, content).map_err(|e| VendorError::io(path, e))
    }
}

impl FromIterator<(String, String)> for HashCache {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        HashCache(iter.into_iter().collect())
    }
}

/// Where a resolved hash came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashOrigin {
    LockChecksum,
    LockMetadata,
    Override,
    Cache,
    Computed,
}

impl fmt::Display for HashOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HashOrigin::LockChecksum => "lock checksum",
            HashOrigin::LockMetadata => "lock metadata",
            HashOrigin::Override => "override",
            HashOrigin::Cache => "hash cache",
            HashOrigin::Computed => "computed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Known { hash: String, origin: HashOrigin },
    /// No trusted hash; the fetcher must compute it from the fetched tree.
    Compute,
}

pub struct HashResolver<'a> {
    lock: &'a LockFile,
    /// Ids of the git packages in the lock; the extended map is limited to them.
    git_ids: BTreeSet<String>,
    cache: HashCache,
    overrides: HashCache,
    computed: HashCache,
}

impl<'a> HashResolver<'a> {
    pub fn new(
        lock: &'a LockFile,
        git_ids: BTreeSet<String>,
        cache: HashCache,
        overrides: HashCache,
    ) -> Self {
        Self {
            lock,
            git_ids,
            cache,
            overrides,
            computed: HashCache::new(),
        }
    }

    /// Resolve the hash of one package.
    ///
    /// With `tree_hashing` false a git package without a trusted hash is an
    /// error; with it true the caller gets [`Resolution::Compute`].
    pub fn resolve(&self, pkg: &ClassifiedPackage, tree_hashing: bool) -> Result<Resolution> {
        match pkg.kind {
            SourceKind::RegistryCrate => self.resolve_registry(pkg),
            SourceKind::Git => match self.lookup_git(&pkg.id) {
                Some((hash, origin)) => Ok(Resolution::Known { hash, origin }),
                None if tree_hashing => Ok(Resolution::Compute),
                None => Err(VendorError::MissingHash {
                    id: pkg.id.clone(),
                    hint: "git revisions are not content hashes; add the hash to a hash \
                           cache file or an override file, or enable tree hashing"
                        .to_string(),
                }),
            },
        }
    }

    fn resolve_registry(&self, pkg: &ClassifiedPackage) -> Result<Resolution> {
        if let Some(sum) = &pkg.package.checksum {
            return Ok(Resolution::Known {
                hash: sum.clone(),
                origin: HashOrigin::LockChecksum,
            });
        }
        if let Some(sum) = self.lock.metadata_checksum(&pkg.id) {
            return Ok(Resolution::Known {
                hash: sum.to_string(),
                origin: HashOrigin::LockMetadata,
            });
        }
        Err(VendorError::MissingHash {
            id: pkg.id.clone(),
            hint: "the lock file has neither a checksum field nor a [metadata] entry".to_string(),
        })
    }

    /// Override first, then cache. Entries found here are trusted as-is.
    pub fn lookup_git(&self, id: &str) -> Option<(String, HashOrigin)> {
        if let Some(hash) = self.overrides.get(id) {
            return Some((hash.to_string(), HashOrigin::Override));
        }
        self.cache
            .get(id)
            .map(|hash| (hash.to_string(), HashOrigin::Cache))
    }

    pub fn record_computed(&mut self, id: &str, hash: &str) {
        self.computed.insert(id, hash);
    }

    pub fn computed(&self) -> &HashCache {
        &self.computed
    }

    /// The merged cache with overrides and freshly computed hashes folded
    /// in, ready to be written back to disk. Entries for packages that left
    /// the lock are dropped.
    pub fn extended(&self) -> HashCache {
        let mut out = self.cache.clone();
        out.merge(self.overrides.clone());
        out.retain(|id| self.git_ids.contains(id));
        out.merge(self.computed.clone());
        out
    }
}

/// Difference between a persisted hash file and a freshly extended map.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HashDrift {
    pub added: Vec<(String, String)>,
    pub removed: Vec<(String, String)>,
    /// `(id, previous, current)`.
    pub changed: Vec<(String, String, String)>,
}

impl HashDrift {
    pub fn between(previous: &HashCache, current: &HashCache) -> Self {
        let mut drift = HashDrift::default();
        for (id, old) in previous.iter() {
            match current.get(id) {
                None => drift.removed.push((id.to_string(), old.to_string())),
                Some(new) if new != old => {
                    drift
                        .changed
                        .push((id.to_string(), old.to_string(), new.to_string()))
                }
                Some(_) => {}
            }
        }
        for (id, new) in current.iter() {
            if previous.get(id).is_none() {
                drift.added.push((id.to_string(), new.to_string()));
            }
        }
        drift
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

impl fmt::Display for HashDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, hash) in &self.removed {
            writeln!(f, "- {id}: {hash}")?;
        }
        for (id, old, new) in &self.changed {
            writeln!(f, "- {id}: {old}")?;
            writeln!(f, "+ {id}: {new}")?;
        }
        for (id, hash) in &self.added {
            writeln!(f, "+ {id}: {hash}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_source::GitSourceSpec;
    use crate::lock::Package;

    fn git_pkg(name: &str) -> ClassifiedPackage {
        let source = "git+https://h/r#abc".to_string();
        let package = Package {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            source: Some(source.clone()),
            checksum: None,
            dependencies: Vec::new(),
        };
        ClassifiedPackage {
            id: package.id(),
            git: Some(GitSourceSpec::parse(&source).unwrap()),
            package,
            kind: SourceKind::Git,
        }
    }

    fn bare_resolver(lock: &LockFile) -> HashResolver<'_> {
        HashResolver::new(lock, BTreeSet::new(), HashCache::new(), HashCache::new())
    }

    fn registry_pkg(checksum: Option<&str>) -> ClassifiedPackage {
        let package = Package {
            name: "serde".to_string(),
            version: "1.0.0".to_string(),
            source: Some("registry+https://github.com/rust-lang/crates.io-index".to_string()),
            checksum: checksum.map(str::to_string),
            dependencies: Vec::new(),
        };
        ClassifiedPackage {
            id: package.id(),
            package,
            kind: SourceKind::RegistryCrate,
            git: None,
        }
    }

    #[test]
    fn test_registry_hash_from_metadata() {
        let pkg = registry_pkg(None);
        let mut lock = LockFile::default();
        lock.metadata
            .insert(format!("checksum {}", pkg.id), "abcd".to_string());
        let resolver = bare_resolver(&lock);
        assert_eq!(
            resolver.resolve(&pkg, false).unwrap(),
            Resolution::Known {
                hash: "abcd".to_string(),
                origin: HashOrigin::LockMetadata
            }
        );
    }

    #[test]
    fn test_registry_checksum_field_wins() {
        let pkg = registry_pkg(Some("ff"));
        let lock = LockFile::default();
        let resolver = bare_resolver(&lock);
        match resolver.resolve(&pkg, false).unwrap() {
            Resolution::Known { hash, origin } => {
                assert_eq!(hash, "ff");
                assert_eq!(origin, HashOrigin::LockChecksum);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_registry_missing_hash_is_fatal_even_with_tree_hashing() {
        let lock = LockFile::default();
        let resolver = bare_resolver(&lock);
        let err = resolver.resolve(&registry_pkg(None), true).unwrap_err();
        assert!(err.to_string().contains("serde 1.0.0"));
    }

    #[test]
    fn test_override_beats_cache() {
        let pkg = git_pkg("a");
        let lock = LockFile::default();
        let cache: HashCache = [(pkg.id.clone(), "h1".to_string())].into_iter().collect();
        let overrides: HashCache = [(pkg.id.clone(), "h2".to_string())].into_iter().collect();
        let resolver = HashResolver::new(&lock, BTreeSet::new(), cache, overrides);
        assert_eq!(
            resolver.resolve(&pkg, false).unwrap(),
            Resolution::Known {
                hash: "h2".to_string(),
                origin: HashOrigin::Override
            }
        );
    }

    #[test]
    fn test_missing_git_hash() {
        let pkg = git_pkg("a");
        let lock = LockFile::default();
        let resolver = bare_resolver(&lock);
        let err = resolver.resolve(&pkg, false).unwrap_err();
        assert!(matches!(err, VendorError::MissingHash { ref id, .. } if *id == pkg.id));
        assert_eq!(resolver.resolve(&pkg, true).unwrap(), Resolution::Compute);
    }

    #[test]
    fn test_extended_map_keeps_live_entries_and_adds_computed() {
        let lock = LockFile::default();
        let live = git_pkg("a");
        let cache: HashCache = [(live.id.clone(), "1".to_string())].into_iter().collect();
        let git_ids = [live.id.clone(), "new".to_string()].into_iter().collect();
        let mut resolver = HashResolver::new(&lock, git_ids, cache, HashCache::new());
        resolver.record_computed("new", "2");
        let extended = resolver.extended();
        assert_eq!(extended.get(&live.id), Some("1"));
        assert_eq!(extended.get("new"), Some("2"));
    }

    #[test]
    fn test_extended_map_drops_ids_missing_from_lock() {
        let lock = LockFile::default();
        let live = git_pkg("a");
        let cache: HashCache = [
            ("gone 0.1.0 (git+https://h/r#a)".to_string(), "11".to_string()),
            (live.id.clone(), "22".to_string()),
        ]
        .into_iter()
        .collect();
        let overrides: HashCache = [("stale".to_string(), "33".to_string())].into_iter().collect();
        let git_ids = [live.id.clone()].into_iter().collect();
        let resolver = HashResolver::new(&lock, git_ids, cache, overrides);
        let extended = resolver.extended();
        assert_eq!(extended.len(), 1);
        assert_eq!(extended.get(&live.id), Some("22"));
        assert_eq!(extended.get("gone 0.1.0 (git+https://h/r#a)"), None);
    }

    #[test]
    fn test_load_merged_later_files_win() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::write(a.path().join("h.json"), r#"{"x": "1", "y": "1"}"#).unwrap();
        fs::write(b.path().join("h.json"), r#"{"x": "2"}"#).unwrap();
        let dirs = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        let merged = HashCache::load_merged(&dirs, "h.json").unwrap();
        assert_eq!(merged.get("x"), Some("2"));
        assert_eq!(merged.get("y"), Some("1"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashes.json");
        let cache: HashCache = [("a".to_string(), "1".to_string())].into_iter().collect();
        cache.save(&path).unwrap();
        assert_eq!(HashCache::load(&path).unwrap(), cache);
    }

    #[test]
    fn test_drift_report() {
        let previous: HashCache = [
            ("same".to_string(), "1".to_string()),
            ("gone".to_string(), "2".to_string()),
            ("moved".to_string(), "3".to_string()),
        ]
        .into_iter()
        .collect();
        let current: HashCache = [
            ("same".to_string(), "1".to_string()),
            ("moved".to_string(), "4".to_string()),
            ("fresh".to_string(), "5".to_string()),
        ]
        .into_iter()
        .collect();
        let drift = HashDrift::between(&previous, &current);
        assert_eq!(drift.removed, vec![("gone".to_string(), "2".to_string())]);
        assert_eq!(
            drift.changed,
            vec![("moved".to_string(), "3".to_string(), "4".to_string())]
        );
        assert_eq!(drift.added, vec![("fresh".to_string(), "5".to_string())]);
        assert!(drift.to_string().contains("+ moved: 4"));
        assert!(HashDrift::between(&current, &current).is_empty());
    }
}
