//! Run settings (`lockvendor.toml`).
//!
//! The file is optional; every key has a default. Command-line flags are
//! applied on top of whatever the file provides.

use crate::error::{Result, VendorError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "lockvendor.toml";

pub const CRATES_IO_INDEX: &str = "https://github.com/rust-lang/crates.io-index";
pub const CRATES_IO_SPARSE_INDEX: &str = "sparse+https://index.crates.io/";

#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory under the root whose direct subdirectories hold extra lock files.
    pub extra_sources_dir: String,
    /// Hash cache file name, looked up next to every lock file.
    pub hash_cache_file: String,
    pub registry_index: String,
    pub download_base: String,
    /// Name of the replacement source in the emitted config.
    pub vendor_dir_name: String,
    /// Allow computing missing git hashes from the fetched tree.
    pub tree_hashing: bool,
    pub download_cache: bool,
    /// Fetch parallelism; 0 lets rayon decide.
    pub jobs: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extra_sources_dir: "cargo-vendor-extra".to_string(),
            hash_cache_file: "cargo-git-hashes.json".to_string(),
            registry_index: CRATES_IO_INDEX.to_string(),
            download_base: "https://static.crates.io/crates".to_string(),
            vendor_dir_name: "vendored-sources".to_string(),
            tree_hashing: false,
            download_cache: true,
            jobs: 0,
        }
    }
}

impl Settings {
    /// Load `lockvendor.toml` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| VendorError::io(&path, e))?;
        Self::from_toml(&content).map_err(|message| VendorError::Parse { path, message })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Where verified `.crate` archives are kept between runs.
    pub fn download_cache_dir(&self) -> Option<PathBuf> {
        if !self.download_cache {
            return None;
        }
        dirs::cache_dir().map(|dir| dir.join("lockvendor").join("crates"))
    }

    /// Canonical download URL of a registry crate archive.
    pub fn crate_download_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/{}/{}-{}.crate",
            self.download_base.trim_end_matches('/'),
            name,
            name,
            version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.extra_sources_dir, "cargo-vendor-extra");
        assert!(!settings.tree_hashing);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings = Settings::from_toml("tree_hashing = true\njobs = 4\n").unwrap();
        assert!(settings.tree_hashing);
        assert_eq!(settings.jobs, 4);
        assert_eq!(settings.registry_index, CRATES_IO_INDEX);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(Settings::from_toml("tree_hash = true").is_err());
    }

    #[test]
    fn test_crate_download_url() {
        let settings = Settings::default();
        assert_eq!(
            settings.crate_download_url("serde", "1.0.0"),
            "https://static.crates.io/crates/serde/serde-1.0.0.crate"
        );
    }
}
