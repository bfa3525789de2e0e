//! CLI command handlers
//!
//! Each handler loads settings from the project root, applies command-line
//! overrides and prints results the way the rest of the CLI does.

pub mod hashes;
pub mod list;
pub mod parse_git;
pub mod vendor;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{SETTINGS_FILE, Settings};
use crate::hashes::HashCache;

/// Load `lockvendor.toml` from `root`, or defaults when it is absent.
pub fn load_settings(root: &Path) -> Result<Settings> {
    Settings::load(root).with_context(|| {
        format!(
            "Failed to load {}",
            root.join(SETTINGS_FILE).display()
        )
    })
}

/// Merge hash override files left to right; later files win.
pub fn load_overrides(paths: &[PathBuf]) -> Result<HashCache> {
    let mut overrides = HashCache::new();
    for path in paths {
        let file = HashCache::load(path)
            .with_context(|| format!("Failed to read hash overrides {}", path.display()))?;
        overrides.merge(file);
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_later_override_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        fs::write(&a, r#"{"x 1.0.0 (git+https://h/r#1)": "aa", "y": "yy"}"#).unwrap();
        fs::write(&b, r#"{"x 1.0.0 (git+https://h/r#1)": "bb"}"#).unwrap();

        let merged = load_overrides(&[a, b]).unwrap();
        assert_eq!(merged.get("x 1.0.0 (git+https://h/r#1)"), Some("bb"));
        assert_eq!(merged.get("y"), Some("yy"));
    }

    #[test]
    fn test_missing_override_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_overrides(&[dir.path().join("nope.json")]).unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }
}
