//! Git package checkout and workspace member selection.

use super::{FetchContext, copy_tree, reset_dir};
use crate::error::{FetchFailure, FetchStep, Result};
use crate::source::ClassifiedPackage;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::debug;
use walkdir::WalkDir;

const MANIFEST: &str = "Cargo.toml";

const DEPENDENCY_TABLES: [&str; 3] = ["dependencies", "dev-dependencies", "build-dependencies"];

pub(super) fn fetch_git_package(
    ctx: &dyn FetchContext,
    pkg: &ClassifiedPackage,
    dest: &Path,
) -> Result<()> {
    let Some(spec) = pkg.git.as_ref() else {
        return Err(FetchFailure::Manifest {
            path: pkg.package.source.clone().unwrap_or_default(),
            message: "not a git source".to_string(),
        }
        .at(&pkg.id, FetchStep::Checkout));
    };
    // Not `with_extension`: the version in the key already contains dots.
    let mut checkout = dest.as_os_str().to_owned();
    checkout.push(".checkout");
    let checkout = PathBuf::from(checkout);
    reset_dir(&checkout).map_err(|e| FetchFailure::Io(e).at(&pkg.id, FetchStep::Checkout))?;

    debug!(id = %pkg.id, revision = %spec.revision(), "checking out");
    ctx.checkout(spec, &checkout)
        .map_err(|f| f.at(&pkg.id, FetchStep::Checkout))?;

    let name = &pkg.package.name;
    let member = select_package_root(&checkout, name)
        .map_err(|f| f.at(&pkg.id, FetchStep::SelectMember))?;
    debug!(id = %pkg.id, member = %member.display(), "selected package root");

    copy_tree(&member, dest).map_err(|e| FetchFailure::Io(e).at(&pkg.id, FetchStep::Copy))?;
    if member != checkout {
        rewrite_member_manifest(&checkout, dest)
            .map_err(|f| f.at(&pkg.id, FetchStep::Copy))?;
    }

    fs::remove_dir_all(&checkout).map_err(|e| FetchFailure::Io(e).at(&pkg.id, FetchStep::Copy))
}

fn read_manifest(path: &Path) -> std::result::Result<Table, FetchFailure> {
    let content = fs::read_to_string(path)?;
    content.parse::<Table>().map_err(|e| FetchFailure::Manifest {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn package_name(manifest: &Table) -> Option<&str> {
    manifest.get("package")?.get("name")?.as_str()
}

/// Directory inside a checkout that holds the crate `name`.
///
/// A repository whose root manifest is the crate itself, or that is not a
/// workspace, is used as-is. Otherwise exactly one manifest below the root
/// must declare `[package] name = "<name>"`.
pub fn select_package_root(checkout: &Path, name: &str) -> std::result::Result<PathBuf, FetchFailure> {
    let root_manifest = read_manifest(&checkout.join(MANIFEST))?;
    if package_name(&root_manifest) == Some(name) || !root_manifest.contains_key("workspace") {
        return Ok(checkout.to_path_buf());
    }

    let mut candidates = Vec::new();
    let walker = WalkDir::new(checkout)
        .min_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git" && e.file_name() != "target");
    for entry in walker.flatten() {
        if entry.file_name() != MANIFEST || !entry.file_type().is_file() {
            continue;
        }
        // Unparseable manifests (fixtures, templates) cannot be the member we want.
        let Ok(manifest) = read_manifest(entry.path()) else {
            continue;
        };
        if package_name(&manifest) == Some(name)
            && let Some(dir) = entry.path().parent()
        {
            candidates.push(dir.to_path_buf());
        }
    }

    match candidates.len() {
        0 => Err(FetchFailure::NoWorkspaceMember {
            name: name.to_string(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(FetchFailure::AmbiguousWorkspaceMember {
            name: name.to_string(),
            candidates: candidates
                .iter()
                .map(|dir| {
                    dir.strip_prefix(checkout)
                        .unwrap_or(dir)
                        .join(MANIFEST)
                        .display()
                        .to_string()
                })
                .collect(),
        }),
    }
}

/// Inline `workspace = true` values of a copied member manifest, so the
/// vendored crate no longer depends on its workspace root.
fn rewrite_member_manifest(checkout: &Path, dest: &Path) -> std::result::Result<(), FetchFailure> {
    let workspace = read_manifest(&checkout.join(MANIFEST))?;
    let member_path = dest.join(MANIFEST);
    let mut member = read_manifest(&member_path)?;
    if inherit_workspace_values(&mut member, &workspace).map_err(|message| {
        FetchFailure::Manifest {
            path: member_path.display().to_string(),
            message,
        }
    })? {
        let rendered = toml::to_string(&member).map_err(|e| FetchFailure::Manifest {
            path: member_path.display().to_string(),
            message: e.to_string(),
        })?;
        fs::write(&member_path, rendered)?;
    }
    Ok(())
}

fn inherits(value: &Value) -> bool {
    value
        .as_table()
        .and_then(|t| t.get("workspace"))
        .and_then(Value::as_bool)
        == Some(true)
}

/// Replace every inherited field of `member` with the workspace's value.
/// Returns whether anything changed.
pub fn inherit_workspace_values(member: &mut Table, workspace_manifest: &Table) -> std::result::Result<bool, String> {
    let empty = Table::new();
    let workspace = workspace_manifest
        .get("workspace")
        .and_then(Value::as_table)
        .unwrap_or(&empty);
    let ws_package = workspace.get("package").and_then(Value::as_table).unwrap_or(&empty);
    let ws_deps = workspace
        .get("dependencies")
        .and_then(Value::as_table)
        .unwrap_or(&empty);
    let mut changed = false;

    if let Some(package) = member.get_mut("package").and_then(Value::as_table_mut) {
        for (key, value) in package.iter_mut() {
            if inherits(value) {
                *value = ws_package
                    .get(key)
                    .cloned()
                    .ok_or_else(|| format!("workspace does not define package.{key}"))?;
                changed = true;
            }
        }
    }

    if let Some(lints) = member.get("lints")
        && inherits(lints)
    {
        match workspace.get("lints") {
            Some(ws_lints) => {
                member.insert("lints".to_string(), ws_lints.clone());
            }
            None => return Err("workspace does not define lints".to_string()),
        }
        changed = true;
    }

    for key in DEPENDENCY_TABLES {
        if let Some(deps) = member.get_mut(key).and_then(Value::as_table_mut) {
            changed |= inherit_dependencies(deps, ws_deps)?;
        }
    }
    if let Some(targets) = member.get_mut("target").and_then(Value::as_table_mut) {
        for (_, target) in targets.iter_mut() {
            let Some(target) = target.as_table_mut() else {
                continue;
            };
            for key in DEPENDENCY_TABLES {
                if let Some(deps) = target.get_mut(key).and_then(Value::as_table_mut) {
                    changed |= inherit_dependencies(deps, ws_deps)?;
                }
            }
        }
    }

    Ok(changed)
}

fn inherit_dependencies(deps: &mut Table, ws_deps: &Table) -> std::result::Result<bool, String> {
    let mut changed = false;
    for (name, value) in deps.iter_mut() {
        if !inherits(value) {
            continue;
        }
        let Some(local) = value.as_table() else {
            continue;
        };
        let mut merged = match ws_deps.get(name) {
            Some(Value::String(version)) => {
                let mut t = Table::new();
                t.insert("version".to_string(), Value::String(version.clone()));
                t
            }
            Some(Value::Table(t)) => t.clone(),
            _ => return Err(format!("workspace does not define dependency '{name}'")),
        };
        // Path dependencies of the upstream workspace are vendored on their own.
        if merged.contains_key("version") {
            merged.remove("path");
        }

        for (key, local_value) in local {
            match key.as_str() {
                "workspace" => {}
                "features" => {
                    let mut features: Vec<Value> = merged
                        .get("features")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    for feature in local_value.as_array().into_iter().flatten() {
                        if !features.contains(feature) {
                            features.push(feature.clone());
                        }
                    }
                    merged.insert("features".to_string(), Value::Array(features));
                }
                _ => {
                    merged.insert(key.clone(), local_value.clone());
                }
            }
        }
        *value = Value::Table(merged);
        changed = true;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_single_package_uses_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Cargo.toml", "[package]\nname = \"foo\"\nversion = \"1.0.0\"\n");
        assert_eq!(select_package_root(dir.path(), "foo").unwrap(), dir.path());
    }

    #[test]
    fn test_workspace_member_found() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Cargo.toml", "[workspace]\nmembers = [\"crates/*\"]\n");
        write(dir.path(), "crates/foo/Cargo.toml", "[package]\nname = \"foo\"\n");
        write(dir.path(), "crates/bar/Cargo.toml", "[package]\nname = \"bar\"\n");
        assert_eq!(
            select_package_root(dir.path(), "bar").unwrap(),
            dir.path().join("crates/bar")
        );
    }

    #[test]
    fn test_workspace_member_missing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Cargo.toml", "[workspace]\nmembers = []\n");
        assert!(matches!(
            select_package_root(dir.path(), "nope"),
            Err(FetchFailure::NoWorkspaceMember { .. })
        ));
    }

    #[test]
    fn test_workspace_member_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Cargo.toml", "[workspace]\n");
        write(dir.path(), "a/Cargo.toml", "[package]\nname = \"dup\"\n");
        write(dir.path(), "b/Cargo.toml", "[package]\nname = \"dup\"\n");
        match select_package_root(dir.path(), "dup") {
            Err(FetchFailure::AmbiguousWorkspaceMember { candidates, .. }) => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_root_package_in_workspace_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "Cargo.toml",
            "[package]\nname = \"top\"\n\n[workspace]\nmembers = [\"sub\"]\n",
        );
        write(dir.path(), "sub/Cargo.toml", "[package]\nname = \"top\"\n");
        assert_eq!(select_package_root(dir.path(), "top").unwrap(), dir.path());
    }

    #[test]
    fn test_inherit_workspace_values() {
        let workspace: Table = r#"
[workspace.package]
version = "0.4.0"
edition = "2021"

[workspace.dependencies]
serde = { version = "1", features = ["derive"] }
log = "0.4"
sibling = { path = "crates/sibling", version = "0.4.0" }
"#
        .parse()
        .unwrap();
        let mut member: Table = r#"
[package]
name = "foo"
version.workspace = true
edition = { workspace = true }

[dependencies]
serde = { workspace = true, features = ["rc"], optional = true }
log.workspace = true
sibling.workspace = true
"#
        .parse()
        .unwrap();

        assert!(inherit_workspace_values(&mut member, &workspace).unwrap());
        assert_eq!(member["package"]["version"].as_str(), Some("0.4.0"));
        assert_eq!(member["package"]["edition"].as_str(), Some("2021"));
        let serde = member["dependencies"]["serde"].as_table().unwrap();
        assert_eq!(serde["features"].as_array().unwrap().len(), 2);
        assert_eq!(serde["optional"].as_bool(), Some(true));
        assert_eq!(member["dependencies"]["log"]["version"].as_str(), Some("0.4"));
        assert!(member["dependencies"]["sibling"].get("path").is_none());
    }

    #[test]
    fn test_inherit_target_dependencies() {
        let workspace: Table = "[workspace.dependencies]\nlibc = \"0.2\"\n"
            .parse()
            .unwrap();
        let mut member: Table = r#"
[package]
name = "foo"
version = "0.1.0"

[target.'cfg(unix)'.dependencies]
libc.workspace = true
"#
        .parse()
        .unwrap();

        assert!(inherit_workspace_values(&mut member, &workspace).unwrap());
        let libc = &member["target"]["cfg(unix)"]["dependencies"]["libc"];
        assert_eq!(libc["version"].as_str(), Some("0.2"));
        assert!(libc.get("workspace").is_none());
    }

    #[test]
    fn test_inherit_missing_value_is_error() {
        let workspace: Table = "[workspace]\n".parse().unwrap();
        let mut member: Table = "[package]\nname = \"x\"\nversion.workspace = true\n"
            .parse()
            .unwrap();
        assert!(inherit_workspace_values(&mut member, &workspace).is_err());
    }
}
