//! Registry crate download and unpacking.

use super::{FetchContext, sha256_hex, verify_digest};
use crate::config::Settings;
use crate::error::{FetchFailure, FetchStep, Result};
use crate::source::ClassifiedPackage;
use flate2::read::GzDecoder;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, warn};

pub(super) fn fetch_registry_crate(
    ctx: &dyn FetchContext,
    settings: &Settings,
    pkg: &ClassifiedPackage,
    expected: &str,
    dest: &Path,
) -> Result<()> {
    let name = &pkg.package.name;
    let version = &pkg.package.version;
    let cached = settings
        .download_cache_dir()
        .map(|dir| dir.join(format!("{}-{}.crate", name, version)));

    let bytes = match cached.as_deref().and_then(|path| read_verified(path, expected)) {
        Some(bytes) => {
            debug!(id = %pkg.id, "using cached archive");
            bytes
        }
        None => {
            let url = settings.crate_download_url(name, version);
            debug!(id = %pkg.id, %url, "downloading");
            let bytes = ctx
                .download(&url)
                .map_err(|f| f.at(&pkg.id, FetchStep::Download))?;
            verify_digest(expected, &sha256_hex(&bytes))
                .map_err(|f| f.at(&pkg.id, FetchStep::Verify))?;
            if let Some(path) = &cached {
                store_archive(path, &bytes);
            }
            bytes
        }
    };

    unpack_crate(&bytes, dest).map_err(|f| f.at(&pkg.id, FetchStep::Unpack))
}

/// A cached archive is only reused if it still matches the expected hash.
fn read_verified(path: &Path, expected: &str) -> Option<Vec<u8>> {
    let bytes = fs::read(path).ok()?;
    verify_digest(expected, &sha256_hex(&bytes)).ok()?;
    Some(bytes)
}

fn store_archive(path: &Path, bytes: &[u8]) {
    let result = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(path, bytes));
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "could not cache crate archive");
    }
}

/// Unpack a `.crate` (gzip tarball) into `dest`, stripping the single
/// top-level `name-version/` directory.
pub fn unpack_crate(bytes: &[u8], dest: &Path) -> std::result::Result<(), FetchFailure> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut top: Option<PathBuf> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
        let Some(first) = components.next() else {
            continue;
        };
        let first = match first {
            Component::Normal(part) => PathBuf::from(part),
            _ => {
                return Err(FetchFailure::Archive(format!(
                    "unsafe path '{}'",
                    path.display()
                )));
            }
        };
        match &top {
            None => top = Some(first),
            Some(existing) if *existing != first => {
                return Err(FetchFailure::Archive(format!(
                    "more than one top-level directory ('{}' and '{}')",
                    existing.display(),
                    first.display()
                )));
            }
            Some(_) => {}
        }

        let rest: PathBuf = components.map(|c| c.as_os_str()).collect();
        if rest.as_os_str().is_empty() {
            continue;
        }
        if rest
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(FetchFailure::Archive(format!(
                "unsafe path '{}'",
                path.display()
            )));
        }

        check_link(&entry, &path)?;
        check_ancestors(dest, &rest, &path)?;

        let target = dest.join(&rest);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }

    if top.is_none() {
        return Err(FetchFailure::Archive("archive is empty".to_string()));
    }
    Ok(())
}

/// Hard links are refused; symlinks must stay relative and never climb.
fn check_link<R: std::io::Read>(
    entry: &tar::Entry<'_, R>,
    path: &Path,
) -> std::result::Result<(), FetchFailure> {
    match entry.header().entry_type() {
        EntryType::Link => Err(FetchFailure::Archive(format!(
            "hard link '{}' is not allowed",
            path.display()
        ))),
        EntryType::Symlink => {
            let link = entry.link_name()?.unwrap_or_default();
            if link
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            {
                Ok(())
            } else {
                Err(FetchFailure::Archive(format!(
                    "symlink '{}' points outside the crate ('{}')",
                    path.display(),
                    link.display()
                )))
            }
        }
        _ => Ok(()),
    }
}

/// Refuse to write through a symlink that an earlier entry created.
fn check_ancestors(
    dest: &Path,
    rest: &Path,
    path: &Path,
) -> std::result::Result<(), FetchFailure> {
    let mut current = dest.to_path_buf();
    let mut parents = rest.components();
    parents.next_back();
    for part in parents {
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(FetchFailure::Archive(format!(
                    "entry '{}' would be written through a symlink",
                    path.display()
                )));
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::Builder;

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &content[..]).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_unpack_strips_top_level() {
        let bytes = tarball(&[
            ("serde-1.0.0/Cargo.toml", b"[package]\nname = \"serde\"\n"),
            ("serde-1.0.0/src/lib.rs", b"// lib\n"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        unpack_crate(&bytes, dir.path()).unwrap();
        assert!(dir.path().join("Cargo.toml").is_file());
        assert!(dir.path().join("src/lib.rs").is_file());
        assert!(!dir.path().join("serde-1.0.0").exists());
    }

    #[test]
    fn test_unpack_rejects_two_roots() {
        let bytes = tarball(&[("a/Cargo.toml", b"x"), ("b/Cargo.toml", b"y")]);
        let dir = tempfile::tempdir().unwrap();
        let err = unpack_crate(&bytes, dir.path()).unwrap_err();
        assert!(err.to_string().contains("more than one top-level directory"));
    }

    fn tarball_with_symlink(link: &str, to: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder.append_link(&mut header, link, to).unwrap();
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &content[..]).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_unpack_rejects_symlink_escaping_dest() {
        let outside = tempfile::tempdir().unwrap();
        let bytes = tarball_with_symlink(
            "x-1.0.0/link",
            outside.path().to_str().unwrap(),
            &[("x-1.0.0/link/pwned", b"gotcha")],
        );
        let dir = tempfile::tempdir().unwrap();
        let err = unpack_crate(&bytes, dir.path()).unwrap_err();
        assert!(err.to_string().contains("symlink"));
        assert!(!outside.path().join("pwned").exists());
    }

    #[test]
    fn test_unpack_rejects_parent_symlink() {
        let bytes = tarball_with_symlink("x-1.0.0/up", "../..", &[]);
        let dir = tempfile::tempdir().unwrap();
        let err = unpack_crate(&bytes, dir.path()).unwrap_err();
        assert!(err.to_string().contains("points outside the crate"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_refuses_writes_through_existing_symlink() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let bytes = tarball(&[("x-1.0.0/link/pwned", b"gotcha")]);
        let err = unpack_crate(&bytes, dir.path()).unwrap_err();
        assert!(err.to_string().contains("through a symlink"));
        assert!(!outside.path().join("pwned").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_keeps_inner_relative_symlink() {
        let bytes = tarball_with_symlink(
            "x-1.0.0/README",
            "docs/README.md",
            &[("x-1.0.0/docs/README.md", b"# x\n")],
        );
        let dir = tempfile::tempdir().unwrap();
        unpack_crate(&bytes, dir.path()).unwrap();
        let meta = fs::symlink_metadata(dir.path().join("README")).unwrap();
        assert!(meta.file_type().is_symlink());
        assert!(dir.path().join("docs/README.md").is_file());
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        assert!(unpack_crate(b"not a tarball", dir.path()).is_err());
    }
}
