//! Error types for a vendoring run.
//!
//! Every variant is fatal: a run either succeeds completely or stops at the
//! first error, which always names the offending file or package id.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for vendoring operations.
pub type Result<T> = std::result::Result<T, VendorError>;

/// Errors that abort a vendoring run.
#[derive(Error, Debug)]
pub enum VendorError {
    /// A lock file could not be read as TOML or failed validation.
    #[error("failed to parse lock file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// A `git+` source string is malformed.
    #[error("invalid git source '{source_str}': {reason}")]
    GitSource { source_str: String, reason: String },

    /// A locked package carries a malformed `git+` source.
    #[error("package {id} has an invalid git source '{source_str}': {reason}")]
    PackageGitSource {
        id: String,
        source_str: String,
        reason: String,
    },

    /// The source string does not name a known registry or a git remote.
    #[error("unknown source type for package {id}: '{source_str}'")]
    Classification { id: String, source_str: String },

    #[error("no hash available for package {id}: {hint}")]
    MissingHash { id: String, hint: String },

    /// Retrieving or normalizing a package failed.
    #[error("failed to {step} package {id}: {reason}")]
    Fetch {
        id: String,
        step: FetchStep,
        reason: FetchFailure,
    },

    /// The redirection config would contain the same section twice.
    #[error("duplicate source replacement section [{section}] (from '{first}' and '{second}')")]
    Config {
        section: String,
        first: String,
        second: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl VendorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VendorError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn git_source(source_str: &str, reason: impl Into<String>) -> Self {
        VendorError::GitSource {
            source_str: source_str.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the id of the lock entry a git source parse error came from.
    pub(crate) fn for_package(self, id: &str) -> Self {
        match self {
            VendorError::GitSource { source_str, reason } => VendorError::PackageGitSource {
                id: id.to_string(),
                source_str,
                reason,
            },
            other => other,
        }
    }
}

/// The fetch stage that failed, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    Download,
    Verify,
    Unpack,
    Checkout,
    SelectMember,
    Copy,
    Hash,
}

impl std::fmt::Display for FetchStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchStep::Download => "download",
            FetchStep::Verify => "verify",
            FetchStep::Unpack => "unpack",
            FetchStep::Checkout => "check out",
            FetchStep::SelectMember => "select workspace member for",
            FetchStep::Copy => "copy",
            FetchStep::Hash => "hash",
        };
        f.write_str(s)
    }
}

/// Why a fetch step failed.
#[derive(Error, Debug)]
pub enum FetchFailure {
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("bad archive: {0}")]
    Archive(String),

    #[error("git: {0}")]
    Git(#[from] git2::Error),

    #[error("no workspace member declares package '{name}'")]
    NoWorkspaceMember { name: String },

    /// More than one manifest in the repository declares the requested name.
    #[error("package '{name}' is declared by several workspace members: {}", candidates.join(", "))]
    AmbiguousWorkspaceMember {
        name: String,
        candidates: Vec<String>,
    },

    #[error("invalid manifest {path}: {message}")]
    Manifest { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FetchFailure {
    /// Attach the package id and step, producing the run-level error.
    pub fn at(self, id: &str, step: FetchStep) -> VendorError {
        VendorError::Fetch {
            id: id.to_string(),
            step,
            reason: self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_names_package_and_step() {
        let err = FetchFailure::HashMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        }
        .at("serde 1.0.0 (registry+x)", FetchStep::Verify);
        let msg = err.to_string();
        assert!(msg.contains("verify"));
        assert!(msg.contains("serde 1.0.0 (registry+x)"));
        assert!(msg.contains("expected aa, got bb"));
    }

    #[test]
    fn test_ambiguous_member_lists_candidates() {
        let reason = FetchFailure::AmbiguousWorkspaceMember {
            name: "foo".to_string(),
            candidates: vec!["a/Cargo.toml".to_string(), "b/Cargo.toml".to_string()],
        };
        assert!(reason.to_string().contains("a/Cargo.toml, b/Cargo.toml"));
    }
}
