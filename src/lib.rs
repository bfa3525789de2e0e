//! # lockvendor - Offline vendoring for Cargo lock files
//!
//! lockvendor reads every `Cargo.lock` of a project, fetches each pinned
//! package exactly once, verifies it against a trusted content hash and
//! assembles a single content-addressed vendor tree plus the Cargo config
//! that redirects all sources to it.
//!
//! ## Features
//!
//! - **Lock Aggregation**: Root lock file plus nested lock files, merged by package id
//! - **Trusted Hashes**: Registry checksums from the lock, git hashes from cache files
//! - **Git Sources**: Branch, tag and revision pins with recursive submodules
//! - **Parallel Fetching**: Every package fetched on its own rayon task
//! - **Content Addressing**: Identical content collapses into one vendor entry
//!
//! ## Quick Start
//!
//! ```bash
//! # Vendor everything under ./offline
//! lockvendor vendor --out offline
//!
//! # Build against it
//! cargo build --offline --config offline/config.toml
//! ```
//!
//! ## Module Organization
//!
//! - [`lock`] - Lock file parsing and aggregation
//! - [`source`] - Package classification
//! - [`hashes`] - Hash cache and resolution
//! - [`fetch`] - Registry and git retrieval
//! - [`engine`] - One vendoring run end to end
//! - [`commands`] - CLI command handlers

/// CLI command handlers extracted from main.
pub mod commands;

/// Settings file parsing (`lockvendor.toml`).
pub mod config;

/// Pipeline orchestration.
pub mod engine;

/// Error types.
pub mod error;

/// Package retrieval and normalization.
pub mod fetch;

/// `git+` source string parsing.
pub mod git_source;

/// Hash cache files and hash resolution.
pub mod hashes;

/// Lock file (`Cargo.lock`) parsing and aggregation.
pub mod lock;

/// Source-replacement config emission.
pub mod redirect;

/// Source kind classification.
pub mod source;

/// Terminal UI utilities (tables).
pub mod ui;

/// Vendor root assembly.
pub mod vendor;

pub use error::{FetchFailure, FetchStep, Result, VendorError};
pub use fetch::{FetchContext, FetchedPackage, NetworkContext};
pub use git_source::{GitRevision, GitSourceSpec};
pub use hashes::{HashCache, HashDrift, HashOrigin, Resolution};
