//! # lockvendor CLI Entry Point
//!
//! This is the main executable for the `lockvendor` command-line tool.
//! It parses CLI arguments using clap and routes commands to the handlers in
//! [`lockvendor::commands`].
//!
//! ## Command Structure
//!
//! - **Vendoring**: `vendor`
//! - **Inspection**: `list`, `hashes`, `parse-git`
//! - **Shell**: `completion`

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::*;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use lockvendor::commands;

#[derive(Parser)]
#[command(name = "lockvendor")]
#[command(about = "Vendor the packages pinned in Cargo lock files", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every pinned package into a vendor tree and write a cargo config
    Vendor {
        /// Project root containing Cargo.lock
        #[arg(default_value = ".")]
        root: PathBuf,
        /// Output directory (receives vendor/, sources/ and config.toml)
        #[arg(long, short)]
        out: PathBuf,
        /// JSON file of id -> hash overrides (repeatable, later files win)
        #[arg(long = "hashes", value_name = "FILE")]
        hashes: Vec<PathBuf>,
        /// Write the extended hash map to FILE
        #[arg(long, value_name = "FILE")]
        write_hashes: Option<PathBuf>,
        /// Compute missing git hashes from the fetched trees
        #[arg(long)]
        tree_hashing: bool,
        /// Fail when hashes differ from the persisted hash file
        #[arg(long)]
        deny_drift: bool,
        /// Number of parallel fetches (default: one per CPU)
        #[arg(long, short)]
        jobs: Option<usize>,
    },
    /// List packages, their source kind and where their hash comes from
    List {
        /// Project root containing Cargo.lock
        #[arg(default_value = ".")]
        root: PathBuf,
    },
    /// Parse a git+ source string and show the revision that would be fetched
    ParseGit {
        /// Source string, e.g. git+https://host/repo?branch=main#<commit>
        source: String,
    },
    /// Print the merged git hash map, or check it against a file
    Hashes {
        /// Project root containing Cargo.lock
        #[arg(default_value = ".")]
        root: PathBuf,
        /// JSON file of id -> hash overrides (repeatable, later files win)
        #[arg(long = "hashes", value_name = "FILE")]
        hashes: Vec<PathBuf>,
        /// Report drift against FILE and fail if there is any
        #[arg(long, value_name = "FILE")]
        check: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completion { shell: Shell },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "lockvendor=warn",
        1 => "lockvendor=info",
        _ => "lockvendor=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "x".red(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Vendor {
            root,
            out,
            hashes,
            write_hashes,
            tree_hashing,
            deny_drift,
            jobs,
        } => commands::vendor::run_vendor(&commands::vendor::VendorArgs {
            root,
            out,
            hashes,
            write_hashes,
            tree_hashing,
            deny_drift,
            jobs,
        }),
        Commands::List { root } => commands::list::run_list(&root),
        Commands::ParseGit { source } => commands::parse_git::run_parse_git(&source),
        Commands::Hashes {
            root,
            hashes,
            check,
        } => commands::hashes::run_hashes(&root, &hashes, check.as_deref()),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}
