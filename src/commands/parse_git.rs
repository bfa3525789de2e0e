//! `lockvendor parse-git` command handler

use anyhow::Result;
use colored::*;

use crate::git_source::GitSourceSpec;

/// Show how a `git+` source string is understood and what would be fetched.
pub fn run_parse_git(source: &str) -> Result<()> {
    let spec = GitSourceSpec::parse(source)?;
    let revision = spec.revision();

    println!("{:<10} {}", "url".bold(), spec.url);
    for (key, value) in [
        ("rev", &spec.rev),
        ("tag", &spec.tag),
        ("branch", &spec.branch),
        ("fragment", &spec.url_fragment),
    ] {
        if let Some(value) = value {
            println!("{:<10} {}", key.bold(), value);
        }
    }
    println!("{:<10} {}", "fetch".bold(), revision.to_string().cyan());
    for refspec in revision.refspecs() {
        println!("{:<10} {}", "refspec".bold(), refspec.dimmed());
    }
    println!("{:<10} {}", "section".bold(), spec.without_fragment());
    Ok(())
}
