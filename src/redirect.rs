//! Cargo source-replacement config.
//!
//! The emitted document replaces crates.io and every git source of the run
//! with one directory source pointing at the vendor root.

use crate::error::{Result, VendorError};
use crate::git_source::GitSourceSpec;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// Render a TOML basic string.
fn quoted(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

fn table_key(s: &str) -> String {
    let bare = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if bare { s.to_string() } else { quoted(s) }
}

/// Build the config for the given git sources (keyed by literal source
/// string) and vendor root.
///
/// Sections are keyed by the source without its fragment; two different
/// source strings that only differ in the fragment would produce the same
/// section and are rejected.
pub fn render(
    git_sources: &BTreeMap<&str, &GitSourceSpec>,
    replacement_name: &str,
    vendor_root: &Path,
) -> Result<String> {
    let mut sections: BTreeMap<String, (&str, &GitSourceSpec)> = BTreeMap::new();
    for (source, spec) in git_sources {
        let key = spec.without_fragment();
        if let Some((first, _)) = sections.get(&key) {
            return Err(VendorError::Config {
                section: format!("source.{}", quoted(&key)),
                first: first.to_string(),
                second: source.to_string(),
            });
        }
        sections.insert(key, (source, spec));
    }

    let replace_with = format!("replace-with = {}\n", quoted(replacement_name));
    let mut out = String::new();

    out.push_str("[source.crates-io]\n");
    out.push_str(&replace_with);

    for (key, (_, spec)) in &sections {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "\n[source.{}]", quoted(key));
        let _ = writeln!(out, "git = {}", quoted(&spec.url));
        for (pin, value) in spec.declared_pins() {
            let _ = writeln!(out, "{pin} = {}", quoted(value));
        }
        out.push_str(&replace_with);
    }

    let _ = writeln!(out, "\n[source.{}]", table_key(replacement_name));
    let _ = writeln!(
        out,
        "directory = {}",
        quoted(&vendor_root.to_string_lossy())
    );
    Ok(out)
}
