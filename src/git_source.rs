//! `git+` source identifiers.
//!
//! Cargo records git dependencies as
//! `git+<url>[?rev=..|tag=..|branch=..][#<commit>]`. The fragment is the
//! commit Cargo actually locked and always wins over the query parameters.

use crate::error::{Result, VendorError};
use std::fmt;

pub const GIT_PREFIX: &str = "git+";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitSourceSpec {
    pub url: String,
    pub rev: Option<String>,
    pub tag: Option<String>,
    pub branch: Option<String>,
    pub url_fragment: Option<String>,
}

/// What to fetch from the remote, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRevision {
    /// A commit id (full or abbreviated), or any revspec given as `rev`.
    Commit(String),
    Branch(String),
    Tag(String),
    /// Nothing pinned: fetch all refs and use the remote's default head.
    DefaultHead,
}

impl GitRevision {
    /// Refspecs needed to make this revision resolvable locally.
    pub fn refspecs(&self) -> Vec<String> {
        match self {
            GitRevision::Branch(b) => vec![format!("+refs/heads/{b}:refs/remotes/origin/{b}")],
            GitRevision::Tag(t) => vec![format!("+refs/tags/{t}:refs/tags/{t}")],
            GitRevision::Commit(_) | GitRevision::DefaultHead => vec![
                "+HEAD:refs/remotes/origin/HEAD".to_string(),
                "+refs/heads/*:refs/remotes/origin/*".to_string(),
                "+refs/tags/*:refs/tags/*".to_string(),
            ],
        }
    }

    /// Local revspec to check out once the refspecs are fetched.
    pub fn local_revspec(&self) -> String {
        match self {
            GitRevision::Commit(c) => c.clone(),
            GitRevision::Branch(b) => format!("refs/remotes/origin/{b}"),
            GitRevision::Tag(t) => format!("refs/tags/{t}"),
            GitRevision::DefaultHead => "refs/remotes/origin/HEAD".to_string(),
        }
    }
}

impl fmt::Display for GitRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitRevision::Commit(c) => write!(f, "commit {c}"),
            GitRevision::Branch(b) => write!(f, "branch {b}"),
            GitRevision::Tag(t) => write!(f, "tag refs/tags/{t}"),
            GitRevision::DefaultHead => f.write_str("default head"),
        }
    }
}

impl GitSourceSpec {
    pub fn parse(source: &str) -> Result<Self> {
        let rest = source
            .strip_prefix(GIT_PREFIX)
            .ok_or_else(|| VendorError::git_source(source, "missing 'git+' prefix"))?;

        let (url_and_query, url_fragment) = split_once_strict(rest, '#')
            .map_err(|_| VendorError::git_source(source, "more than one '#'"))?;
        let (url, query) = split_once_strict(url_and_query, '?')
            .map_err(|_| VendorError::git_source(source, "more than one '?'"))?;

        if url.is_empty() {
            return Err(VendorError::git_source(source, "empty repository url"));
        }
        if url_fragment.is_some_and(str::is_empty) {
            return Err(VendorError::git_source(source, "empty '#' fragment"));
        }

        let mut spec = GitSourceSpec {
            url: url.to_string(),
            url_fragment: url_fragment.map(str::to_string),
            ..Default::default()
        };

        for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| VendorError::git_source(source, format!("'{pair}' is not key=value")))?;
            let slot = match key {
                "rev" => &mut spec.rev,
                "tag" => &mut spec.tag,
                // `ref` is the pre-1.0 spelling of `branch`.
                "branch" | "ref" => &mut spec.branch,
                other => {
                    return Err(VendorError::git_source(
                        source,
                        format!("unknown query parameter '{other}'"),
                    ));
                }
            };
            if slot.replace(value.to_string()).is_some() {
                return Err(VendorError::git_source(source, format!("'{key}' given twice")));
            }
        }

        Ok(spec)
    }

    /// The revision a fetch must produce.
    pub fn revision(&self) -> GitRevision {
        if let Some(commit) = &self.url_fragment {
            GitRevision::Commit(commit.clone())
        } else if let Some(rev) = &self.rev {
            GitRevision::Commit(rev.clone())
        } else if let Some(branch) = &self.branch {
            GitRevision::Branch(branch.clone())
        } else if let Some(tag) = &self.tag {
            GitRevision::Tag(tag.clone())
        } else {
            GitRevision::DefaultHead
        }
    }

    fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("rev", self.rev.as_deref()),
            ("tag", self.tag.as_deref()),
            ("branch", self.branch.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }

    /// Source string without the locked-commit fragment. Cargo uses this
    /// form as the `[source."…"]` key for git replacements.
    pub fn without_fragment(&self) -> String {
        let mut out = format!("{GIT_PREFIX}{}", self.url);
        let pairs = self.query_pairs();
        if !pairs.is_empty() {
            out.push('?');
            let joined: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            out.push_str(&joined.join("&"));
        }
        out
    }

    pub fn to_source_string(&self) -> String {
        let mut out = self.without_fragment();
        if let Some(fragment) = &self.url_fragment {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }

    /// Pinning key/value pairs as declared, for the redirection config.
    pub fn declared_pins(&self) -> Vec<(&'static str, &str)> {
        self.query_pairs()
    }
}

/// Split on at most one `sep`; a second occurrence is an error.
fn split_once_strict(s: &str, sep: char) -> std::result::Result<(&str, Option<&str>), ()> {
    match s.split_once(sep) {
        None => Ok((s, None)),
        Some((_, right)) if right.contains(sep) => Err(()),
        Some((left, right)) => Ok((left, Some(right))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_branch_with_fragment() {
        let spec = GitSourceSpec::parse("git+https://example.com/repo.git?branch=main#deadbeef")
            .unwrap();
        assert_eq!(spec.url, "https://example.com/repo.git");
        assert_eq!(spec.branch.as_deref(), Some("main"));
        assert_eq!(spec.url_fragment.as_deref(), Some("deadbeef"));
        assert_eq!(spec.revision(), GitRevision::Commit("deadbeef".to_string()));
    }

    #[test]
    fn test_fragment_overrides_rev() {
        let spec = GitSourceSpec::parse("git+https://h/r?rev=v1#abc123").unwrap();
        assert_eq!(spec.rev.as_deref(), Some("v1"));
        assert_eq!(spec.revision(), GitRevision::Commit("abc123".to_string()));
    }

    #[test]
    fn test_ref_is_branch_alias() {
        let spec = GitSourceSpec::parse("git+https://h/r?ref=dev").unwrap();
        assert_eq!(spec.branch.as_deref(), Some("dev"));
        assert_eq!(spec.revision(), GitRevision::Branch("dev".to_string()));
    }

    #[test]
    fn test_tag_without_branch_uses_tag_ref() {
        let spec = GitSourceSpec::parse("git+https://h/r?tag=v0.3.0").unwrap();
        let rev = spec.revision();
        assert_eq!(rev, GitRevision::Tag("v0.3.0".to_string()));
        assert_eq!(rev.local_revspec(), "refs/tags/v0.3.0");
    }

    #[test]
    fn test_branch_wins_over_tag() {
        let spec = GitSourceSpec::parse("git+https://h/r?tag=v1&branch=main").unwrap();
        assert_eq!(spec.revision(), GitRevision::Branch("main".to_string()));
    }

    #[test]
    fn test_bare_url_fetches_default_head() {
        let spec = GitSourceSpec::parse("git+https://h/r").unwrap();
        assert_eq!(spec.revision(), GitRevision::DefaultHead);
        assert_eq!(spec.revision().refspecs().len(), 3);
    }

    #[test]
    fn test_two_fragments_rejected() {
        let err = GitSourceSpec::parse("git+https://h/r#a#b").unwrap_err();
        assert!(err.to_string().contains("more than one '#'"));
    }

    #[test]
    fn test_two_queries_rejected() {
        assert!(GitSourceSpec::parse("git+https://h/r?rev=a?tag=b").is_err());
    }

    #[test]
    fn test_query_split_only_before_fragment() {
        // A `?` inside the fragment is not a query separator.
        assert!(GitSourceSpec::parse("git+https://h/r?rev=a#b?c").is_ok());
        // Two '?' before the fragment are.
        assert!(GitSourceSpec::parse("git+https://h/r??rev=a#b").is_err());
    }

    #[test]
    fn test_unknown_param_and_missing_prefix() {
        assert!(GitSourceSpec::parse("git+https://h/r?depth=1").is_err());
        assert!(GitSourceSpec::parse("https://h/r").is_err());
        assert!(GitSourceSpec::parse("git+https://h/r?branch").is_err());
    }

    #[test]
    fn test_round_trip() {
        let specs = [
            GitSourceSpec {
                url: "https://github.com/a/b".to_string(),
                ..Default::default()
            },
            GitSourceSpec {
                url: "https://github.com/a/b.git".to_string(),
                rev: Some("0123abc".to_string()),
                url_fragment: Some("0123abcdef".to_string()),
                ..Default::default()
            },
            GitSourceSpec {
                url: "ssh://git@host/x".to_string(),
                tag: Some("v1.2".to_string()),
                branch: Some("release".to_string()),
                url_fragment: Some("ffff".to_string()),
                ..Default::default()
            },
        ];
        for spec in specs {
            let reparsed = GitSourceSpec::parse(&spec.to_source_string()).unwrap();
            assert_eq!(reparsed, spec);
        }
    }

    #[test]
    fn test_without_fragment() {
        let spec = GitSourceSpec::parse("git+https://h/r?branch=main#deadbeef").unwrap();
        assert_eq!(spec.without_fragment(), "git+https://h/r?branch=main");
    }
}
