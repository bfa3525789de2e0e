//! The real [`FetchContext`]: HTTP via ureq, git via libgit2.

use super::FetchContext;
use crate::error::FetchFailure;
use crate::git_source::{GitRevision, GitSourceSpec};
use git2::{AutotagOption, Cred, CredentialType, FetchOptions, Oid, RemoteCallbacks, Repository};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("lockvendor/", env!("CARGO_PKG_VERSION"));

pub struct NetworkContext {
    agent: ureq::Agent,
    tree_hashing: bool,
}

impl NetworkContext {
    pub fn new(tree_hashing: bool) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(300)))
            .build()
            .into();
        Self {
            agent,
            tree_hashing,
        }
    }
}

impl FetchContext for NetworkContext {
    fn download(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let network = |message: String| FetchFailure::Network {
            url: url.to_string(),
            message,
        };
        let response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| network(e.to_string()))?;

        let mut bytes = Vec::new();
        response
            .into_body()
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| network(e.to_string()))?;
        Ok(bytes)
    }

    fn checkout(&self, spec: &GitSourceSpec, dest: &Path) -> Result<(), FetchFailure> {
        let repo = Repository::init(dest)?;
        let revision = spec.revision();
        fetch_refspecs(&repo, &spec.url, &revision.refspecs())?;

        let object = match repo.revparse_single(&revision.local_revspec()) {
            Ok(object) => object,
            Err(e) => match &revision {
                // Commits not reachable from any advertised ref can still be
                // fetched by id from servers that allow it.
                GitRevision::Commit(commit) if is_full_oid(commit) => {
                    fetch_refspecs(&repo, &spec.url, std::slice::from_ref(commit))?;
                    repo.revparse_single(commit)?
                }
                _ => return Err(e.into()),
            },
        };

        let commit = object.peel_to_commit()?;
        checkout_commit(&repo, commit.id())?;
        debug!(url = %spec.url, commit = %commit.id(), "checked out");
        update_submodules(&repo)?;
        Ok(())
    }

    fn tree_hashing(&self) -> bool {
        self.tree_hashing
    }
}

fn is_full_oid(rev: &str) -> bool {
    rev.len() == 40 && Oid::from_str(rev).is_ok()
}

fn fetch_options<'a>() -> FetchOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username, allowed| {
        if allowed.contains(CredentialType::SSH_KEY) {
            Cred::ssh_key_from_agent(username.unwrap_or("git"))
        } else {
            Cred::default()
        }
    });
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options.download_tags(AutotagOption::All);
    options
}

fn fetch_refspecs(repo: &Repository, url: &str, refspecs: &[String]) -> Result<(), git2::Error> {
    let mut remote = repo.remote_anonymous(url)?;
    remote.fetch(refspecs, Some(&mut fetch_options()), None)
}

fn checkout_commit(repo: &Repository, oid: Oid) -> Result<(), git2::Error> {
    repo.set_head_detached(oid)?;
    let obj = repo.find_object(oid, None)?;
    let mut checkout_opts = git2::build::CheckoutBuilder::new();
    checkout_opts.force();
    repo.checkout_tree(&obj, Some(&mut checkout_opts))
}

fn update_submodules(repo: &Repository) -> Result<(), git2::Error> {
    for mut submodule in repo.submodules()? {
        let mut options = git2::SubmoduleUpdateOptions::new();
        options.fetch(fetch_options());
        submodule.update(true, Some(&mut options))?;
        let nested = submodule.open()?;
        update_submodules(&nested)?;
    }
    Ok(())
}
