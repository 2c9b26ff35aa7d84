//! # Repository Resolution
//!
//! This module defines the [`Repository`] identity the engine keys tasks,
//! workspaces and cache entries on, and the boundary through which
//! repositories are discovered.
//!
//! ## Design
//!
//! Discovery sits behind the [`RepositoryResolver`] trait so the engine never
//! depends on where repositories come from. A remote code-search client would
//! implement it by querying a service; [`LocalRepositoryResolver`] implements
//! it over a directory of local checkouts, which is also what the CLI uses.
//!
//! Resolution returns every candidate the batch spec selects. The pure
//! [`partition_repositories`] step then splits them into supported,
//! unsupported and explicitly ignored sets, and [`workspace_paths`] decides
//! how many workspaces each supported repository is split into.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::batch_spec::BatchSpec;
use crate::error::{Error, Result};
use crate::git;
use crate::snapshot::Snapshot;

/// Name of the file that opts a repository out of batch changes
pub const IGNORE_FILE: &str = ".batchignore";

/// Code host types the engine can produce changesets for
pub const SUPPORTED_SERVICE_TYPES: &[&str] = &[
    "github",
    "gitlab",
    "bitbucketServer",
    "bitbucketCloud",
    "azureDevOps",
    "gerrit",
    "git",
    "local",
];

/// A resolved repository. Immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Stable identifier
    pub id: String,
    pub name: String,
    pub default_branch: String,
    /// Revision the steps run against
    pub revision: String,
    pub service_type: String,
    /// Where the checkout lives on this machine
    pub checkout: PathBuf,
    /// Relative paths of all files in the checkout
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub has_ignore_file: bool,
}

impl Repository {
    pub fn is_supported(&self) -> bool {
        SUPPORTED_SERVICE_TYPES.contains(&self.service_type.as_str())
    }

    /// Filesystem-safe form of the name
    pub fn slug(&self) -> String {
        self.name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect()
    }
}

/// Source of candidate repositories for a batch spec
pub trait RepositoryResolver: Send + Sync {
    /// Return every repository selected by the batch spec's `on` rules.
    ///
    /// A failure here aborts the run.
    fn resolve(&self, spec: &BatchSpec) -> Result<Vec<Repository>>;
}

/// Repositories split by whether they will be worked on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRepositories {
    pub supported: Vec<Repository>,
    pub unsupported: Vec<Repository>,
    pub ignored: Vec<Repository>,
}

/// Split resolved repositories into supported, unsupported and ignored sets.
///
/// Duplicates (by id) are dropped, keeping the first occurrence. With
/// `allow_unsupported` or `allow_ignored` the corresponding repositories are
/// still reported but also kept in `supported`.
pub fn partition_repositories(
    repos: Vec<Repository>,
    allow_unsupported: bool,
    allow_ignored: bool,
) -> ResolvedRepositories {
    let mut resolved = ResolvedRepositories::default();
    let mut seen = std::collections::HashSet::new();

    for repo in repos {
        if !seen.insert(repo.id.clone()) {
            continue;
        }
        let mut excluded = false;
        if !repo.is_supported() {
            resolved.unsupported.push(repo.clone());
            excluded |= !allow_unsupported;
        }
        if repo.has_ignore_file {
            resolved.ignored.push(repo.clone());
            excluded |= !allow_ignored;
        }
        if !excluded {
            resolved.supported.push(repo);
        }
    }

    resolved
}

/// Workspace roots for a repository, relative to its root.
///
/// `""` is the repository root. When a `workspaces` rule applies to the
/// repository, every directory containing the rule's marker file becomes a
/// workspace; a repository without any marker file yields none.
pub fn workspace_paths(spec: &BatchSpec, repo: &Repository) -> Result<Vec<String>> {
    for rule in &spec.workspaces {
        if !rule.applies_to(&repo.name)? {
            continue;
        }
        let mut paths: Vec<String> = repo
            .files
            .iter()
            .filter_map(|file| {
                let (dir, name) = match file.rsplit_once('/') {
                    Some((dir, name)) => (dir, name),
                    None => ("", file.as_str()),
                };
                (name == rule.root_at_location_of).then(|| dir.to_string())
            })
            .collect();
        paths.sort();
        paths.dedup();
        return Ok(paths);
    }
    Ok(vec![String::new()])
}

/// Resolves repositories from a directory of local checkouts.
///
/// Every immediate subdirectory of `root` is a repository named after the
/// directory. Clean git checkouts use `HEAD` as their revision, checkouts
/// with local changes append a content fingerprint to it, and plain
/// directories use the fingerprint alone.
pub struct LocalRepositoryResolver {
    root: PathBuf,
}

impl LocalRepositoryResolver {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn load(&self, dir: &Path, name: &str) -> Result<Repository> {
        let snapshot = Snapshot::capture(dir)?;
        let (revision, default_branch, service_type) = if git::is_repository(dir) {
            let branch = git::current_branch(dir).unwrap_or_else(|_| "main".to_string());
            let head = git::rev_parse_head(dir)?;
            // Workspaces copy the working tree, so local edits must change the revision
            let revision = if git::has_local_changes(dir)? {
                debug!("{} has local changes on top of {}", name, head);
                format!("{}-dirty-{}", head, snapshot.fingerprint())
            } else {
                head
            };
            (revision, branch, "git")
        } else {
            (snapshot.fingerprint(), "main".to_string(), "local")
        };

        Ok(Repository {
            id: format!("local:{}", name),
            name: name.to_string(),
            default_branch,
            revision,
            service_type: service_type.to_string(),
            checkout: dir.to_path_buf(),
            has_ignore_file: snapshot.get(IGNORE_FILE).is_some(),
            files: snapshot.paths().map(str::to_string).collect(),
        })
    }
}

impl RepositoryResolver for LocalRepositoryResolver {
    fn resolve(&self, spec: &BatchSpec) -> Result<Vec<Repository>> {
        let entries = fs::read_dir(&self.root).map_err(|e| Error::Resolution {
            message: format!("cannot read {}: {}", self.root.display(), e),
        })?;

        let mut repos = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if !spec.selects(&name)? {
                debug!("Skipping {}: not selected by batch spec", name);
                continue;
            }
            repos.push(self.load(&path, &name)?);
        }

        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A repository with no checkout on disk
    pub fn repo(name: &str) -> Repository {
        Repository {
            id: format!("id-{}", name),
            name: name.to_string(),
            default_branch: "main".to_string(),
            revision: format!("rev-{}", name),
            service_type: "github".to_string(),
            checkout: PathBuf::from("/nonexistent").join(name),
            files: vec!["README.md".to_string()],
            has_ignore_file: false,
        }
    }
}
