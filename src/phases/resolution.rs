//! Phase 2: Resolution
//!
//! Finds the repositories a batch spec applies to and turns them into tasks.

use log::debug;

use crate::batch_spec::BatchSpec;
use crate::error::{Error, Result};
use crate::repository::{partition_repositories, Repository, RepositoryResolver, ResolvedRepositories};
use crate::task::{build_tasks, Task};
use crate::ui::ExecUi;

/// Resolve and partition repositories. Failure aborts the run.
pub fn resolve_repositories(
    resolver: &dyn RepositoryResolver,
    spec: &BatchSpec,
    allow_unsupported: bool,
    allow_ignored: bool,
    ui: &dyn ExecUi,
) -> Result<ResolvedRepositories> {
    ui.resolving_repositories();
    let repos = resolver.resolve(spec).map_err(|e| match e {
        e @ Error::Resolution { .. } => e,
        e => Error::Resolution {
            message: e.to_string(),
        },
    })?;
    debug!("Resolver returned {} repositories", repos.len());

    let resolved = partition_repositories(repos, allow_unsupported, allow_ignored);
    ui.resolving_repositories_done(&resolved);
    Ok(resolved)
}

/// One task per repository workspace
pub fn determine_workspaces(spec: &BatchSpec, repos: &[Repository], ui: &dyn ExecUi) -> Result<Vec<Task>> {
    ui.determining_workspaces();
    let tasks = build_tasks(spec, repos)?;
    ui.determining_workspaces_success(tasks.len());
    Ok(tasks)
}
