//! The phases of a batch run.
//!
//! ## Overview
//!
//! A run goes through these phases, each reporting its progress to the
//! [`ExecUi`](crate::ui::ExecUi) sink:
//!
//! 1. Preparation - parse the batch spec, resolve the namespace, prepare
//!    container images and pick the workspace strategy
//! 2. Resolution - resolve repositories and split them into tasks
//! 3. Execution - check the cache and run everything it does not cover
//! 4. Publication - build changeset specs, upload them, create and
//!    optionally apply the batch spec
//!
//! Each phase only depends on the phases before it. Run-level errors from
//! phases 1 and 2 abort before any task is scheduled.
//! [`orchestrator::execute_batch`] runs all of them in order.

use std::path::PathBuf;

use crate::cache::ExecutionCache;
use crate::changeset::ChangesetSpec;
use crate::executor::ExecutorOptions;
use crate::repository::{RepositoryResolver, ResolvedRepositories};
use crate::runtime::ContainerRuntime;
use crate::step::StepRunner;
use crate::task::{ExecutionReport, TaskOutcome};
use crate::ui::ExecUi;
use crate::upload::{BatchSpecRef, ChangesetSpecId, Uploader};
use crate::workspace::{CreatorType, WorkspaceCreator};

pub mod execution;
pub mod orchestrator;
pub mod preparation;
pub mod publication;
pub mod resolution;

/// Builds the workspace creator once the strategy is known
pub type WorkspaceCreatorFactory<'a> = dyn Fn(CreatorType) -> Box<dyn WorkspaceCreator> + 'a;

/// External collaborators of a run
pub struct Environment<'a> {
    pub resolver: &'a dyn RepositoryResolver,
    pub runtime: &'a dyn ContainerRuntime,
    pub workspaces: &'a WorkspaceCreatorFactory<'a>,
    pub runner: &'a dyn StepRunner,
    pub cache: &'a dyn ExecutionCache,
    pub uploader: &'a dyn Uploader,
    pub ui: &'a dyn ExecUi,
}

/// Run-level settings
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub executor: ExecutorOptions,
    /// Namespace to create the batch spec in; the caller's own if unset
    pub namespace: Option<String>,
    pub allow_unsupported: bool,
    pub allow_ignored: bool,
    /// Apply the batch spec after creating it
    pub apply: bool,
    /// Empty the cache before checking it
    pub clear_cache: bool,
}

/// Everything a completed run produced
#[derive(Debug, Default)]
pub struct BatchResult {
    pub namespace: String,
    pub repositories: ResolvedRepositories,
    pub outcomes: Vec<TaskOutcome>,
    pub report: ExecutionReport,
    pub changeset_specs: Vec<ChangesetSpec>,
    pub changeset_spec_ids: Vec<ChangesetSpecId>,
    pub batch_spec: Option<BatchSpecRef>,
    pub batch_change_url: Option<String>,
    pub log_files: Vec<PathBuf>,
}
