//! # Reporting
//!
//! The engine reports progress through the [`ExecUi`] sink, one method per
//! lifecycle event, in causal order. Reporting is one-way: nothing the sink
//! does feeds back into execution. All methods default to no-ops so a sink
//! only implements what it renders.
//!
//! Task execution has its own, finer grained sink ([`TaskExecutionUi`])
//! obtained from [`ExecUi::executing_tasks`]. It is shared by all workers, so
//! implementations must be thread-safe. For any one task, `task_started`
//! precedes its step events, which precede `task_finished`; events of
//! different tasks interleave freely.
//!
//! [`LogUi`] renders everything through the `log` facade and is what the
//! binary uses.

use std::path::PathBuf;

use log::{debug, error, info, warn};

use crate::error::Error;
use crate::repository::ResolvedRepositories;
use crate::step::StepResult;
use crate::task::{Task, TaskOutcome, TaskStatus};
use crate::upload::ChangesetSpecId;
use crate::workspace::CreatorType;

/// Run-level event sink
#[allow(unused_variables)]
pub trait ExecUi: Send + Sync {
    fn parsing_batch_spec(&self) {}
    fn parsing_batch_spec_success(&self) {}
    fn parsing_batch_spec_failure(&self, error: &Error) {}

    fn resolving_namespace(&self) {}
    fn resolving_namespace_success(&self, namespace: &str) {}

    fn preparing_container_images(&self) {}
    fn preparing_container_images_progress(&self, done: usize, total: usize) {}
    fn preparing_container_images_success(&self) {}

    fn determining_workspace_creator_type(&self) {}
    fn determining_workspace_creator_type_success(&self, kind: CreatorType) {}

    fn resolving_repositories(&self) {}
    fn resolving_repositories_done(&self, resolved: &ResolvedRepositories) {}

    fn determining_workspaces(&self) {}
    fn determining_workspaces_success(&self, count: usize) {}

    fn checking_cache(&self) {}
    fn checking_cache_success(&self, cached_specs_found: usize, tasks_to_execute: usize) {}

    /// Sink for per-task progress during execution
    fn executing_tasks(&self, verbose: bool, parallelism: usize) -> Box<dyn TaskExecutionUi> {
        Box::new(NoopTaskUi)
    }
    fn executing_tasks_skipping_errors(&self, error: &Error) {}

    fn log_files_kept(&self, files: &[PathBuf]) {}

    fn no_changeset_specs(&self) {}
    fn uploading_changeset_specs(&self, count: usize) {}
    fn uploading_changeset_specs_progress(&self, done: usize, total: usize) {}
    fn uploading_changeset_specs_success(&self, ids: &[ChangesetSpecId]) {}

    fn creating_batch_spec(&self) {}
    fn creating_batch_spec_success(&self) {}
    fn creating_batch_spec_error(&self, error: &Error) {}

    fn preview_batch_spec(&self, preview_url: &str) {}

    fn applying_batch_spec(&self) {}
    fn applying_batch_spec_success(&self, batch_change_url: &str) {}

    fn execution_error(&self, error: &Error) {}

    /// A cache entry was written
    fn write_cache(&self, key: &str, data: &[u8]) {}
}

/// Per-task event sink, shared across workers
#[allow(unused_variables)]
pub trait TaskExecutionUi: Send + Sync {
    fn start(&self, tasks: &[&Task]) {}
    /// `slot` identifies the worker running the task
    fn task_started(&self, task: &Task, slot: usize) {}
    fn step_started(&self, task: &Task, step: usize, command: &str) {}
    fn step_finished(&self, task: &Task, step: usize, result: &StepResult) {}
    fn step_failed(&self, task: &Task, step: usize, error: &Error) {}
    fn task_finished(&self, outcome: &TaskOutcome) {}
    fn success(&self) {}
    fn failed(&self, error: &Error) {}
}

struct NoopTaskUi;

impl TaskExecutionUi for NoopTaskUi {}

/// Sink that writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogUi;

impl ExecUi for LogUi {
    fn parsing_batch_spec_success(&self) {
        info!("Parsed batch spec");
    }

    fn parsing_batch_spec_failure(&self, error: &Error) {
        error!("Parsing batch spec failed: {}", error);
    }

    fn resolving_namespace_success(&self, namespace: &str) {
        info!("Resolved namespace {}", namespace);
    }

    fn preparing_container_images_progress(&self, done: usize, total: usize) {
        debug!("Prepared {}/{} container image(s)", done, total);
    }

    fn preparing_container_images_success(&self) {
        info!("Prepared container images");
    }

    fn determining_workspace_creator_type_success(&self, kind: CreatorType) {
        info!("Using {} workspaces", kind);
    }

    fn resolving_repositories_done(&self, resolved: &ResolvedRepositories) {
        info!(
            "Resolved {} repositories",
            resolved.supported.len()
        );
        if !resolved.unsupported.is_empty() {
            warn!(
                "Skipping {} repositories on unsupported code hosts: {}",
                resolved.unsupported.len(),
                names(&resolved.unsupported)
            );
        }
        if !resolved.ignored.is_empty() {
            warn!(
                "Skipping {} repositories with an ignore file: {}",
                resolved.ignored.len(),
                names(&resolved.ignored)
            );
        }
    }

    fn determining_workspaces_success(&self, count: usize) {
        info!("Found {} workspace(s)", count);
    }

    fn checking_cache_success(&self, cached_specs_found: usize, tasks_to_execute: usize) {
        info!(
            "Found {} cached result(s), {} task(s) to execute",
            cached_specs_found, tasks_to_execute
        );
    }

    fn executing_tasks(&self, verbose: bool, parallelism: usize) -> Box<dyn TaskExecutionUi> {
        info!("Executing tasks with parallelism {}", parallelism);
        Box::new(LogTaskUi { verbose })
    }

    fn executing_tasks_skipping_errors(&self, error: &Error) {
        warn!("Skipping failed tasks: {}", error);
    }

    fn log_files_kept(&self, files: &[PathBuf]) {
        for file in files {
            info!("Kept log file {}", file.display());
        }
    }

    fn no_changeset_specs(&self) {
        info!("No changes produced, no changeset specs to upload");
    }

    fn uploading_changeset_specs(&self, count: usize) {
        info!("Uploading {} changeset spec(s)", count);
    }

    fn uploading_changeset_specs_progress(&self, done: usize, total: usize) {
        debug!("Uploaded {}/{} changeset spec(s)", done, total);
    }

    fn uploading_changeset_specs_success(&self, ids: &[ChangesetSpecId]) {
        info!("Uploaded {} changeset spec(s)", ids.len());
    }

    fn creating_batch_spec_success(&self) {
        info!("Created batch spec");
    }

    fn creating_batch_spec_error(&self, error: &Error) {
        error!("Creating batch spec failed: {}", error);
    }

    fn preview_batch_spec(&self, preview_url: &str) {
        info!("Preview the batch change at {}", preview_url);
    }

    fn applying_batch_spec_success(&self, batch_change_url: &str) {
        info!("Applied batch change: {}", batch_change_url);
    }

    fn execution_error(&self, error: &Error) {
        error!("{}", error);
    }

    fn write_cache(&self, key: &str, data: &[u8]) {
        debug!("Wrote cache entry {} ({} bytes)", key, data.len());
    }
}

fn names(repos: &[crate::repository::Repository]) -> String {
    repos
        .iter()
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

struct LogTaskUi {
    verbose: bool,
}

impl TaskExecutionUi for LogTaskUi {
    fn start(&self, tasks: &[&Task]) {
        debug!("Starting {} task(s)", tasks.len());
    }

    fn task_started(&self, task: &Task, slot: usize) {
        if self.verbose {
            info!("[{}] Started {}", slot, task.label());
        }
    }

    fn step_started(&self, task: &Task, step: usize, command: &str) {
        if self.verbose {
            info!("{}: step {} started: {}", task.label(), step, command);
        }
    }

    fn step_finished(&self, task: &Task, step: usize, result: &StepResult) {
        if self.verbose {
            info!(
                "{}: step {} finished, {} file(s) changed",
                task.label(),
                step,
                result.changes.len()
            );
        }
    }

    fn step_failed(&self, task: &Task, step: usize, error: &Error) {
        error!("{}: step {} failed: {}", task.label(), step, error);
    }

    fn task_finished(&self, outcome: &TaskOutcome) {
        match outcome.status {
            TaskStatus::Failed => {}
            TaskStatus::Skipped => info!("Skipped {}", outcome.task.label()),
            status => info!("{} {}", status, outcome.task.label()),
        }
    }
}
