//! Tasks and their outcomes
//!
//! A [`Task`] is one repository workspace partition with the steps to run
//! in it. Every task ends in exactly one [`TaskOutcome`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::batch_spec::{BatchSpec, Step};
use crate::cache::CacheKeyChain;
use crate::error::{Error, Result};
use crate::repository::{workspace_paths, Repository};
use crate::snapshot::{compose_changes, render_diff, FileChange};
use crate::step::StepResult;

/// Unit of scheduling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub repository: Repository,
    /// Workspace partition relative to the repository root, `""` for the root
    pub path: String,
    pub steps: Vec<Step>,
    pub cache_keys: CacheKeyChain,
    pub batch_name: String,
}

impl Task {
    pub fn new(repository: Repository, path: &str, steps: Vec<Step>, batch_name: &str) -> Self {
        let cache_keys = CacheKeyChain::new(&repository, path, &steps);
        Self {
            repository,
            path: path.to_string(),
            steps,
            cache_keys,
            batch_name: batch_name.to_string(),
        }
    }

    /// Human-readable identity
    pub fn label(&self) -> String {
        if self.path.is_empty() {
            self.repository.name.clone()
        } else {
            format!("{}/{}", self.repository.name, self.path)
        }
    }

    /// Filesystem-safe identity, unique per repository and partition
    pub fn slug(&self) -> String {
        format!("{}-{}", self.repository.slug(), &self.cache_keys.root().hash[..12])
    }
}

/// Create one task per (repository, workspace partition)
pub fn build_tasks(spec: &BatchSpec, repos: &[Repository]) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for repo in repos {
        for path in workspace_paths(spec, repo)? {
            tasks.push(Task::new(repo.clone(), &path, spec.steps.clone(), &spec.name));
        }
    }
    Ok(tasks)
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Queued,
    CacheHit,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Queued | TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::CacheHit => "Cached",
            TaskStatus::Running => "Running",
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Failed => "Failed",
            TaskStatus::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

/// Terminal result of one task
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: Task,
    pub status: TaskStatus,
    /// Results of every step that completed, cached or executed, in order
    pub results: Vec<StepResult>,
    /// How many leading results came from the cache
    pub cached_steps: usize,
    /// Net change of all completed steps
    pub changes: Vec<FileChange>,
    pub diff: String,
    /// Outputs of all completed steps; later steps win
    pub outputs: BTreeMap<String, String>,
    /// Why the task failed
    pub error: Option<Error>,
    /// Log file kept for the task
    pub log_file: Option<PathBuf>,
}

impl TaskOutcome {
    pub fn new(task: Task, status: TaskStatus, results: Vec<StepResult>, cached_steps: usize) -> Self {
        let changes = compose_changes(results.iter().map(|r| r.changes.as_slice()));
        let diff = render_diff(&changes);
        let mut outputs = BTreeMap::new();
        for result in &results {
            outputs.extend(result.outputs.clone());
        }
        Self {
            task,
            status,
            results,
            cached_steps,
            changes,
            diff,
            outputs,
            error: None,
            log_file: None,
        }
    }

    pub fn failed(task: Task, results: Vec<StepResult>, cached_steps: usize, error: Error) -> Self {
        let mut outcome = Self::new(task, TaskStatus::Failed, results, cached_steps);
        outcome.error = Some(error);
        outcome
    }

    pub fn skipped(task: Task) -> Self {
        Self::new(task, TaskStatus::Skipped, Vec::new(), 0)
    }

    /// Number of steps that actually ran in this run
    pub fn executed_steps(&self) -> usize {
        self.results.len() - self.cached_steps
    }

    /// 1-based index of the step that failed
    pub fn failed_step(&self) -> Option<usize> {
        self.error.as_ref().and_then(Error::step_index)
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Aggregate counts for the final summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cache_hits: usize,
}

impl ExecutionReport {
    pub fn from_outcomes(outcomes: &[TaskOutcome]) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome.status {
                TaskStatus::Succeeded => report.succeeded += 1,
                TaskStatus::Failed => report.failed += 1,
                TaskStatus::Skipped => report.skipped += 1,
                TaskStatus::CacheHit => report.cache_hits += 1,
                TaskStatus::Queued | TaskStatus::Running => {}
            }
        }
        report
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.cache_hits
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} cached, {} failed, {} skipped",
            self.succeeded, self.cache_hits, self.failed, self.skipped
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::repository::test_support::repo;

    pub fn step(run: &str) -> Step {
        Step {
            run: run.to_string(),
            container: "alpine:3".to_string(),
            env: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn task(name: &str, runs: &[&str]) -> Task {
        Task::new(repo(name), "", runs.iter().map(|r| step(r)).collect(), "batch")
    }
}
