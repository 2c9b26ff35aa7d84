//! # Task Executor
//!
//! The executor is the core of a batch run. It takes the task list, decides
//! per task how much work the cache already covers, and runs the rest on a
//! bounded worker pool.
//!
//! ## Cache check
//!
//! [`Executor::check_cache`] looks up every task's key chain, longest prefix
//! first. Tasks whose whole chain is cached become [`TaskStatus::CacheHit`]
//! outcomes straight away and never get a workspace. All other tasks are
//! planned with their resume point.
//!
//! ## Execution
//!
//! [`Executor::execute`] runs planned tasks on a dedicated rayon pool with
//! `parallelism` threads. One pool job is one task; a job never spawns
//! nested pool work, so the number of running tasks is bounded by the
//! number of threads. Inside a job:
//!
//! 1. The workspace is acquired through a [`WorkspaceGuard`].
//! 2. Cached changes of the resumed prefix are replayed onto it.
//! 3. Remaining steps run in order. Each successful step is written to the
//!    cache before the next one starts.
//! 4. The workspace is released, whatever happened above.
//!
//! A failing task never stops the others. Without `skip_errors` the first
//! failure stops dequeuing: tasks that have not started yet end up
//! [`TaskStatus::Skipped`] while running ones finish. Run-level
//! cancellation does the same and additionally interrupts running steps.
//! The per-task timeout is a child token and only interrupts its own task.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, warn};
use rayon::prelude::*;

use crate::cache::{lookup_longest_prefix, CacheEntry, CacheLookup, ExecutionCache};
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::snapshot::{apply_changes, compose_changes};
use crate::step::{StepContext, StepResult, StepRunner};
use crate::task::{Task, TaskOutcome, TaskStatus};
use crate::ui::{ExecUi, TaskExecutionUi};
use crate::workspace::{Workspace, WorkspaceCreator, WorkspaceGuard};

/// Upper bound for the default parallelism
pub const MAX_DEFAULT_PARALLELISM: usize = 4;

/// Number of available CPUs, capped at [`MAX_DEFAULT_PARALLELISM`]
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_PARALLELISM)
}

/// Knobs for a run
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Maximum number of tasks running at once
    pub parallelism: usize,
    /// Per-task timeout
    pub timeout: Option<Duration>,
    /// Keep going after a task fails
    pub skip_errors: bool,
    /// Write a log file per executed task
    pub keep_logs: bool,
    pub log_dir: PathBuf,
    /// Report per-step and per-slot progress
    pub verbose: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            timeout: None,
            skip_errors: false,
            keep_logs: false,
            log_dir: std::env::temp_dir(),
            verbose: false,
        }
    }
}

/// A task that needs a workspace, with whatever the cache already covers
#[derive(Debug)]
pub struct PlannedTask {
    pub task: Task,
    pub cached: CacheLookup,
}

/// Result of the cache check
#[derive(Debug, Default)]
pub struct Plan {
    /// Fully cached tasks
    pub cached: Vec<TaskOutcome>,
    /// Tasks to execute
    pub pending: Vec<PlannedTask>,
}

/// Shared state of one `execute` call
struct RunState<'r> {
    ui: &'r dyn ExecUi,
    task_ui: &'r dyn TaskExecutionUi,
    token: &'r CancellationToken,
    stop: AtomicBool,
    cleanup_errors: Mutex<Vec<Error>>,
}

pub struct Executor<'a> {
    cache: &'a dyn ExecutionCache,
    creator: &'a dyn WorkspaceCreator,
    runner: &'a dyn StepRunner,
    options: ExecutorOptions,
}

impl<'a> Executor<'a> {
    pub fn new(
        cache: &'a dyn ExecutionCache,
        creator: &'a dyn WorkspaceCreator,
        runner: &'a dyn StepRunner,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            cache,
            creator,
            runner,
            options,
        }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Split tasks into cache hits and work to do
    pub fn check_cache(&self, tasks: Vec<Task>) -> Plan {
        let mut plan = Plan::default();
        for task in tasks {
            let lookup = lookup_longest_prefix(self.cache, &task.cache_keys);
            let total = task.cache_keys.step_count();
            if total > 0 && lookup.cached_steps == total {
                debug!("{} is fully cached", task.label());
                plan.cached.push(TaskOutcome::new(
                    task,
                    TaskStatus::CacheHit,
                    lookup.results,
                    total,
                ));
            } else {
                plan.pending.push(PlannedTask {
                    task,
                    cached: lookup,
                });
            }
        }
        plan
    }

    /// Run planned tasks with bounded parallelism.
    ///
    /// Returns one outcome per planned task, in input order. Task failures
    /// are part of the outcomes; the only error is a workspace that could
    /// not be released, which is reported after every task has finished.
    pub fn execute(
        &self,
        pending: Vec<PlannedTask>,
        ui: &dyn ExecUi,
        token: &CancellationToken,
    ) -> Result<Vec<TaskOutcome>> {
        if self.options.parallelism == 0 {
            return Err(Error::Config {
                message: "parallelism must be at least 1".to_string(),
            });
        }

        let task_ui = ui.executing_tasks(self.options.verbose, self.options.parallelism);
        let tasks: Vec<&Task> = pending.iter().map(|p| &p.task).collect();
        task_ui.start(&tasks);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.parallelism)
            .thread_name(|i| format!("batch-exec-worker-{}", i))
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let state = RunState {
            ui,
            task_ui: task_ui.as_ref(),
            token,
            stop: AtomicBool::new(false),
            cleanup_errors: Mutex::new(Vec::new()),
        };

        let outcomes: Vec<TaskOutcome> = pool.install(|| {
            pending
                .into_par_iter()
                .map(|planned| self.run_task(planned, &state))
                .collect()
        });

        let mut cleanup_errors = state
            .cleanup_errors
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if !cleanup_errors.is_empty() {
            let error = cleanup_errors.swap_remove(0);
            task_ui.failed(&error);
            return Err(error);
        }

        match outcomes.iter().find_map(|o| o.error.as_ref()) {
            Some(error) => task_ui.failed(error),
            None => task_ui.success(),
        }
        Ok(outcomes)
    }

    fn run_task(&self, planned: PlannedTask, state: &RunState<'_>) -> TaskOutcome {
        let PlannedTask { task, cached } = planned;

        if state.token.is_cancelled() || state.stop.load(Ordering::SeqCst) {
            let outcome = TaskOutcome::skipped(task);
            state.task_ui.task_finished(&outcome);
            return outcome;
        }

        let slot = rayon::current_thread_index().unwrap_or_default();
        state.task_ui.task_started(&task, slot);

        let token = state.token.child_with_timeout(self.options.timeout);
        let cached_steps = cached.cached_steps;
        let mut results = cached.results;
        let result = self.run_steps(&task, &mut results, cached_steps, state, &token);

        let log_file = if self.options.keep_logs {
            self.write_log(&task, &results[cached_steps..], result.as_ref().err())
        } else {
            None
        };

        let mut outcome = match result {
            Ok(()) => TaskOutcome::new(task, TaskStatus::Succeeded, results, cached_steps),
            Err(error) => {
                if !self.options.skip_errors {
                    state.stop.store(true, Ordering::SeqCst);
                }
                TaskOutcome::failed(task, results, cached_steps, error)
            }
        };
        outcome.log_file = log_file;
        state.task_ui.task_finished(&outcome);
        outcome
    }

    fn run_steps(
        &self,
        task: &Task,
        results: &mut Vec<StepResult>,
        cached_steps: usize,
        state: &RunState<'_>,
        token: &CancellationToken,
    ) -> Result<()> {
        let guard = WorkspaceGuard::acquire(self.creator, &task.repository, &task.steps)?;
        let result = self.run_in_workspace(task, guard.workspace(), results, cached_steps, state, token);

        if let Err(e) = guard.release() {
            error!("{}", e);
            state
                .cleanup_errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(e);
        }
        result
    }

    fn run_in_workspace(
        &self,
        task: &Task,
        workspace: &Workspace,
        results: &mut Vec<StepResult>,
        cached_steps: usize,
        state: &RunState<'_>,
        token: &CancellationToken,
    ) -> Result<()> {
        if cached_steps > 0 {
            let changes = compose_changes(results.iter().map(|r| r.changes.as_slice()));
            debug!(
                "Resuming {} after {} cached step(s), replaying {} change(s)",
                task.label(),
                cached_steps,
                changes.len()
            );
            apply_changes(&workspace.root, &changes)?;
        }

        let mut outputs: BTreeMap<String, String> = BTreeMap::new();
        for result in results.iter() {
            outputs.extend(result.outputs.clone());
        }

        for index in cached_steps + 1..=task.steps.len() {
            let step = &task.steps[index - 1];
            state.task_ui.step_started(task, index, &step.run);

            let ctx = StepContext {
                repository: &task.repository,
                batch_name: &task.batch_name,
                workspace,
                path: &task.path,
                step,
                index,
                previous: results.last(),
                outputs: &outputs,
                token,
                timeout: self.options.timeout,
            };
            match self.runner.run(&ctx) {
                Ok(result) => {
                    outputs.extend(result.outputs.clone());
                    state.task_ui.step_finished(task, index, &result);
                    results.push(result);
                    self.store(task, results, state.ui);
                }
                Err(e) => {
                    state.task_ui.step_failed(task, index, &e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Cache the results of steps `1..=results.len()`. Failures are logged.
    fn store(&self, task: &Task, results: &[StepResult], ui: &dyn ExecUi) {
        let key = task.cache_keys.key(results.len());
        let entry = CacheEntry {
            key: key.clone(),
            results: results.to_vec(),
        };
        if let Err(e) = self.cache.set(&entry) {
            warn!("Failed to write cache entry for {}: {}", task.label(), e);
            return;
        }
        match serde_json::to_vec(&entry) {
            Ok(data) => ui.write_cache(&key.hash, &data),
            Err(e) => warn!("Failed to serialize cache entry {}: {}", key, e),
        }
    }

    fn write_log(&self, task: &Task, executed: &[StepResult], error: Option<&Error>) -> Option<PathBuf> {
        let path = self.options.log_dir.join(format!("{}.log", task.slug()));
        let mut content = format!("# {}\n", task.label());
        for result in executed {
            content.push_str(&format!(
                "--- step {} ---\nstdout:\n{}\nstderr:\n{}\n",
                result.step, result.stdout, result.stderr
            ));
        }
        if let Some(error) = error {
            content.push_str(&format!("--- error ---\n{}\n", error));
        }

        match fs::create_dir_all(&self.options.log_dir).and_then(|_| fs::write(&path, content)) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failed to write log file {}: {}", path.display(), e);
                None
            }
        }
    }
}
