//! Phase 3: Execution
//!
//! Checks the cache for every task, runs the rest and decides whether the
//! run may continue with what succeeded.

use std::path::PathBuf;

use crate::cancel::CancellationToken;
use crate::error::{exit_codes, Error, Result};
use crate::executor::{Executor, Plan};
use crate::task::{Task, TaskOutcome, TaskStatus};
use crate::ui::ExecUi;

pub fn check_cache(executor: &Executor<'_>, tasks: Vec<Task>, ui: &dyn ExecUi) -> Plan {
    ui.checking_cache();
    let plan = executor.check_cache(tasks);
    ui.checking_cache_success(plan.cached.len(), plan.pending.len());
    plan
}

/// Run every planned task. Cached outcomes come first.
pub fn execute_tasks(
    executor: &Executor<'_>,
    plan: Plan,
    ui: &dyn ExecUi,
    token: &CancellationToken,
) -> Result<Vec<TaskOutcome>> {
    let Plan { cached, pending } = plan;
    let mut outcomes = cached;
    outcomes.extend(executor.execute(pending, ui, token)?);

    let logs = kept_logs(&outcomes);
    if !logs.is_empty() {
        ui.log_files_kept(&logs);
    }
    Ok(outcomes)
}

pub fn kept_logs(outcomes: &[TaskOutcome]) -> Vec<PathBuf> {
    outcomes.iter().filter_map(|o| o.log_file.clone()).collect()
}

/// Decide whether the run continues after execution.
///
/// A cancelled run never continues. Failed tasks stop the run unless
/// `skip_errors` is set, in which case the failure is reported and the
/// successful tasks go on to publication.
pub fn check_failures(
    outcomes: &[TaskOutcome],
    skip_errors: bool,
    token: &CancellationToken,
    ui: &dyn ExecUi,
) -> Result<()> {
    if token.is_cancelled() {
        return Err(Error::ExitCode {
            code: exit_codes::INTERRUPTED,
            message: "execution cancelled".to_string(),
        });
    }

    let failed: Vec<&TaskOutcome> = outcomes
        .iter()
        .filter(|o| o.status == TaskStatus::Failed)
        .collect();
    let Some(first) = failed.first() else {
        return Ok(());
    };

    let error = Error::TasksFailed {
        failed: failed.len(),
        first: match &first.error {
            Some(e) => format!("{}: {}", first.task.label(), e),
            None => first.task.label(),
        },
    };
    if skip_errors {
        ui.executing_tasks_skipping_errors(&error);
        Ok(())
    } else {
        Err(error)
    }
}
