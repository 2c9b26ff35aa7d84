//! Orchestrator for a complete batch run
//!
//! Coordinates the phases into a single call. Parsing the batch spec is left
//! to the caller (see [`preparation::parse_batch_spec`]) so the same parsed
//! spec can be inspected before it runs.

use log::info;

use super::{execution, preparation, publication, resolution, BatchResult, Environment, RunOptions};
use crate::batch_spec::BatchSpec;
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::executor::Executor;
use crate::task::ExecutionReport;

/// Execute a batch spec end to end.
///
/// 1. Resolve the namespace, prepare images, pick the workspace strategy
/// 2. Resolve repositories and determine workspaces
/// 3. Check the cache and execute the remaining tasks
/// 4. Build changeset specs; stop if there are none
/// 5. Upload them, create the batch spec and optionally apply it
///
/// Every error is also reported through [`ExecUi::execution_error`](crate::ui::ExecUi::execution_error).
pub fn execute_batch(
    spec: &BatchSpec,
    env: &Environment<'_>,
    options: &RunOptions,
    token: &CancellationToken,
) -> Result<BatchResult> {
    let result = run(spec, env, options, token);
    if let Err(e) = &result {
        env.ui.execution_error(e);
    }
    result
}

fn run(
    spec: &BatchSpec,
    env: &Environment<'_>,
    options: &RunOptions,
    token: &CancellationToken,
) -> Result<BatchResult> {
    let ui = env.ui;
    let mut result = BatchResult::default();

    if options.clear_cache {
        let removed = env.cache.clear()?;
        info!("Cleared {} cache entries", removed);
    }

    // Phase 1: Preparation
    result.namespace = preparation::resolve_namespace(env.uploader, options.namespace.as_deref(), ui)?;
    preparation::prepare_images(env.runtime, spec, ui)?;
    let kind = preparation::determine_workspace_creator_type(env.runtime, ui)?;
    let creator = (env.workspaces)(kind);

    // Phase 2: Resolution
    result.repositories = resolution::resolve_repositories(
        env.resolver,
        spec,
        options.allow_unsupported,
        options.allow_ignored,
        ui,
    )?;
    let tasks = resolution::determine_workspaces(spec, &result.repositories.supported, ui)?;

    // Phase 3: Execution
    let executor = Executor::new(env.cache, creator.as_ref(), env.runner, options.executor.clone());
    let plan = execution::check_cache(&executor, tasks, ui);
    result.outcomes = execution::execute_tasks(&executor, plan, ui, token)?;
    result.report = ExecutionReport::from_outcomes(&result.outcomes);
    result.log_files = execution::kept_logs(&result.outcomes);
    info!("Execution finished: {}", result.report);
    execution::check_failures(&result.outcomes, options.executor.skip_errors, token, ui)?;

    // Phase 4: Publication
    result.changeset_specs = publication::build_changeset_specs(&result.outcomes, spec)?;
    if result.changeset_specs.is_empty() {
        ui.no_changeset_specs();
        return Ok(result);
    }

    result.changeset_spec_ids = publication::upload_changeset_specs(env.uploader, &result.changeset_specs, ui)?;
    let created = publication::create_batch_spec(
        env.uploader,
        &result.namespace,
        spec,
        &result.changeset_spec_ids,
        ui,
    )?;
    if options.apply {
        result.batch_change_url = Some(publication::apply_batch_spec(env.uploader, &created, ui)?);
    }
    result.batch_spec = Some(created);

    Ok(result)
}
