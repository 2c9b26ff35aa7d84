//! # Exec Command Implementation
//!
//! Runs a batch spec against a directory of local repository checkouts.
//!
//! ## Process
//!
//! 1. Load the configuration and the batch spec
//! 2. Wire the local collaborators: a directory resolver, the host runtime,
//!    directory workspaces, the shell step runner, the disk cache and a
//!    directory uploader
//! 3. Run [`execute_batch`] and print the summary
//!
//! Changeset specs and the batch spec are written as JSON to the output
//! directory.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use batch_exec::cache::DiskCache;
use batch_exec::cancel::CancellationToken;
use batch_exec::error::{exit_codes, Error};
use batch_exec::executor::ExecutorOptions;
use batch_exec::output::render_summary;
use batch_exec::phases::orchestrator::execute_batch;
use batch_exec::phases::{preparation, Environment, RunOptions};
use batch_exec::repository::LocalRepositoryResolver;
use batch_exec::runtime::{Capabilities, HostRuntime};
use batch_exec::step::ShellStepRunner;
use batch_exec::ui::LogUi;
use batch_exec::upload::DirectoryUploader;
use batch_exec::workspace::{CreatorType, DirWorkspaceCreator, WorkspaceCreator};
use clap::{Args, ValueEnum};
use log::{debug, warn};

use super::GlobalOptions;

/// Workspace strategy selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum WorkspaceMode {
    /// Let the runtime decide
    #[default]
    Auto,
    /// Bind-mounted checkout per task
    Bind,
    /// Volume per task
    Volume,
}

/// Execute a batch spec
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Batch spec file
    #[arg(short = 'f', long = "file", value_name = "SPEC")]
    pub file: PathBuf,

    /// Directory whose subdirectories are the repositories to run against
    #[arg(long, value_name = "DIR")]
    pub repos: PathBuf,

    /// Maximum number of tasks running at once
    #[arg(short = 'j', long = "parallelism", value_name = "N")]
    pub parallelism: Option<usize>,

    /// Timeout per task (e.g. "30s", "5m", "1h")
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Keep going when tasks fail and publish what succeeded
    #[arg(long)]
    pub skip_errors: bool,

    /// Keep a log file per executed task
    #[arg(long)]
    pub keep_logs: bool,

    /// Empty the cache before running
    #[arg(long)]
    pub clear_cache: bool,

    /// Cache directory (defaults to the configured one)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Where workspaces are created (defaults to the temp directory)
    #[arg(long, value_name = "DIR")]
    pub workspace_root: Option<PathBuf>,

    /// Leave workspaces on disk after each task
    #[arg(long)]
    pub retain_workspaces: bool,

    /// Workspace strategy
    #[arg(long, value_enum, default_value_t = WorkspaceMode::Auto)]
    pub workspace: WorkspaceMode,

    /// Directory the changeset specs and batch spec are written to
    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = "batch-exec-out")]
    pub output: PathBuf,

    /// Namespace to create the batch spec in
    #[arg(long, value_name = "NS")]
    pub namespace: Option<String>,

    /// Apply the batch spec after creating it
    #[arg(long)]
    pub apply: bool,

    /// Include repositories on unsupported code hosts
    #[arg(long)]
    pub allow_unsupported: bool,

    /// Include repositories that carry an ignore file
    #[arg(long)]
    pub allow_ignored: bool,

    /// Report every step, not just every task
    #[arg(short, long)]
    pub verbose: bool,
}

/// Execute the `exec` command.
pub fn execute(args: ExecArgs, global: &GlobalOptions) -> Result<()> {
    let config = global.load_config(args.cache_dir.clone(), args.parallelism)?;
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    let ui = LogUi;
    let source = fs::read_to_string(&args.file).map_err(|e| Error::Usage {
        message: format!("cannot read batch spec {}: {}", args.file.display(), e),
    })?;
    let spec = preparation::parse_batch_spec(&source, &ui)?;

    if !args.repos.is_dir() {
        return Err(Error::Usage {
            message: format!("repository directory {} does not exist", args.repos.display()),
        }
        .into());
    }

    let workspace_root = args
        .workspace_root
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("batch-exec-workspaces"));
    let retain = args.retain_workspaces;
    debug!("Creating workspaces under {}", workspace_root.display());

    let runtime = match args.workspace {
        WorkspaceMode::Volume => HostRuntime::with_capabilities(Capabilities {
            privileged_volumes: true,
        }),
        WorkspaceMode::Bind | WorkspaceMode::Auto => HostRuntime::new(),
    };
    let workspaces = move |kind: CreatorType| -> Box<dyn WorkspaceCreator> {
        Box::new(DirWorkspaceCreator::new(workspace_root.clone(), kind).retain(retain))
    };

    let resolver = LocalRepositoryResolver::new(args.repos.clone());
    let runner = ShellStepRunner::new();
    let cache = DiskCache::new(config.cache_dir.clone());
    let uploader = DirectoryUploader::new(args.output.clone(), &config.endpoint);

    let env = Environment {
        resolver: &resolver,
        runtime: &runtime,
        workspaces: &workspaces,
        runner: &runner,
        cache: &cache,
        uploader: &uploader,
        ui: &ui,
    };
    let options = RunOptions {
        executor: ExecutorOptions {
            parallelism: config.parallelism,
            timeout,
            skip_errors: args.skip_errors,
            keep_logs: args.keep_logs,
            log_dir: args.output.join("logs"),
            verbose: args.verbose,
        },
        namespace: args.namespace.clone(),
        allow_unsupported: args.allow_unsupported,
        allow_ignored: args.allow_ignored,
        apply: args.apply,
        clear_cache: args.clear_cache,
    };

    let token = CancellationToken::new();
    cancel_on_interrupt(&token)?;

    let result = execute_batch(&spec, &env, &options, &token)
        .with_context(|| format!("Batch change '{}' failed", spec.name))?;

    print!("{}", render_summary(&global.output, &result));
    Ok(())
}

/// Cancel `token` on the first Ctrl-C so running steps stop and every
/// workspace is released. A second Ctrl-C exits immediately.
fn cancel_on_interrupt(token: &CancellationToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the interrupt handler")?;
    let token = token.clone();

    std::thread::Builder::new()
        .name("batch-exec-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot listen for interrupts: {}", e);
                    return;
                }
                warn!("Interrupted, cancelling running tasks");
                token.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(exit_codes::INTERRUPTED);
                }
            })
        })
        .context("Failed to start the interrupt handler")?;
    Ok(())
}

/// Parse a duration string into a Duration
///
/// Format: number followed by unit (s, m, h, d, w)
/// Examples: "30s", "5m", "1h", "1d", "2w"
fn parse_duration(duration_str: &str) -> batch_exec::error::Result<Duration> {
    let duration_str = duration_str.trim().to_lowercase();
    let invalid = |reason: String| Error::Usage {
        message: format!("invalid duration '{}': {}", duration_str, reason),
    };

    let split_idx = duration_str
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(duration_str.len());
    if split_idx == 0 {
        return Err(invalid("must start with a number".to_string()));
    }

    let (number_str, unit_str) = duration_str.split_at(split_idx);
    let number: f64 = number_str
        .parse()
        .map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?;

    let seconds = match unit_str {
        "s" | "sec" | "second" | "seconds" => number,
        "m" | "min" | "minute" | "minutes" => number * 60.0,
        "h" | "hr" | "hour" | "hours" => number * 3600.0,
        "d" | "day" | "days" => number * 86400.0,
        "w" | "week" | "weeks" => number * 604800.0,
        _ => return Err(invalid("valid units are s, m, h, d, w".to_string())),
    };
    if seconds <= 0.0 {
        return Err(invalid("must be positive".to_string()));
    }

    Duration::try_from_secs_f64(seconds).map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2hours").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604800));
        assert_eq!(parse_duration(" 1.5M ").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_duration_errors_are_usage_errors() {
        for input in ["", "s", "10", "10x", "0s", "1.2.3s", "99999999999999999999999w"] {
            let err = parse_duration(input).unwrap_err();
            assert!(matches!(err, Error::Usage { .. }), "{}: {}", input, err);
        }
    }
}
