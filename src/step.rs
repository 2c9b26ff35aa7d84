//! Step execution
//!
//! A step is one command run inside a task's workspace. The engine only
//! depends on the [`StepRunner`] trait; [`ShellStepRunner`] is the local
//! implementation that runs the rendered command with `sh -c` and derives the
//! step's file changes from workspace snapshots.

use std::collections::BTreeMap;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::batch_spec::Step;
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::snapshot::{render_diff, FileChange, Snapshot};
use crate::template::TemplateContext;
use crate::workspace::Workspace;

/// Environment variable pointing at the step's scratch directory
pub const SCRATCH_DIR_ENV: &str = "BATCH_EXEC_SCRATCH_DIR";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What one step produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// 1-based step index
    pub step: usize,
    /// Files changed by this step alone
    pub changes: Vec<FileChange>,
    /// `changes` rendered as a unified diff
    pub diff: String,
    /// Declared outputs, rendered
    pub outputs: BTreeMap<String, String>,
    pub stdout: String,
    pub stderr: String,
}

/// Everything a runner needs to execute one step
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub repository: &'a Repository,
    pub batch_name: &'a str,
    pub workspace: &'a Workspace,
    /// Workspace partition, relative to the repository root
    pub path: &'a str,
    pub step: &'a Step,
    /// 1-based
    pub index: usize,
    pub previous: Option<&'a StepResult>,
    /// Outputs accumulated from earlier steps
    pub outputs: &'a BTreeMap<String, String>,
    pub token: &'a CancellationToken,
    pub timeout: Option<Duration>,
}

impl StepContext<'_> {
    /// Variables visible to the step's `run`, `env` and output templates
    pub fn template_context(&self) -> TemplateContext {
        TemplateContext::new()
            .with("repository.name", &*self.repository.name)
            .with("repository.branch", &*self.repository.default_branch)
            .with("batch_change.name", self.batch_name)
            .with(
                "previous_step.stdout",
                self.previous.map(|p| p.stdout.as_str()).unwrap_or_default(),
            )
            .with_outputs(self.outputs)
    }

    fn interruption(&self) -> Error {
        if self.token.is_timed_out() {
            Error::Timeout {
                repository: self.repository.name.clone(),
                step: self.index,
                seconds: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            }
        } else {
            Error::Cancelled {
                repository: self.repository.name.clone(),
                step: self.index,
            }
        }
    }

    fn failure(&self, exit_code: Option<i32>, message: String, stderr: String) -> Error {
        Error::StepExecution {
            repository: self.repository.name.clone(),
            step: self.index,
            exit_code,
            message,
            stderr,
        }
    }
}

/// Executes a single step. Shared by all workers.
pub trait StepRunner: Send + Sync {
    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult>;
}

/// Runs steps as shell commands on the host
#[derive(Debug, Clone)]
pub struct ShellStepRunner {
    shell: String,
}

impl Default for ShellStepRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ShellStepRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn(&self, ctx: &StepContext<'_>, command: &str, env: &BTreeMap<String, String>) -> Result<Child> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(ctx.workspace.dir(ctx.path))
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(scratch) = ctx.workspace.scratch.get(ctx.index - 1) {
            cmd.env(SCRATCH_DIR_ENV, scratch);
        }
        cmd.spawn()
            .map_err(|e| ctx.failure(None, format!("failed to start {}: {}", self.shell, e), String::new()))
    }

    /// Wait for the child, killing it if the token fires
    fn wait(&self, ctx: &StepContext<'_>, child: &mut Child) -> Result<ExitStatus> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if ctx.token.is_cancelled() {
                debug!("Killing step {} for {}", ctx.index, ctx.repository.name);
                // The child may have exited in the meantime
                let _ = child.kill();
                child.wait()?;
                return Err(ctx.interruption());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

impl StepRunner for ShellStepRunner {
    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult> {
        if ctx.token.is_cancelled() {
            return Err(ctx.interruption());
        }

        let template = ctx.template_context();
        let command = template.render(&ctx.step.run)?;
        let env = template.render_map(&ctx.step.env)?;

        let before = Snapshot::capture(&ctx.workspace.root)?;
        let mut child = self.spawn(ctx, &command, &env)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // On interruption the readers are detached; grandchildren may still
        // hold the pipes open.
        let status = self.wait(ctx, &mut child)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(ctx.failure(status.code(), "command failed".to_string(), stderr));
        }

        let after = Snapshot::capture(&ctx.workspace.root)?;
        let changes = before.changes_to(&after);
        let diff = render_diff(&changes);

        let output_context = template
            .with("step.stdout", stdout.clone())
            .with("step.stderr", stderr.clone());
        let outputs = ctx
            .step
            .outputs
            .iter()
            .map(|(name, spec)| Ok((name.clone(), output_context.render(&spec.value)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        debug!(
            "Step {} for {} changed {} file(s)",
            ctx.index,
            ctx.repository.name,
            changes.len()
        );

        Ok(StepResult {
            step: ctx.index,
            changes,
            diff,
            outputs,
            stdout,
            stderr,
        })
    }
}
