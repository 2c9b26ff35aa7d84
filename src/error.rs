//! # Error Handling
//!
//! This module defines the centralized error type for `batch-exec`. It uses
//! `thiserror` to build a single `Error` enum covering every failure mode of a
//! batch run, with enough context (repository, step index, captured output) to
//! diagnose a failure without re-running it.
//!
//! ## Taxonomy
//!
//! Errors fall into three groups, which determines how far they propagate:
//!
//! - **Run-level** errors abort the run before any task is scheduled:
//!   `Resolution`, `BatchSpec`, `Config`, `Usage`.
//! - **Task-local** errors are caught at the task boundary and reported as
//!   that task's failure: `Workspace`, `StepExecution`, `Cancelled`,
//!   `Timeout`, `Template`. Unless errors are skipped, they surface at the
//!   end of execution as a single `TasksFailed`.
//! - **Degraded** errors never fail anything on their own: `CacheIo` reads
//!   are treated as misses and writes are only logged. `Upload` errors are
//!   collected per repository.
//!
//! `WorkspaceCleanup` is the exception to the task-local rule: a workspace
//! that could not be released indicates leaked resources and is escalated to
//! the run.
//!
//! The [`Error::exit_code`] method implements the process exit convention
//! used by the binary (see [`exit_codes`]).

use thiserror::Error;

/// Process exit codes used by the `batch-exec` binary.
pub mod exit_codes {
    /// The command completed successfully.
    pub const SUCCESS: i32 = 0;
    /// A generic, fatal error occurred.
    pub const ERROR: i32 = 1;
    /// The command was invoked incorrectly; usage is printed.
    pub const USAGE: i32 = 2;
    /// The run was cancelled before it completed.
    pub const INTERRUPTED: i32 = 130;
}

/// Main error type for batch execution
#[derive(Error, Debug)]
pub enum Error {
    /// The batch spec document is invalid.
    #[error("Batch spec error: {message}")]
    BatchSpec { message: String },

    /// Repository lookup failed. Aborts the run.
    #[error("Repository resolution error: {message}")]
    Resolution { message: String },

    /// A workspace could not be created for a repository.
    #[error("Workspace error for {repository}: {message}")]
    Workspace { repository: String, message: String },

    /// A workspace could not be released. Escalated since it leaks resources.
    #[error("Workspace cleanup failed for {repository} at {path}: {message}")]
    WorkspaceCleanup {
        repository: String,
        path: String,
        message: String,
    },

    /// A step's process failed.
    ///
    /// Carries the 1-based step index, the exit code if the process exited
    /// normally, and whatever the step wrote to stderr.
    #[error("Step {step} failed for {repository}{}: {message}{}",
        exit_code.map(|c| format!(" (exit code {})", c)).unwrap_or_default(),
        if stderr.is_empty() { String::new() } else { format!("\n  stderr: {}", stderr.trim_end()) })]
    StepExecution {
        repository: String,
        step: usize,
        exit_code: Option<i32>,
        message: String,
        stderr: String,
    },

    /// A step was interrupted by run-level cancellation.
    #[error("Step {step} cancelled for {repository}")]
    Cancelled { repository: String, step: usize },

    /// A step was interrupted by the per-task timeout.
    #[error("Step {step} timed out for {repository} after {seconds}s")]
    Timeout {
        repository: String,
        step: usize,
        seconds: u64,
    },

    /// One or more tasks failed and errors are not being skipped.
    #[error("{failed} task(s) failed; first failure: {first}")]
    TasksFailed { failed: usize, first: String },

    /// A cache read or write failed.
    #[error("Cache I/O error for key {key}: {message}")]
    CacheIo { key: String, message: String },

    /// Uploading a changeset spec failed for one repository.
    #[error("Upload failed for {repository}: {message}")]
    Upload { repository: String, message: String },

    /// A template placeholder could not be rendered.
    #[error("Template error: {message}{}", variable.as_ref().map(|v| format!(" (variable: {})", v)).unwrap_or_default())]
    Template {
        message: String,
        variable: Option<String>,
    },

    /// The tool configuration is invalid.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The command was invoked incorrectly.
    #[error("{message}")]
    Usage { message: String },

    /// An error that carries its own process exit code.
    #[error("{message}")]
    ExitCode { code: i32, message: String },

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage { .. } => exit_codes::USAGE,
            Error::ExitCode { code, .. } => *code,
            _ => exit_codes::ERROR,
        }
    }

    /// Whether this error was caused by cancellation or timeout rather than
    /// by the step itself.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Error::Cancelled { .. } | Error::Timeout { .. })
    }

    /// The 1-based index of the step this error is attributed to, if any.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Error::StepExecution { step, .. }
            | Error::Cancelled { step, .. }
            | Error::Timeout { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
