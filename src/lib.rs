//! # Batch Change Execution Engine
//!
//! This library runs a batch spec (a list of shell steps plus a changeset
//! template) across many repositories and turns the resulting file changes
//! into changeset specs. It is used by the `batch-exec` command-line tool
//! and can be embedded wherever the repository search, the container
//! runtime or the upload target need to be swapped out.
//!
//! ## Quick Example
//!
//! ```
//! use batch_exec::batch_spec;
//!
//! let spec = batch_spec::parse(
//!     r#"
//! name: hello
//! on:
//!   - repositoriesMatching: "*"
//! steps:
//!   - run: echo hello > hello.txt
//!     container: alpine
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(spec.name, "hello");
//! assert_eq!(spec.images(), vec!["alpine".to_string()]);
//! ```
//!
//! ## Core Concepts
//!
//! - **Tasks (`task`)**: one repository at one workspace path with the
//!   ordered steps to run there.
//! - **Cache (`cache`)**: a chain of content-addressed keys per task, so a
//!   changed step only re-runs itself and what follows it.
//! - **Workspaces (`workspace`)**: isolated checkouts with a guaranteed
//!   single release.
//! - **Executor (`executor`)**: a bounded pool that runs tasks in parallel
//!   while honoring cancellation, timeouts and the error policy.
//! - **Changesets (`changeset`, `upload`)**: the per-repository results
//!   and the boundary that publishes them.
//! - **Reporting (`ui`)**: every lifecycle event goes to an [`ui::ExecUi`]
//!   sink.
//!
//! ## Execution Flow
//!
//! [`phases::orchestrator::execute_batch`] drives a run:
//!
//! 1.  **Preparation**: resolve the namespace, prepare images and pick the
//!     workspace strategy.
//! 2.  **Resolution**: find repositories and split them into tasks.
//! 3.  **Execution**: look up the longest cached prefix of every task and
//!     run the rest.
//! 4.  **Publication**: build, upload and (optionally) apply the changesets.

pub mod batch_spec;
pub mod cache;
pub mod cancel;
pub mod changeset;
pub mod config;
pub mod error;
pub mod executor;
pub mod git;
pub mod output;
pub mod phases;
pub mod repository;
pub mod runtime;
pub mod snapshot;
pub mod step;
pub mod task;
pub mod template;
pub mod ui;
pub mod upload;
pub mod workspace;

mod cache_proptest;
