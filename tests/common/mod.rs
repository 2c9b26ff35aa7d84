//! Shared test utilities for the CLI end-to-end tests.
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = BatchFixture::new()
//!         .with_repo("a", &[("README.md", "a")])
//!         .with_spec(&specs::with_steps(&["echo hi > hi.txt"]));
//!     fixture.exec().assert().success();
//! }
//! ```

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use assert_fs::prelude::*;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::specs;
    pub use super::BatchFixture;
}

/// Batch spec documents for testing.
#[allow(dead_code)]
pub mod specs {
    /// Batch spec running the given shell commands on every repository.
    pub fn with_steps(runs: &[&str]) -> String {
        let mut yaml = String::from(
            "name: e2e\non:\n  - repositoriesMatching: \"*\"\nsteps:\n",
        );
        for run in runs {
            yaml.push_str(&format!("  - run: '{}'\n    container: alpine:3\n", run));
        }
        yaml
    }

    /// Batch spec that fails validation.
    pub const WITHOUT_STEPS: &str = "name: e2e\non:\n  - repositoriesMatching: \"*\"\nsteps: []\n";

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "name: [unclosed";
}

/// A temporary directory holding repositories, a batch spec and every
/// directory the CLI writes to.
///
/// Commands built from the fixture never touch the user's home directory,
/// cache or configuration.
pub struct BatchFixture {
    temp_dir: assert_fs::TempDir,
}

impl BatchFixture {
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("repos")
            .create_dir_all()
            .expect("Failed to create repos directory");
        temp_dir
            .child("home")
            .create_dir_all()
            .expect("Failed to create home directory");
        Self { temp_dir }
    }

    /// Add a repository checkout with the given files.
    pub fn with_repo(self, name: &str, files: &[(&str, &str)]) -> Self {
        let repo = self.temp_dir.child("repos").child(name);
        repo.create_dir_all().expect("Failed to create repository");
        for (path, content) in files {
            repo.child(path)
                .write_str(content)
                .expect("Failed to write repository file");
        }
        self
    }

    /// Write the batch spec.
    pub fn with_spec(self, content: &str) -> Self {
        self.temp_dir
            .child("spec.yaml")
            .write_str(content)
            .expect("Failed to write batch spec");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A path inside the fixture.
    pub fn child_path(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    pub fn spec_path(&self) -> PathBuf {
        self.path().join("spec.yaml")
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.path().join("repos")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path().join("cache")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    /// Changeset spec files written by the last run, sorted.
    pub fn changeset_spec_files(&self) -> Vec<PathBuf> {
        let dir = self.out_dir().join("changeset-specs");
        let mut files: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries.map(|e| e.expect("Failed to read entry").path()).collect(),
            Err(_) => Vec::new(),
        };
        files.sort();
        files
    }

    /// The binary, isolated from the user's environment.
    pub fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("batch-exec");
        cmd.current_dir(self.path())
            .env("HOME", self.path().join("home"))
            .env("NO_COLOR", "1")
            .env_remove("BATCH_EXEC_CONFIG")
            .env_remove("BATCH_EXEC_ENDPOINT")
            .env_remove("BATCH_EXEC_ACCESS_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    /// `batch-exec exec` with every path pointing into the fixture.
    pub fn exec(&self) -> Command {
        let mut cmd = self.command();
        cmd.args(self.exec_args());
        cmd
    }

    /// The same invocation as [`exec`](Self::exec), for tests that need the
    /// running child process.
    pub fn exec_process(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_batch-exec"));
        cmd.current_dir(self.path())
            .env("HOME", self.path().join("home"))
            .env("NO_COLOR", "1")
            .env_remove("BATCH_EXEC_CONFIG")
            .env_remove("BATCH_EXEC_ENDPOINT")
            .env_remove("BATCH_EXEC_ACCESS_TOKEN")
            .env_remove("RUST_LOG")
            .args(self.exec_args());
        cmd
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.path().join("workspaces")
    }

    /// Entries currently under the workspace root.
    pub fn workspace_entries(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.workspaces_dir()) {
            Ok(entries) => entries.map(|e| e.expect("Failed to read entry").path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn exec_args(&self) -> Vec<std::ffi::OsString> {
        vec![
            "exec".into(),
            "-f".into(),
            self.spec_path().into(),
            "--repos".into(),
            self.repos_dir().into(),
            "--cache-dir".into(),
            self.cache_dir().into(),
            "--workspace-root".into(),
            self.workspaces_dir().into(),
            "-o".into(),
            self.out_dir().into(),
        ]
    }
}

impl Default for BatchFixture {
    fn default() -> Self {
        Self::new()
    }
}
