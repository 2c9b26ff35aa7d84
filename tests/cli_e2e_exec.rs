//! End-to-end tests for the `batch-exec exec` command.
//!
//! Repositories are plain directories and steps run on the host shell, so
//! these tests need `sh` but no network or container runtime.

#[allow(dead_code)]
mod common;
use common::prelude::*;

fn two_repos() -> BatchFixture {
    BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_repo("beta", &[("README.md", "beta\n")])
}

#[test]
fn test_exec_help() {
    let fixture = BatchFixture::new();
    fixture
        .command()
        .arg("exec")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Execute a batch spec"))
        .stdout(predicate::str::contains("--skip-errors"))
        .stdout(predicate::str::contains("--timeout"));
}

#[test]
fn test_exec_writes_changeset_specs() {
    let fixture = two_repos().with_spec(&specs::with_steps(&["echo hello > hello.txt"]));

    fixture
        .exec()
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] alpha (1 file(s) changed)"))
        .stdout(predicate::str::contains("[OK] beta (1 file(s) changed)"))
        .stdout(predicate::str::contains("2 succeeded, 0 cached, 0 failed, 0 skipped"))
        .stdout(predicate::str::contains("2 changeset spec(s) in namespace local"))
        .stdout(predicate::str::contains(
            "Preview: https://sourcegraph.com/users/local/batch-changes/apply/",
        ));

    let specs = fixture.changeset_spec_files();
    assert_eq!(specs.len(), 2);
    let content = std::fs::read_to_string(&specs[0]).unwrap();
    assert!(content.contains("+hello"));
    assert!(content.contains("refs/heads/batch-exec/e2e"));
    assert!(fixture.out_dir().join("batch-spec.json").exists());

    // Steps ran in isolated workspaces
    fixture.child_path("repos/alpha/hello.txt").assert(predicate::path::missing());
}

#[test]
fn test_exec_rerun_is_served_from_cache() {
    let fixture = two_repos().with_spec(&specs::with_steps(&["echo hello > hello.txt"]));

    fixture.exec().assert().success();
    fixture
        .exec()
        .assert()
        .success()
        .stdout(predicate::str::contains("[CACHED] alpha"))
        .stdout(predicate::str::contains("0 succeeded, 2 cached, 0 failed, 0 skipped"))
        .stdout(predicate::str::contains("2 changeset spec(s)"));
}

#[test]
fn test_exec_clear_cache_runs_again() {
    let fixture = two_repos().with_spec(&specs::with_steps(&["echo hello > hello.txt"]));

    fixture.exec().assert().success();
    fixture
        .exec()
        .arg("--clear-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 succeeded, 0 cached"));
}

#[test]
fn test_exec_without_changes() {
    let fixture = two_repos().with_spec(&specs::with_steps(&["true"]));

    fixture
        .exec()
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes produced."));

    assert!(fixture.changeset_spec_files().is_empty());
    assert!(!fixture.out_dir().join("batch-spec.json").exists());
}

#[test]
fn test_exec_reverting_step_produces_no_changes() {
    let fixture = BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_spec(&specs::with_steps(&["echo changed > README.md", "echo alpha > README.md"]));

    fixture
        .exec()
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes produced."));
}

#[test]
fn test_exec_failure_stops_before_upload() {
    let fixture = two_repos().with_spec(&specs::with_steps(&["exit 3"]));

    fixture
        .exec()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("task(s) failed; first failure:"));

    assert!(!fixture.out_dir().join("batch-spec.json").exists());
}

#[test]
fn test_exec_skip_errors_publishes_successes() {
    let fixture = two_repos()
        .with_repo("gamma", &[("fail", "")])
        .with_spec(&specs::with_steps(&["test ! -f fail && echo done > done.txt"]));

    fixture
        .exec()
        .arg("--skip-errors")
        .assert()
        .success()
        .stdout(predicate::str::contains("[FAILED] gamma"))
        .stdout(predicate::str::contains("2 succeeded, 0 cached, 1 failed"))
        .stdout(predicate::str::contains("2 changeset spec(s)"));

    assert_eq!(fixture.changeset_spec_files().len(), 2);
}

#[test]
fn test_exec_timeout_fails_the_task() {
    let fixture = BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_spec(&specs::with_steps(&["sleep 5"]));

    let started = std::time::Instant::now();
    fixture
        .exec()
        .arg("--timeout")
        .arg("1s")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("timed out"));
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
}

#[cfg(unix)]
#[test]
fn test_exec_interrupt_cancels_and_releases_workspaces() {
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    let fixture = BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_spec(&specs::with_steps(&["sleep 30"]));

    let started = Instant::now();
    let child = fixture
        .exec_process()
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // Wait until the step is running in its workspace
    while fixture.workspace_entries().is_empty() {
        assert!(started.elapsed() < Duration::from_secs(20), "workspace never created");
        std::thread::sleep(Duration::from_millis(50));
    }
    std::thread::sleep(Duration::from_millis(500));

    let status = std::process::Command::new("kill")
        .arg("-INT")
        .arg(child.id().to_string())
        .status()
        .unwrap();
    assert!(status.success());

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(130));
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(String::from_utf8_lossy(&output.stderr).contains("execution cancelled"));
    assert!(fixture.workspace_entries().is_empty());
    assert!(fixture.changeset_spec_files().is_empty());
}

#[test]
fn test_exec_apply() {
    let fixture = two_repos().with_spec(&specs::with_steps(&["echo hello > hello.txt"]));

    fixture
        .exec()
        .arg("--apply")
        .arg("--namespace")
        .arg("team")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[APPLIED] Applied: https://sourcegraph.com/users/team/batch-changes/e2e",
        ));

    assert!(fixture.out_dir().join("batch-change.json").exists());
}

#[test]
fn test_exec_keep_logs() {
    let fixture = BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_spec(&specs::with_steps(&["echo from-the-step"]));

    fixture
        .exec()
        .arg("--keep-logs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Log kept:"));

    let logs: Vec<_> = std::fs::read_dir(fixture.out_dir().join("logs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(logs.len(), 1);
    assert!(std::fs::read_to_string(&logs[0]).unwrap().contains("from-the-step"));
}

#[test]
fn test_exec_ignored_repository_is_skipped() {
    let fixture = two_repos()
        .with_repo("ignored", &[(".batchignore", "")])
        .with_spec(&specs::with_steps(&["echo hello > hello.txt"]));

    fixture
        .exec()
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped 0 unsupported and 1 ignored repositories"))
        .stdout(predicate::str::contains("2 changeset spec(s)"));
}

#[test]
fn test_exec_config_file_endpoint() {
    let fixture = BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_spec(&specs::with_steps(&["echo hello > hello.txt"]));
    fixture
        .child_path("home/batch-exec-config.json")
        .write_str(r#"{ "endpoint": "https://sg.example.com/" }"#)
        .unwrap();

    fixture
        .exec()
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Preview: https://sg.example.com/users/local/batch-changes/apply/",
        ));
}
