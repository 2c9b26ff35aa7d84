//! End-to-end tests for CLI exit codes.
//!
//! - Exit code 0: Success
//! - Exit code 1: General error (invalid batch spec, failed tasks, bad config file)
//! - Exit code 2: Invalid command-line usage (clap errors, bad flag values,
//!   unreadable inputs)

#[allow(dead_code)]
mod common;
use common::prelude::*;

fn fixture() -> BatchFixture {
    BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_spec(&specs::with_steps(&["echo hello > hello.txt"]))
}

#[test]
fn test_exit_code_success() {
    fixture().exec().assert().code(0);
}

#[test]
fn test_exit_code_help() {
    BatchFixture::new().command().arg("--help").assert().code(0);
}

#[test]
fn test_exit_code_version() {
    BatchFixture::new()
        .command()
        .arg("--version")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("batch-exec"));
}

#[test]
fn test_exit_code_usage_unknown_flag() {
    fixture().exec().arg("--no-such-flag").assert().code(2);
}

#[test]
fn test_exit_code_usage_missing_subcommand() {
    BatchFixture::new().command().assert().code(2);
}

#[test]
fn test_exit_code_usage_missing_spec_file() {
    let fixture = BatchFixture::new().with_repo("alpha", &[("README.md", "alpha\n")]);
    fixture
        .exec()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot read batch spec"))
        .stderr(predicate::str::contains("Usage: batch-exec"));
}

#[test]
fn test_exit_code_usage_overflowing_timeout() {
    fixture()
        .exec()
        .arg("--timeout")
        .arg("99999999999999999999999w")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid duration"))
        .stderr(predicate::str::contains("Usage: batch-exec"));
}

#[test]
fn test_exit_code_usage_missing_repos_dir() {
    let fixture = fixture();
    fixture
        .command()
        .arg("exec")
        .arg("-f")
        .arg(fixture.spec_path())
        .arg("--repos")
        .arg(fixture.path().join("nowhere"))
        .arg("--cache-dir")
        .arg(fixture.cache_dir())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_exit_code_usage_invalid_endpoint() {
    fixture()
        .exec()
        .arg("--endpoint")
        .arg("ftp://example.com")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid endpoint"));
}

#[test]
fn test_exit_code_usage_invalid_timeout() {
    fixture()
        .exec()
        .arg("--timeout")
        .arg("soon")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid duration"));
}

#[test]
fn test_exit_code_error_zero_parallelism() {
    fixture()
        .exec()
        .arg("-j")
        .arg("0")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("parallelism must be at least 1"));
}

#[test]
fn test_exit_code_error_invalid_spec() {
    let fixture = BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_spec(specs::WITHOUT_STEPS);
    fixture
        .exec()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Batch spec error"));
}

#[test]
fn test_exit_code_error_invalid_yaml() {
    let fixture = BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_spec(specs::INVALID_YAML);
    fixture.exec().assert().code(1);
}

#[test]
fn test_exit_code_error_missing_config_file() {
    let fixture = fixture();
    fixture
        .exec()
        .arg("--config")
        .arg(fixture.path().join("missing.json"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_exit_code_error_failed_step() {
    let fixture = BatchFixture::new()
        .with_repo("alpha", &[("README.md", "alpha\n")])
        .with_spec(&specs::with_steps(&["exit 7"]));
    fixture
        .exec()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("alpha"));
}
