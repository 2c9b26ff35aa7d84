//! Thin wrappers over the system `git` command
//!
//! Only read-only queries are needed: the engine never commits or pushes, it
//! just needs a stable revision and branch for each local checkout.

use std::path::Path;
use std::process::Command;

use crate::error::Error;

/// Check whether a directory is the root of a git checkout
pub fn is_repository(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Resolve the commit `HEAD` points to
pub fn rev_parse_head(dir: &Path) -> Result<String, Error> {
    run_git(dir, &["rev-parse", "HEAD"])
}

/// Resolve the current branch name
///
/// Returns `HEAD` for a detached checkout, matching what git prints.
pub fn current_branch(dir: &Path) -> Result<String, Error> {
    run_git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
}

/// Check whether the working tree differs from `HEAD`
///
/// Untracked and ignored files count as changes: they are part of what a
/// copied checkout contains.
pub fn has_local_changes(dir: &Path) -> Result<bool, Error> {
    let status = run_git(dir, &["status", "--porcelain", "--ignored", "--untracked-files=all"])?;
    Ok(!status.is_empty())
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String, Error> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::Resolution {
            message: format!("git {} in {}: {}", args.join(" "), dir.display(), e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Resolution {
            message: format!(
                "git {} failed in {}: {}",
                args.join(" "),
                dir.display(),
                stderr.trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::process::Command;

    /// Initialize a repository in `dir` with one commit holding `files`.
    ///
    /// Returns `None` when no usable `git` is installed.
    pub fn init_committed(dir: &Path, files: &[(&str, &str)]) -> Option<()> {
        for (path, content) in files {
            std::fs::write(dir.join(path), content).ok()?;
        }
        let git = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(dir)
                .env("GIT_CONFIG_NOSYSTEM", "1")
                .env("HOME", dir)
                .output()
                .ok()
                .filter(|output| output.status.success())
                .map(|_| ())
        };
        git(&["init", "-q"])?;
        git(&["config", "user.email", "batch@example.com"])?;
        git(&["config", "user.name", "Batch Exec"])?;
        git(&["config", "commit.gpgsign", "false"])?;
        git(&["add", "-A"])?;
        git(&["commit", "-q", "-m", "initial"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_repository() {
        let temp = TempDir::new().unwrap();
        assert!(!is_repository(temp.path()));
        std::fs::create_dir(temp.path().join(".git")).unwrap();
        assert!(is_repository(temp.path()));
    }

    #[test]
    fn test_has_local_changes() {
        let temp = TempDir::new().unwrap();
        if test_support::init_committed(temp.path(), &[("README.md", "v1\n")]).is_none() {
            return;
        }
        assert!(!has_local_changes(temp.path()).unwrap());

        std::fs::write(temp.path().join("README.md"), "v2\n").unwrap();
        assert!(has_local_changes(temp.path()).unwrap());

        std::fs::write(temp.path().join("README.md"), "v1\n").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "new\n").unwrap();
        assert!(has_local_changes(temp.path()).unwrap());
    }

    #[test]
    fn test_rev_parse_outside_repository_fails() {
        let temp = TempDir::new().unwrap();
        let result = rev_parse_head(temp.path());
        assert!(matches!(result, Err(Error::Resolution { .. })));
    }
}
