//! Changeset spec construction
//!
//! Turns a completed task into the wire artifact that is uploaded for its
//! repository. Building is pure: no I/O, and no artifact at all for a task
//! without changes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::batch_spec::{BatchSpec, ChangesetTemplate, CommitTemplate};
use crate::error::{Error, Result};
use crate::task::{TaskOutcome, TaskStatus};
use crate::template::TemplateContext;

const REFS_HEADS: &str = "refs/heads/";

/// One commit of a changeset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCommit {
    pub message: String,
    pub diff: String,
}

/// Proposed change to one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesetSpec {
    pub base_repository: String,
    pub base_ref: String,
    pub base_rev: String,
    pub head_repository: String,
    pub head_ref: String,
    pub title: String,
    pub body: String,
    pub commits: Vec<GitCommit>,
    pub published: bool,
}

/// Template used when the batch spec has none
pub fn default_template(spec: &BatchSpec) -> ChangesetTemplate {
    ChangesetTemplate {
        title: spec.name.clone(),
        body: spec.description.clone(),
        branch: format!("batch-exec/{}", spec.name),
        commit: CommitTemplate {
            message: spec.name.clone(),
        },
        published: false,
    }
}

fn qualified_ref(branch: &str) -> String {
    let branch = branch.strip_prefix(REFS_HEADS).unwrap_or(branch);
    format!("{}{}", REFS_HEADS, branch)
}

/// Build the changeset spec for a finished task.
///
/// Returns `None` for tasks that did not complete or did not change
/// anything. Tasks in a sub-directory workspace get the directory appended
/// to their branch so partitions of one repository never collide.
pub fn build(outcome: &TaskOutcome, spec: &BatchSpec) -> Result<Option<ChangesetSpec>> {
    if !matches!(outcome.status, TaskStatus::Succeeded | TaskStatus::CacheHit) {
        return Ok(None);
    }
    if outcome.diff.is_empty() {
        return Ok(None);
    }

    let template = spec
        .changeset_template
        .clone()
        .unwrap_or_else(|| default_template(spec));
    let repo = &outcome.task.repository;
    let ctx = TemplateContext::new()
        .with("repository.name", &*repo.name)
        .with("repository.branch", &*repo.default_branch)
        .with("batch_change.name", &*spec.name)
        .with_outputs(&outcome.outputs);

    let mut branch = ctx.render(&template.branch)?;
    if !outcome.task.path.is_empty() {
        branch = format!("{}-{}", branch, outcome.task.path.replace('/', "-"));
    }

    Ok(Some(ChangesetSpec {
        base_repository: repo.id.clone(),
        base_ref: qualified_ref(&repo.default_branch),
        base_rev: repo.revision.clone(),
        head_repository: repo.id.clone(),
        head_ref: qualified_ref(&branch),
        title: ctx.render(&template.title)?,
        body: ctx.render(&template.body)?,
        commits: vec![GitCommit {
            message: ctx.render(&template.commit.message)?,
            diff: outcome.diff.clone(),
        }],
        published: template.published,
    }))
}

/// Build specs for every outcome, rejecting duplicate branches per repository
pub fn build_all(outcomes: &[TaskOutcome], spec: &BatchSpec) -> Result<Vec<ChangesetSpec>> {
    let mut specs = Vec::new();
    let mut seen = HashSet::new();
    for outcome in outcomes {
        if let Some(changeset) = build(outcome, spec)? {
            if !seen.insert((changeset.head_repository.clone(), changeset.head_ref.clone())) {
                return Err(Error::BatchSpec {
                    message: format!(
                        "multiple changesets for {} use branch {}",
                        outcome.task.repository.name, changeset.head_ref
                    ),
                });
            }
            specs.push(changeset);
        }
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_spec;
    use crate::repository::test_support::repo;
    use crate::snapshot::FileChange;
    use crate::step::StepResult;
    use crate::task::test_support::step;
    use crate::task::Task;

    const SPEC: &str = r#"
name: hello-world
description: Add hello world
on:
  - repositoriesMatching: "*"
steps:
  - run: echo hi
    container: alpine
changesetTemplate:
  title: Hello ${{ repository.name }}
  body: ${{ outputs.summary }}
  branch: hello-${{ batch_change.name }}
  commit:
    message: Say hello
  published: true
"#;

    fn outcome(path: &str, status: TaskStatus, changed: bool) -> TaskOutcome {
        let mut result = StepResult {
            step: 1,
            ..StepResult::default()
        };
        result
            .outputs
            .insert("summary".to_string(), "one file".to_string());
        if changed {
            result.changes.push(FileChange {
                path: "hello.txt".to_string(),
                before: None,
                after: Some(b"hi\n".to_vec()),
            });
        }
        let task = Task::new(repo("github.com/org/a"), path, vec![step("echo hi")], "hello-world");
        TaskOutcome::new(task, status, vec![result], 0)
    }

    #[test]
    fn test_build() {
        let spec = batch_spec::parse(SPEC).unwrap();
        let changeset = build(&outcome("", TaskStatus::Succeeded, true), &spec)
            .unwrap()
            .unwrap();

        assert_eq!(changeset.base_repository, "id-github.com/org/a");
        assert_eq!(changeset.base_ref, "refs/heads/main");
        assert_eq!(changeset.base_rev, "rev-github.com/org/a");
        assert_eq!(changeset.head_ref, "refs/heads/hello-hello-world");
        assert_eq!(changeset.title, "Hello github.com/org/a");
        assert_eq!(changeset.body, "one file");
        assert_eq!(changeset.commits[0].message, "Say hello");
        assert!(changeset.commits[0].diff.contains("+hi"));
        assert!(changeset.published);
    }

    #[test]
    fn test_build_no_diff_is_none() {
        let spec = batch_spec::parse(SPEC).unwrap();
        assert!(build(&outcome("", TaskStatus::Succeeded, false), &spec)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_build_unfinished_task_is_none() {
        let spec = batch_spec::parse(SPEC).unwrap();
        assert!(build(&outcome("", TaskStatus::Skipped, true), &spec)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_build_sub_directory_branch() {
        let spec = batch_spec::parse(SPEC).unwrap();
        let changeset = build(&outcome("packages/web", TaskStatus::CacheHit, true), &spec)
            .unwrap()
            .unwrap();
        assert_eq!(changeset.head_ref, "refs/heads/hello-hello-world-packages-web");
    }

    #[test]
    fn test_default_template() {
        let yaml = SPEC.split("changesetTemplate").next().unwrap();
        let spec = batch_spec::parse(yaml).unwrap();
        let changeset = build(&outcome("", TaskStatus::Succeeded, true), &spec)
            .unwrap()
            .unwrap();
        assert_eq!(changeset.head_ref, "refs/heads/batch-exec/hello-world");
        assert_eq!(changeset.title, "hello-world");
        assert_eq!(changeset.body, "Add hello world");
        assert!(!changeset.published);
    }

    #[test]
    fn test_build_all_rejects_duplicate_branches() {
        let spec = batch_spec::parse(SPEC).unwrap();
        let outcomes = vec![
            outcome("", TaskStatus::Succeeded, true),
            outcome("", TaskStatus::Succeeded, true),
        ];
        assert!(matches!(build_all(&outcomes, &spec), Err(Error::BatchSpec { .. })));

        let outcomes = vec![
            outcome("", TaskStatus::Succeeded, true),
            outcome("sub", TaskStatus::Succeeded, true),
            outcome("", TaskStatus::Succeeded, false),
        ];
        assert_eq!(build_all(&outcomes, &spec).unwrap().len(), 2);
    }

    #[test]
    fn test_changeset_spec_wire_format() {
        let spec = batch_spec::parse(SPEC).unwrap();
        let changeset = build(&outcome("", TaskStatus::Succeeded, true), &spec)
            .unwrap()
            .unwrap();
        let json = serde_json::to_value(&changeset).unwrap();
        assert_eq!(json["headRef"], "refs/heads/hello-hello-world");
        assert_eq!(json["baseRepository"], "id-github.com/org/a");
        assert!(json["commits"][0]["diff"].is_string());
    }
}
