//! Batch spec document types
//!
//! The batch spec is produced outside the engine; this module only carries the
//! typed representation the engine reads and a thin YAML adapter so the CLI
//! can load a spec from disk. Everything here is immutable once parsed.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A parsed batch spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSpec {
    /// Name of the batch change, also the default branch name
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Repository selection rules
    #[serde(default)]
    pub on: Vec<OnRule>,
    /// Monorepo partitioning rules
    #[serde(default)]
    pub workspaces: Vec<WorkspaceRule>,
    /// Steps executed in order inside every workspace
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub changeset_template: Option<ChangesetTemplate>,
}

/// A repository selection rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnRule {
    /// Select a single repository by name
    Repository { repository: String },
    /// Select every repository whose name matches a glob
    Matching {
        #[serde(rename = "repositoriesMatching")]
        repositories_matching: String,
    },
}

impl OnRule {
    /// Check whether a repository name is selected by this rule
    pub fn matches(&self, repo_name: &str) -> Result<bool> {
        match self {
            OnRule::Repository { repository } => Ok(repository == repo_name),
            OnRule::Matching {
                repositories_matching,
            } => Ok(Pattern::new(repositories_matching)?.matches(repo_name)),
        }
    }
}

/// Splits matching repositories into one workspace per directory holding a
/// marker file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRule {
    /// File name whose parent directories become workspace roots
    pub root_at_location_of: String,
    /// Glob restricting which repositories the rule applies to
    #[serde(rename = "in", default)]
    pub in_repositories: Option<String>,
}

impl WorkspaceRule {
    pub fn applies_to(&self, repo_name: &str) -> Result<bool> {
        match &self.in_repositories {
            Some(pattern) => Ok(Pattern::new(pattern)?.matches(repo_name)),
            None => Ok(true),
        }
    }
}

/// One step definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Step {
    /// Shell command, may contain `${{ }}` placeholders
    pub run: String,
    /// Container image the step runs in
    pub container: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Declared outputs, name to value template
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputSpec {
    pub value: String,
}

impl Step {
    /// Canonical byte representation used for cache fingerprints.
    ///
    /// Maps are `BTreeMap`s so the encoding does not depend on insertion order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Serializing plain strings and BTreeMaps cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Metadata for the changesets a batch spec produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesetTemplate {
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub branch: String,
    pub commit: CommitTemplate,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitTemplate {
    pub message: String,
}

impl BatchSpec {
    /// Distinct container images in first-use order
    pub fn images(&self) -> Vec<String> {
        let mut images: Vec<String> = Vec::new();
        for step in &self.steps {
            if !images.contains(&step.container) {
                images.push(step.container.clone());
            }
        }
        images
    }

    /// Check whether a repository is selected by any `on` rule
    pub fn selects(&self, repo_name: &str) -> Result<bool> {
        for rule in &self.on {
            if rule.matches(repo_name)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Validate the invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(batch_spec_error("name must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(batch_spec_error("at least one step is required"));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.run.trim().is_empty() {
                return Err(batch_spec_error(&format!("step {} has an empty run", i + 1)));
            }
            if step.container.trim().is_empty() {
                return Err(batch_spec_error(&format!(
                    "step {} has no container",
                    i + 1
                )));
            }
        }
        for rule in &self.on {
            if let OnRule::Matching {
                repositories_matching,
            } = rule
            {
                Pattern::new(repositories_matching)?;
            }
        }
        if let Some(template) = &self.changeset_template {
            if template.branch.trim().is_empty() {
                return Err(batch_spec_error("changesetTemplate.branch must not be empty"));
            }
        }
        Ok(())
    }
}

fn batch_spec_error(message: &str) -> Error {
    Error::BatchSpec {
        message: message.to_string(),
    }
}

/// Parse and validate a batch spec from YAML
pub fn parse(yaml: &str) -> Result<BatchSpec> {
    let spec: BatchSpec = serde_yaml::from_str(yaml)?;
    spec.validate()?;
    Ok(spec)
}

/// Read, parse and validate a batch spec file
pub fn from_file(path: &Path) -> Result<BatchSpec> {
    let content = fs::read_to_string(path)?;
    parse(&content)
}
