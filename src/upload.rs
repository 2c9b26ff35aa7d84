//! Upload and apply boundary
//!
//! The remote service is hidden behind [`Uploader`]. Changeset specs are
//! submitted independently of each other: a failure for one repository is
//! collected and the rest are still uploaded.
//!
//! [`DirectoryUploader`] is the local implementation. It writes everything
//! it would send as JSON files below an output directory.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::batch_spec::BatchSpec;
use crate::changeset::ChangesetSpec;
use crate::error::{Error, Result};

/// Identifier assigned to an uploaded changeset spec
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangesetSpecId(pub String);

impl fmt::Display for ChangesetSpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A created batch spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSpecRef {
    pub id: String,
    pub namespace: String,
    pub name: String,
    /// Where the result can be previewed before applying
    pub preview_url: String,
}

/// Client for the remote batch changes service
pub trait Uploader: Send + Sync {
    /// Resolve the namespace results are created in, the caller's own when
    /// none is given
    fn resolve_namespace(&self, namespace: Option<&str>) -> Result<String>;

    fn upload_changeset_spec(&self, spec: &ChangesetSpec) -> Result<ChangesetSpecId>;

    fn create_batch_spec(
        &self,
        namespace: &str,
        spec: &BatchSpec,
        ids: &[ChangesetSpecId],
    ) -> Result<BatchSpecRef>;

    /// Apply a created batch spec, returning the batch change URL
    fn apply_batch_spec(&self, batch_spec: &BatchSpecRef) -> Result<String>;
}

/// Outcome of uploading a set of changeset specs
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Ids of the successful uploads, in input order
    pub ids: Vec<ChangesetSpecId>,
    pub errors: Vec<Error>,
}

/// Upload every spec independently, reporting `(done, total)` progress
pub fn upload_all<F>(uploader: &dyn Uploader, specs: &[ChangesetSpec], progress: F) -> UploadReport
where
    F: Fn(usize, usize) + Sync,
{
    let total = specs.len();
    let done = AtomicUsize::new(0);

    let results: Vec<Result<ChangesetSpecId>> = specs
        .par_iter()
        .map(|spec| {
            let result = uploader.upload_changeset_spec(spec).map_err(|e| match e {
                e @ Error::Upload { .. } => e,
                e => Error::Upload {
                    repository: spec.head_repository.clone(),
                    message: e.to_string(),
                },
            });
            progress(done.fetch_add(1, Ordering::SeqCst) + 1, total);
            result
        })
        .collect();

    let mut report = UploadReport::default();
    for result in results {
        match result {
            Ok(id) => report.ids.push(id),
            Err(e) => report.errors.push(e),
        }
    }
    report
}

/// Namespace used when none is requested
pub const DEFAULT_NAMESPACE: &str = "local";

/// Uploader that writes JSON files to a directory
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    out_dir: PathBuf,
    endpoint: String,
}

impl DirectoryUploader {
    pub fn new(out_dir: PathBuf, endpoint: &str) -> Self {
        Self {
            out_dir,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn write_json(&self, relative: &str, value: &impl Serialize) -> std::io::Result<PathBuf> {
        let path = self.out_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
        fs::write(&path, data)?;
        Ok(path)
    }
}

fn short_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex()[..16].to_string()
}

impl Uploader for DirectoryUploader {
    fn resolve_namespace(&self, namespace: Option<&str>) -> Result<String> {
        match namespace.map(str::trim) {
            None => Ok(DEFAULT_NAMESPACE.to_string()),
            Some("") => Err(Error::Usage {
                message: "namespace must not be empty".to_string(),
            }),
            Some(ns) if ns.contains('/') => Err(Error::Usage {
                message: format!("invalid namespace '{}'", ns),
            }),
            Some(ns) => Ok(ns.to_string()),
        }
    }

    fn upload_changeset_spec(&self, spec: &ChangesetSpec) -> Result<ChangesetSpecId> {
        let upload_error = |message: String| Error::Upload {
            repository: spec.head_repository.clone(),
            message,
        };
        let data = serde_json::to_vec(spec).map_err(|e| upload_error(e.to_string()))?;
        let id = ChangesetSpecId(short_hash(&data));
        let path = self
            .write_json(&format!("changeset-specs/{}.json", id), spec)
            .map_err(|e| upload_error(e.to_string()))?;
        debug!("Wrote changeset spec {} to {}", id, path.display());
        Ok(id)
    }

    fn create_batch_spec(
        &self,
        namespace: &str,
        spec: &BatchSpec,
        ids: &[ChangesetSpecId],
    ) -> Result<BatchSpecRef> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(namespace.as_bytes());
        hasher.update(b"\0");
        hasher.update(&serde_json::to_vec(spec)?);
        for id in ids {
            hasher.update(b"\0");
            hasher.update(id.0.as_bytes());
        }
        let id = hasher.finalize().to_hex()[..16].to_string();

        self.write_json(
            "batch-spec.json",
            &json!({
                "id": id,
                "namespace": namespace,
                "spec": spec,
                "changesetSpecs": ids,
            }),
        )?;

        Ok(BatchSpecRef {
            preview_url: format!(
                "{}/users/{}/batch-changes/apply/{}",
                self.endpoint, namespace, id
            ),
            id,
            namespace: namespace.to_string(),
            name: spec.name.clone(),
        })
    }

    fn apply_batch_spec(&self, batch_spec: &BatchSpecRef) -> Result<String> {
        let url = format!(
            "{}/users/{}/batch-changes/{}",
            self.endpoint, batch_spec.namespace, batch_spec.name
        );
        self.write_json(
            "batch-change.json",
            &json!({
                "batchSpec": batch_spec,
                "url": url,
            }),
        )?;
        Ok(url)
    }
}
