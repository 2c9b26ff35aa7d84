//! # Workspaces
//!
//! Every executed task gets a private filesystem root that nothing else
//! touches while the task runs. This module decides how those roots are
//! materialized and guarantees they are released.
//!
//! ## Strategy
//!
//! [`determine_strategy`] picks between a volume-backed and a bind-mounted
//! layout from the runtime's probed capabilities. The decision is made once
//! per run and shared by all tasks.
//!
//! ## Lifetime
//!
//! A [`WorkspaceGuard`] owns a created workspace. Releasing it explicitly
//! surfaces cleanup errors; dropping it (early return, panic unwinding)
//! releases it as well. Either way the creator's `release` runs exactly once
//! per workspace.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::batch_spec::Step;
use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::runtime::Capabilities;

/// How workspaces are isolated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorType {
    /// Checkout lives in a runtime-managed volume
    Volume,
    /// Checkout lives in a host directory mounted into the container
    Bind,
}

impl fmt::Display for CreatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatorType::Volume => f.write_str("volume"),
            CreatorType::Bind => f.write_str("bind"),
        }
    }
}

/// Pick the workspace strategy for a run
pub fn determine_strategy(capabilities: &Capabilities) -> CreatorType {
    if capabilities.privileged_volumes {
        CreatorType::Volume
    } else {
        CreatorType::Bind
    }
}

/// An isolated filesystem root owned by one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub repository: String,
    pub kind: CreatorType,
    /// Copy of the repository checkout
    pub root: PathBuf,
    /// Per-step scratch directories, indexed by 0-based step
    pub scratch: Vec<PathBuf>,
    /// Everything under this directory belongs to the workspace
    pub base: PathBuf,
}

impl Workspace {
    /// Directory a step runs in for the given workspace path
    pub fn dir(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }
}

/// Creates and releases workspaces
pub trait WorkspaceCreator: Send + Sync {
    fn kind(&self) -> CreatorType;

    fn create(&self, repo: &Repository, steps: &[Step]) -> Result<Workspace>;

    /// Release a workspace. Releasing twice is a no-op.
    fn release(&self, workspace: &Workspace) -> Result<()>;
}

/// Creates workspaces as directories below a base directory
#[derive(Debug)]
pub struct DirWorkspaceCreator {
    base_dir: PathBuf,
    kind: CreatorType,
    retain: bool,
    counter: AtomicU64,
}

impl DirWorkspaceCreator {
    pub fn new(base_dir: PathBuf, kind: CreatorType) -> Self {
        Self {
            base_dir,
            kind,
            retain: false,
            counter: AtomicU64::new(0),
        }
    }

    /// Keep workspace directories on disk after release
    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Build a workspace under a fresh base directory. A partially built
    /// base is removed before the error is returned.
    fn allocate(&self, repo: &Repository, steps: &[Step]) -> std::io::Result<Workspace> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let base = self
            .base_dir
            .join(format!("{}-{}-{}", repo.slug(), std::process::id(), n));

        self.populate(repo, steps, &base).inspect_err(|e| {
            debug!("Discarding partial workspace {}: {}", base.display(), e);
            if let Err(cleanup) = fs::remove_dir_all(&base) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", base.display(), cleanup);
                }
            }
        })
    }

    fn populate(&self, repo: &Repository, steps: &[Step], base: &Path) -> std::io::Result<Workspace> {
        let (root, scratch_root) = match self.kind {
            CreatorType::Volume => (base.join("volume/workspace"), base.join("volume/scratch")),
            CreatorType::Bind => (base.join("checkout"), base.join("scratch")),
        };

        fs::create_dir_all(&root)?;
        copy_tree(&repo.checkout, &root)?;

        let mut scratch = Vec::with_capacity(steps.len());
        for i in 0..steps.len() {
            let dir = scratch_root.join(format!("step-{}", i + 1));
            fs::create_dir_all(&dir)?;
            scratch.push(dir);
        }

        Ok(Workspace {
            repository: repo.name.clone(),
            kind: self.kind,
            root,
            scratch,
            base: base.to_path_buf(),
        })
    }
}

impl WorkspaceCreator for DirWorkspaceCreator {
    fn kind(&self) -> CreatorType {
        self.kind
    }

    fn create(&self, repo: &Repository, steps: &[Step]) -> Result<Workspace> {
        let workspace = self.allocate(repo, steps).map_err(|e| Error::Workspace {
            repository: repo.name.clone(),
            message: e.to_string(),
        })?;
        debug!(
            "Created {} workspace for {} at {}",
            self.kind,
            repo.name,
            workspace.base.display()
        );
        Ok(workspace)
    }

    fn release(&self, workspace: &Workspace) -> Result<()> {
        if self.retain {
            info!(
                "Keeping workspace for {} at {}",
                workspace.repository,
                workspace.base.display()
            );
            return Ok(());
        }
        if !workspace.base.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&workspace.base).map_err(|e| Error::WorkspaceCleanup {
            repository: workspace.repository.clone(),
            path: workspace.base.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Copy a checkout, skipping `.git`
fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    let walker = WalkDir::new(from)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(std::io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Scoped ownership of a workspace
pub struct WorkspaceGuard<'a> {
    creator: &'a dyn WorkspaceCreator,
    workspace: Option<Workspace>,
}

impl<'a> WorkspaceGuard<'a> {
    /// Create a workspace and take ownership of it
    pub fn acquire(
        creator: &'a dyn WorkspaceCreator,
        repo: &Repository,
        steps: &[Step],
    ) -> Result<Self> {
        let workspace = creator.create(repo, steps)?;
        Ok(Self {
            creator,
            workspace: Some(workspace),
        })
    }

    pub fn workspace(&self) -> &Workspace {
        // Only `release` takes the workspace, and it consumes the guard.
        self.workspace
            .as_ref()
            .expect("workspace is present until released")
    }

    /// Release now, returning any cleanup error
    pub fn release(mut self) -> Result<()> {
        match self.workspace.take() {
            Some(workspace) => self.creator.release(&workspace),
            None => Ok(()),
        }
    }
}

impl Drop for WorkspaceGuard<'_> {
    fn drop(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            if let Err(e) = self.creator.release(&workspace) {
                error!("{}", e);
            }
        }
    }
}
