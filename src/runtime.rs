//! Container runtime boundary
//!
//! The engine needs two things from a container runtime: a capability probe,
//! used once per run to pick the workspace strategy, and a way to make sure
//! every image the batch spec references is available before tasks start.
//! Pulling and building images is the runtime's business.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use rayon::prelude::*;

use crate::error::{Error, Result};

/// What the host and runtime support
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Privileged volume mounts are available
    pub privileged_volumes: bool,
}

/// Client for the container runtime. Shared by all workers.
pub trait ContainerRuntime: Send + Sync {
    /// Probe the host
    fn capabilities(&self) -> Result<Capabilities>;

    /// Make an image available locally
    fn prepare_image(&self, image: &str) -> Result<()>;
}

/// Runtime that executes steps directly on the host.
///
/// Images are accepted by name; volume support is whatever it was
/// configured with.
#[derive(Debug, Clone, Default)]
pub struct HostRuntime {
    capabilities: Capabilities,
}

impl HostRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

impl ContainerRuntime for HostRuntime {
    fn capabilities(&self) -> Result<Capabilities> {
        Ok(self.capabilities)
    }

    fn prepare_image(&self, image: &str) -> Result<()> {
        if image.trim().is_empty() {
            return Err(Error::BatchSpec {
                message: "empty container image name".to_string(),
            });
        }
        debug!("Using image {} on the host", image);
        Ok(())
    }
}

/// Prepare every image in parallel, reporting `(done, total)` after each one
pub fn prepare_images<F>(runtime: &dyn ContainerRuntime, images: &[String], progress: F) -> Result<()>
where
    F: Fn(usize, usize) + Sync,
{
    let total = images.len();
    let done = AtomicUsize::new(0);

    images.par_iter().try_for_each(|image| -> Result<()> {
        runtime.prepare_image(image)?;
        progress(done.fetch_add(1, Ordering::SeqCst) + 1, total);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_host_runtime_capabilities() {
        assert!(!HostRuntime::new().capabilities().unwrap().privileged_volumes);
        let runtime = HostRuntime::with_capabilities(Capabilities {
            privileged_volumes: true,
        });
        assert!(runtime.capabilities().unwrap().privileged_volumes);
    }

    #[test]
    fn test_prepare_images_reports_progress() {
        let images = vec!["alpine:3".to_string(), "ubuntu:22.04".to_string()];
        let seen = Mutex::new(Vec::new());
        prepare_images(&HostRuntime::new(), &images, |done, total| {
            seen.lock().unwrap().push((done, total));
        })
        .unwrap();

        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_prepare_images_fails_on_empty_name() {
        let images = vec![" ".to_string()];
        let result = prepare_images(&HostRuntime::new(), &images, |_, _| {});
        assert!(result.is_err());
    }
}
