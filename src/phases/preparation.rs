//! Phase 1: Preparation
//!
//! Everything that has to happen once per run before repositories are
//! looked at.

use crate::batch_spec::{self, BatchSpec};
use crate::error::Result;
use crate::runtime::{self, ContainerRuntime};
use crate::ui::ExecUi;
use crate::upload::Uploader;
use crate::workspace::{determine_strategy, CreatorType};

/// Parse and validate a batch spec document
pub fn parse_batch_spec(source: &str, ui: &dyn ExecUi) -> Result<BatchSpec> {
    ui.parsing_batch_spec();
    match batch_spec::parse(source) {
        Ok(spec) => {
            ui.parsing_batch_spec_success();
            Ok(spec)
        }
        Err(e) => {
            ui.parsing_batch_spec_failure(&e);
            Err(e)
        }
    }
}

pub fn resolve_namespace(uploader: &dyn Uploader, namespace: Option<&str>, ui: &dyn ExecUi) -> Result<String> {
    ui.resolving_namespace();
    let namespace = uploader.resolve_namespace(namespace)?;
    ui.resolving_namespace_success(&namespace);
    Ok(namespace)
}

/// Make sure every image the steps use is available
pub fn prepare_images(runtime: &dyn ContainerRuntime, spec: &BatchSpec, ui: &dyn ExecUi) -> Result<()> {
    ui.preparing_container_images();
    runtime::prepare_images(runtime, &spec.images(), |done, total| {
        ui.preparing_container_images_progress(done, total)
    })?;
    ui.preparing_container_images_success();
    Ok(())
}

/// Probe the runtime once and pick the workspace strategy for the run
pub fn determine_workspace_creator_type(runtime: &dyn ContainerRuntime, ui: &dyn ExecUi) -> Result<CreatorType> {
    ui.determining_workspace_creator_type();
    let kind = determine_strategy(&runtime.capabilities()?);
    ui.determining_workspace_creator_type_success(kind);
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::runtime::{Capabilities, HostRuntime};
    use crate::ui::test_support::RecordingUi;

    #[test]
    fn test_parse_batch_spec_reports_failure() {
        let ui = RecordingUi::new();
        let result = parse_batch_spec("name: x\nsteps: []\n", &ui);
        assert!(matches!(result, Err(Error::BatchSpec { .. })));
        assert_eq!(ui.names(), vec!["parsing_batch_spec"]);
    }

    #[test]
    fn test_determine_workspace_creator_type() {
        let ui = RecordingUi::new();
        let runtime = HostRuntime::with_capabilities(Capabilities {
            privileged_volumes: true,
        });
        let kind = determine_workspace_creator_type(&runtime, &ui).unwrap();
        assert_eq!(kind, CreatorType::Volume);
        assert_eq!(
            ui.events(),
            vec![
                "determining_workspace_creator_type",
                "determining_workspace_creator_type_success volume"
            ]
        );
    }
}
