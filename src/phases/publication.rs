//! Phase 4: Publication
//!
//! Builds changeset specs from successful outcomes and hands them to the
//! uploader.

use log::error;

use crate::batch_spec::BatchSpec;
use crate::changeset::{self, ChangesetSpec};
use crate::error::Result;
use crate::task::TaskOutcome;
use crate::ui::ExecUi;
use crate::upload::{upload_all, BatchSpecRef, ChangesetSpecId, Uploader};

pub fn build_changeset_specs(outcomes: &[TaskOutcome], spec: &BatchSpec) -> Result<Vec<ChangesetSpec>> {
    changeset::build_all(outcomes, spec)
}

/// Upload every spec. Each upload is attempted; the first failure is
/// returned once all have finished.
pub fn upload_changeset_specs(
    uploader: &dyn Uploader,
    specs: &[ChangesetSpec],
    ui: &dyn ExecUi,
) -> Result<Vec<ChangesetSpecId>> {
    ui.uploading_changeset_specs(specs.len());
    let mut report = upload_all(uploader, specs, |done, total| {
        ui.uploading_changeset_specs_progress(done, total)
    });

    if !report.errors.is_empty() {
        for e in &report.errors[1..] {
            error!("{}", e);
        }
        return Err(report.errors.swap_remove(0));
    }

    ui.uploading_changeset_specs_success(&report.ids);
    Ok(report.ids)
}

pub fn create_batch_spec(
    uploader: &dyn Uploader,
    namespace: &str,
    spec: &BatchSpec,
    ids: &[ChangesetSpecId],
    ui: &dyn ExecUi,
) -> Result<BatchSpecRef> {
    ui.creating_batch_spec();
    match uploader.create_batch_spec(namespace, spec, ids) {
        Ok(created) => {
            ui.creating_batch_spec_success();
            ui.preview_batch_spec(&created.preview_url);
            Ok(created)
        }
        Err(e) => {
            ui.creating_batch_spec_error(&e);
            Err(e)
        }
    }
}

pub fn apply_batch_spec(uploader: &dyn Uploader, batch_spec: &BatchSpecRef, ui: &dyn ExecUi) -> Result<String> {
    ui.applying_batch_spec();
    let url = uploader.apply_batch_spec(batch_spec)?;
    ui.applying_batch_spec_success(&url);
    Ok(url)
}
