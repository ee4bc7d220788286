//! Terminal steps: reconcile, persist, upload, and wind down the run.

use chrono::Utc;
use cloud_client::REPOSITORY_FILE_NAME;
use sync_core::{crypto, fingerprint, merge, transfer_code};
use tracing::{debug, info};

use crate::context::{MergeChoice, StoryContext, StoryMode};
use crate::error::StoryError;
use crate::orchestrator::RunGuard;
use crate::session::Session;
use crate::step::{Step, StepResult};

use super::{HandlerResult, client_for, current_credentials};

/// Same lineage merges silently; unrelated repositories need the user
/// to pick a strategy.
pub(super) async fn is_same_repository(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    let remote = session
        .remote_repository
        .as_ref()
        .ok_or(StoryError::MissingSessionData("remote repository"))?;
    let local = context.repository_storage.load_or_default().await?;

    if local.id == remote.id {
        Ok(StepResult::next(Step::StoreMergedRepositoryAndQuit))
    } else {
        info!("cloud repository has a different lineage");
        Ok(StepResult::next(Step::ShowMergeChoice))
    }
}

/// Ask how to combine two unrelated repositories.
pub(super) async fn show_merge_choice(context: &StoryContext) -> HandlerResult {
    match context.ui.choose_merge_strategy().await {
        Some(MergeChoice::Merge) => Ok(StepResult::next(Step::StoreMergedRepositoryAndQuit)),
        Some(MergeChoice::KeepLocal) => {
            Ok(StepResult::next(Step::StoreLocalRepositoryToCloudAndQuit))
        }
        Some(MergeChoice::KeepCloud) => {
            Ok(StepResult::next(Step::StoreCloudRepositoryToDeviceAndQuit))
        }
        None => Ok(StepResult::next(Step::StopAndShowRepository)),
    }
}

/// Merge local and remote; persist and upload only the sides that
/// actually changed.
pub(super) async fn store_merged_repository_and_quit(
    context: &StoryContext,
    session: &mut Session,
    guard: &RunGuard,
) -> HandlerResult {
    let remote = session
        .remote_repository
        .clone()
        .ok_or(StoryError::MissingSessionData("remote repository"))?;
    let local = context.repository_storage.load_or_default().await?;

    let merged = merge(&local, &remote, Utc::now(), &context.merge_policy);
    let merged_fingerprint = fingerprint(&merged);

    if !guard.is_current() {
        return Err(StoryError::Superseded);
    }

    if merged_fingerprint != fingerprint(&local) {
        debug!("merged repository differs locally, saving");
        if !context.repository_storage.try_save(&merged).await {
            return Err(StoryError::SaveFailed);
        }
    }

    if merged_fingerprint != fingerprint(&remote) {
        debug!("merged repository differs from cloud, uploading");
        let code = context
            .settings
            .snapshot()
            .transfer_code
            .ok_or(StoryError::MissingSessionData("transfer code"))?;
        let blob = crypto::encrypt(&merged.to_json(), &code)?;

        let credentials = current_credentials(context, session)?;
        let client = client_for(context, &credentials.cloud_storage_id)?;
        client
            .upload_file(REPOSITORY_FILE_NAME, &blob, &credentials)
            .await?;
    }

    Ok(StepResult::next(Step::StopAndShowRepository))
}

/// Publish the local repository to the cloud, generating a transfer
/// code first if this device never had one.
pub(super) async fn store_local_repository_to_cloud_and_quit(
    context: &StoryContext,
    session: &mut Session,
    guard: &RunGuard,
) -> HandlerResult {
    let local = context.repository_storage.load_or_default().await?;

    let code = match context.settings.snapshot().transfer_code {
        Some(code) => code,
        None => {
            let code = transfer_code::generate();
            info!("generated a new transfer code");
            context
                .settings
                .update(&mut |s| s.adopt_transfer_code(code.clone()))
                .map_err(|e| StoryError::Settings(e.to_string()))?;
            code
        }
    };

    let blob = crypto::encrypt(&local.to_json(), &code)?;

    if !guard.is_current() {
        return Err(StoryError::Superseded);
    }

    let credentials = current_credentials(context, session)?;
    let client = client_for(context, &credentials.cloud_storage_id)?;
    client
        .upload_file(REPOSITORY_FILE_NAME, &blob, &credentials)
        .await?;

    Ok(StepResult::next(Step::StopAndShowRepository))
}

/// Overwrite the device with the cloud repository.
pub(super) async fn store_cloud_repository_to_device_and_quit(
    context: &StoryContext,
    session: &mut Session,
    guard: &RunGuard,
) -> HandlerResult {
    let remote = session
        .remote_repository
        .clone()
        .ok_or(StoryError::MissingSessionData("remote repository"))?;

    if !guard.is_current() {
        return Err(StoryError::Superseded);
    }

    if !context.repository_storage.try_save(&remote).await {
        return Err(StoryError::SaveFailed);
    }

    Ok(StepResult::next(Step::StopAndShowRepository))
}

/// Terminal step: clear the session and return to the note list.
pub(super) async fn stop_and_show_repository(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    session.clear();
    if context.mode == StoryMode::Interactive {
        context.ui.show_repository().await;
    }
    Ok(StepResult::Finished)
}
