//! The step handlers of the synchronization story.
//!
//! One function per step, grouped by workflow phase:
//! - [`connect`]: credential discovery, provider choice, OAuth hand-off
//! - [`remote`]: token refresh, remote existence check, download
//! - [`unlock`]: transfer code collection and decryption
//! - [`finish`]: lineage comparison, merge, persistence, terminal
//!
//! A handler returns `Err` for anything exceptional; `run_step` converts
//! that into a failed [`StepResult`], so the orchestrator remains the
//! only place deciding how errors surface.

mod connect;
mod finish;
mod remote;
mod unlock;

use std::sync::Arc;

use cloud_client::{CloudStorageClient, Credentials};

use crate::context::StoryContext;
use crate::error::StoryError;
use crate::orchestrator::RunGuard;
use crate::session::Session;
use crate::step::{Step, StepResult};

/// Dispatch one step.
pub async fn run_step(
    step: Step,
    context: &StoryContext,
    session: &mut Session,
    guard: &RunGuard,
) -> StepResult {
    let result = match step {
        Step::IsCloudServiceSet => connect::is_cloud_service_set(context, session).await,
        Step::ShowFirstTimeDialog => connect::show_first_time_dialog(context).await,
        Step::ShowCloudStorageChoice => connect::show_cloud_storage_choice(context, session).await,
        Step::ShowCloudStorageAccount => {
            connect::show_cloud_storage_account(context, session).await
        }
        Step::HandleOAuthRedirect => connect::handle_oauth_redirect(context, session).await,
        Step::ExistsCloudRepository => remote::exists_cloud_repository(context, session).await,
        Step::DownloadCloudRepository => remote::download_cloud_repository(context, session).await,
        Step::ExistsTransferCode => unlock::exists_transfer_code(context).await,
        Step::ShowTransferCode => unlock::show_transfer_code(context, session).await,
        Step::DecryptCloudRepository => unlock::decrypt_cloud_repository(context, session).await,
        Step::IsSameRepository => finish::is_same_repository(context, session).await,
        Step::ShowMergeChoice => finish::show_merge_choice(context).await,
        Step::StoreMergedRepositoryAndQuit => {
            finish::store_merged_repository_and_quit(context, session, guard).await
        }
        Step::StoreLocalRepositoryToCloudAndQuit => {
            finish::store_local_repository_to_cloud_and_quit(context, session, guard).await
        }
        Step::StoreCloudRepositoryToDeviceAndQuit => {
            finish::store_cloud_repository_to_device_and_quit(context, session, guard).await
        }
        Step::StopAndShowRepository => finish::stop_and_show_repository(context, session).await,
    };

    result.unwrap_or_else(StepResult::Failed)
}

type HandlerResult = std::result::Result<StepResult, StoryError>;

/// Look up the client for a storage id.
fn client_for(
    context: &StoryContext,
    storage_id: &str,
) -> Result<Arc<dyn CloudStorageClient>, StoryError> {
    context
        .clients
        .client_for(storage_id)
        .ok_or_else(|| StoryError::UnknownStorage(storage_id.to_string()))
}

/// The credentials of this run: picked up earlier in the session, or
/// from settings when the run entered mid-chain (forced re-sync).
fn current_credentials(
    context: &StoryContext,
    session: &Session,
) -> Result<Credentials, StoryError> {
    if let Some(credentials) = &session.credentials {
        return Ok(credentials.clone());
    }
    context
        .settings
        .snapshot()
        .credentials
        .ok_or(StoryError::MissingSessionData("credentials"))
}
