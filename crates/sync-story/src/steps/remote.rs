//! Steps that talk to the remote byte bucket.

use chrono::Utc;
use cloud_client::oauth::OAuthError;
use cloud_client::REPOSITORY_FILE_NAME;
use tracing::{debug, info};

use crate::context::StoryContext;
use crate::error::StoryError;
use crate::session::Session;
use crate::step::{Step, StepResult};

use super::{HandlerResult, client_for, current_credentials};

/// Refresh the OAuth token if it is near expiry, then check whether the
/// account already holds a repository file.
pub(super) async fn exists_cloud_repository(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    let mut credentials = current_credentials(context, session)?;
    let client = client_for(context, &credentials.cloud_storage_id)?;

    if let (Some(token), Some(oauth2)) = (credentials.token.clone(), client.oauth2()) {
        if token.needs_refresh(Utc::now()) {
            debug!("access token near expiry, refreshing");
            match oauth2.refresh_token(&token).await {
                Ok(refreshed) => {
                    credentials.token = Some(refreshed);
                    context
                        .settings
                        .update(&mut |s| s.credentials = Some(credentials.clone()))
                        .map_err(|e| StoryError::Settings(e.to_string()))?;
                }
                Err(OAuthError::RefreshTokenExpired) => {
                    info!("refresh token expired, authorization must be repeated");
                    return Ok(StepResult::next_with_message(
                        Step::ShowCloudStorageAccount,
                        "The cloud sign-in has expired, please sign in again.",
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    session.credentials = Some(credentials.clone());

    if client.exists_file(REPOSITORY_FILE_NAME, &credentials).await? {
        Ok(StepResult::next(Step::DownloadCloudRepository))
    } else {
        // Nothing in the cloud yet: publish the local repository.
        Ok(StepResult::next(Step::StoreLocalRepositoryToCloudAndQuit))
    }
}

/// Fetch the remote blob, once per run.
pub(super) async fn download_cloud_repository(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    if session.downloaded.is_none() {
        let credentials = current_credentials(context, session)?;
        let client = client_for(context, &credentials.cloud_storage_id)?;
        let bytes = client
            .download_file(REPOSITORY_FILE_NAME, &credentials)
            .await?;
        debug!(bytes = bytes.len(), "downloaded cloud repository");
        session.downloaded = Some(bytes);
    } else {
        debug!("using cached download");
    }
    Ok(StepResult::next(Step::ExistsTransferCode))
}
