//! Steps that establish which account to synchronize against.

use cloud_client::oauth::{self, OAuthError};
use cloud_client::Credentials;
use tracing::{debug, info};

use crate::context::StoryContext;
use crate::error::StoryError;
use crate::session::Session;
use crate::settings::PendingAuthorization;
use crate::step::{Step, StepResult};

use super::{HandlerResult, client_for};

/// The redirect URI registered with every OAuth2 provider.
pub const OAUTH_REDIRECT_URL: &str = "quillsync://oauth2redirect/";

/// Entry point of a normal synchronization: do we already have an
/// account?
pub(super) async fn is_cloud_service_set(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    match context.settings.snapshot().credentials {
        Some(credentials) => {
            debug!(storage = %credentials.cloud_storage_id, "stored credentials found");
            session.credentials = Some(credentials);
            Ok(StepResult::next(Step::ExistsCloudRepository))
        }
        None => Ok(StepResult::next(Step::ShowFirstTimeDialog)),
    }
}

/// Welcome dialog before the very first synchronization.
pub(super) async fn show_first_time_dialog(context: &StoryContext) -> HandlerResult {
    if context.ui.show_first_time_dialog().await {
        Ok(StepResult::next(Step::ShowCloudStorageChoice))
    } else {
        Ok(StepResult::next(Step::StopAndShowRepository))
    }
}

/// Let the user pick a storage provider.
pub(super) async fn show_cloud_storage_choice(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    let storage_ids = context.clients.storage_ids();
    match context.ui.choose_cloud_storage(&storage_ids).await {
        Some(storage_id) => {
            // Reject ids the factory does not know before going further.
            client_for(context, &storage_id)?;
            session.credentials = Some(Credentials::for_storage(storage_id));
            Ok(StepResult::next(Step::ShowCloudStorageAccount))
        }
        None => Ok(StepResult::next(Step::StopAndShowRepository)),
    }
}

/// Collect account credentials, or hand off to the external browser for
/// OAuth2 consent.
///
/// The OAuth2 path ends the run here: the pending authorization is
/// persisted (it must survive an app restart while the browser is open)
/// and the chain resumes at `HandleOAuthRedirect` when the platform
/// delivers the redirect.
pub(super) async fn show_cloud_storage_account(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    let credentials = session
        .credentials
        .clone()
        .ok_or(StoryError::MissingSessionData("credentials"))?;
    let client = client_for(context, &credentials.cloud_storage_id)?;

    if let Some(oauth2) = client.oauth2() {
        let state = oauth::generate_state();
        let code_verifier = oauth::generate_code_verifier();
        let url = oauth2.build_authorization_request_url(&state, &code_verifier);

        let pending = PendingAuthorization {
            cloud_storage_id: credentials.cloud_storage_id.clone(),
            state,
            code_verifier,
            redirect_url: OAUTH_REDIRECT_URL.to_string(),
        };
        context
            .settings
            .update(&mut |s| s.pending_authorization = Some(pending.clone()))
            .map_err(|e| StoryError::Settings(e.to_string()))?;

        info!(storage = %credentials.cloud_storage_id, "opening browser for authorization");
        context.ui.open_authorization_url(&url).await;
        return Ok(StepResult::AwaitRedirect);
    }

    match context
        .ui
        .prompt_credentials(&credentials.cloud_storage_id, &client.requirements())
        .await
    {
        Some(entered) => {
            entered.validate(&client.requirements())?;
            session.credentials = Some(entered.clone());
            context
                .settings
                .update(&mut |s| s.credentials = Some(entered.clone()))
                .map_err(|e| StoryError::Settings(e.to_string()))?;
            Ok(StepResult::next(Step::ExistsCloudRepository))
        }
        None => Ok(StepResult::next(Step::StopAndShowRepository)),
    }
}

/// Exchange the authorization code carried by the redirect for a token.
///
/// Entered from outside the normal chain, by the platform callback that
/// receives the browser redirect.
pub(super) async fn handle_oauth_redirect(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    let redirect_url = session
        .oauth_redirect_url
        .take()
        .ok_or(StoryError::MissingSessionData("oauth redirect url"))?;
    let pending = context
        .settings
        .snapshot()
        .pending_authorization
        .ok_or(StoryError::MissingSessionData("pending authorization"))?;

    let client = client_for(context, &pending.cloud_storage_id)?;
    let oauth2 = client
        .oauth2()
        .ok_or_else(|| StoryError::NotOAuth2(pending.cloud_storage_id.clone()))?;

    match oauth2
        .fetch_token(&redirect_url, &pending.state, &pending.code_verifier)
        .await
    {
        Ok(token) => {
            let mut credentials = Credentials::for_storage(pending.cloud_storage_id.clone());
            credentials.token = Some(token);
            session.credentials = Some(credentials.clone());
            context
                .settings
                .update(&mut |s| {
                    s.credentials = Some(credentials.clone());
                    s.pending_authorization = None;
                })
                .map_err(|e| StoryError::Settings(e.to_string()))?;
            Ok(StepResult::next(Step::ExistsCloudRepository))
        }
        Err(OAuthError::Rejected(reason)) => {
            info!(%reason, "authorization rejected by user");
            context
                .settings
                .update(&mut |s| s.pending_authorization = None)
                .map_err(|e| StoryError::Settings(e.to_string()))?;
            Ok(StepResult::next(Step::StopAndShowRepository))
        }
        Err(e) => Err(e.into()),
    }
}
