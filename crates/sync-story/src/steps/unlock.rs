//! Steps that turn the downloaded blob into a repository.

use sync_core::crypto::{CryptoError, Envelope};
use sync_core::{Repository, transfer_code};
use tracing::{debug, info};

use crate::context::StoryContext;
use crate::error::StoryError;
use crate::session::Session;
use crate::step::{Step, StepResult};

use super::HandlerResult;

/// Do we know a transfer code for this blob?
pub(super) async fn exists_transfer_code(context: &StoryContext) -> HandlerResult {
    if context.settings.snapshot().transfer_code.is_some() {
        Ok(StepResult::next(Step::DecryptCloudRepository))
    } else {
        Ok(StepResult::next(Step::ShowTransferCode))
    }
}

/// Ask the user for the transfer code shown on their other device.
pub(super) async fn show_transfer_code(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    match context.ui.prompt_transfer_code().await {
        Some(input) if transfer_code::is_valid(&input) => {
            session.user_entered_code = Some(transfer_code::normalize(&input));
            Ok(StepResult::next(Step::DecryptCloudRepository))
        }
        Some(_) => Ok(StepResult::await_user(
            "This is not a valid transfer code, please compare it with the code on your other device.",
        )),
        None => Ok(StepResult::next(Step::StopAndShowRepository)),
    }
}

/// Try the candidate codes against the downloaded envelope.
///
/// The envelope is parsed exactly once: a malformed envelope means
/// corruption, aborts the whole candidate list and surfaces fatally. An
/// authentication failure is just a wrong code and moves on to the next
/// candidate.
pub(super) async fn decrypt_cloud_repository(
    context: &StoryContext,
    session: &mut Session,
) -> HandlerResult {
    let blob = session
        .downloaded
        .as_deref()
        .ok_or(StoryError::MissingSessionData("downloaded blob"))?;
    let envelope = Envelope::parse(blob)?;

    // A code the user typed this run is tried alone; otherwise the
    // stored code first, then the history, most recently used first.
    let candidates = match &session.user_entered_code {
        Some(code) => vec![code.clone()],
        None => context.settings.snapshot().transfer_code_candidates(),
    };
    if candidates.is_empty() {
        return Ok(StepResult::next(Step::ShowTransferCode));
    }

    let mut unlocked = None;
    for candidate in &candidates {
        match envelope.open(candidate) {
            Ok(bytes) => {
                unlocked = Some((candidate.clone(), bytes));
                break;
            }
            Err(CryptoError::WrongTransferCode) => {
                debug!("candidate code did not match, trying next");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let Some((code, bytes)) = unlocked else {
        session.user_entered_code = None;
        return Ok(StepResult::next_with_message(
            Step::ShowTransferCode,
            "The transfer code did not match, please compare it with the code on your other device.",
        ));
    };

    // Anything that decrypts but does not parse is corruption; a
    // document from a newer app version is equally fatal. Both bypass
    // the retry loop via the error path.
    let repository = Repository::from_json(&bytes)?;

    // Promote the successful code if it is not the stored one, so a
    // code rotated on another device heals itself here.
    if context.settings.snapshot().transfer_code.as_deref() != Some(code.as_str()) {
        info!("adopting transfer code that unlocked the repository");
        context
            .settings
            .update(&mut |s| s.adopt_transfer_code(code.clone()))
            .map_err(|e| StoryError::Settings(e.to_string()))?;
    }

    session.remote_repository = Some(repository);
    Ok(StepResult::next(Step::IsSameRepository))
}
