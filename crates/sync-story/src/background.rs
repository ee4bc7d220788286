//! Background synchronization entry points.
//!
//! The host scheduler invokes these at app startup and shutdown with no
//! GUI attached. They build their own silent run, never let an error
//! escape to the scheduler, and report only a before/after content
//! fingerprint, never UI state.

use serde::Serialize;
use tracing::{info, warn};

use sync_core::fingerprint;

use crate::context::{StoryContext, StoryMode};
use crate::orchestrator::{Orchestrator, SyncRuns};
use crate::settings::AutoSyncMode;

/// What a background run reports back to whoever scheduled it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundReport {
    pub succeeded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint_before: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint_after: Option<String>,
}

impl BackgroundReport {
    /// Whether the local repository content changed during the run.
    pub fn changed(&self) -> bool {
        self.fingerprint_before != self.fingerprint_after
    }
}

/// Synchronize silently when the app starts.
pub async fn synchronize_at_startup(context: StoryContext, runs: &SyncRuns) -> BackgroundReport {
    info!("background synchronization at startup");
    run_silently(context, runs).await
}

/// Synchronize silently when the app shuts down.
pub async fn synchronize_at_shutdown(context: StoryContext, runs: &SyncRuns) -> BackgroundReport {
    info!("background synchronization at shutdown");
    run_silently(context, runs).await
}

async fn run_silently(mut context: StoryContext, runs: &SyncRuns) -> BackgroundReport {
    context.mode = StoryMode::Silent;

    let before = local_fingerprint(&context).await;

    if context.settings.snapshot().auto_sync_mode == AutoSyncMode::Never {
        info!("auto sync disabled, skipping");
        return BackgroundReport {
            succeeded: true,
            fingerprint_before: before.clone(),
            fingerprint_after: before,
        };
    }

    let outcome = Orchestrator::new(context.clone(), runs).run().await;
    let succeeded = outcome.is_finished();
    if !succeeded {
        // The scheduler only needs a yes/no; details went to the log.
        warn!(?outcome, "background synchronization did not finish");
    }

    context.repository_storage.invalidate_cache();
    let after = local_fingerprint(&context).await;

    BackgroundReport {
        succeeded,
        fingerprint_before: before,
        fingerprint_after: after,
    }
}

async fn local_fingerprint(context: &StoryContext) -> Option<String> {
    match context.repository_storage.load_or_default().await {
        Ok(repository) => Some(fingerprint(&repository)),
        Err(e) => {
            warn!("could not fingerprint local repository: {e}");
            None
        }
    }
}
