//! The story orchestrator: runs the step chain of one synchronization.
//!
//! A run walks the step graph from an entry point to a terminal step,
//! strictly sequentially. The orchestrator is the single place deciding
//! how feedback and errors surface: interactive runs show them through
//! the UI gateway, silent runs log and swallow them.
//!
//! At most one run per process is "current". Starting a new run bumps a
//! shared generation counter, superseding the old one: in-flight I/O of
//! a superseded run is not aborted, but its results are discarded before
//! any persist or upload (checked by generation, in the store steps).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::context::{StoryContext, StoryMode};
use crate::error::StoryError;
use crate::session::Session;
use crate::step::{Step, StepResult};
use crate::steps;

/// How a run ended.
#[derive(Debug)]
pub enum StoryOutcome {
    /// The terminal step was reached.
    Finished,

    /// Interactive run paused: the user must act (a dialog is open, or
    /// feedback asks for corrected input).
    AwaitingUser,

    /// Silent run stopped because a step would have required user
    /// input. Non-fatal; the next interactive run picks it up.
    NeedsAttention,

    /// The run handed control to the external browser and waits for
    /// [`Orchestrator::resume_after_redirect`].
    AwaitingOAuthRedirect,

    /// A newer run took over; nothing was persisted.
    Superseded,

    /// A fatal error ended the run.
    Failed(StoryError),
}

impl StoryOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, StoryOutcome::Finished)
    }
}

/// Process-wide run bookkeeping: hands out generations so a newer run
/// supersedes every older one.
#[derive(Clone, Default)]
pub struct SyncRuns {
    generation: Arc<AtomicU64>,
}

impl SyncRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new run, superseding any current one.
    pub fn begin(&self) -> RunGuard {
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RunGuard {
            generation: Arc::clone(&self.generation),
            id,
        }
    }
}

/// Identity of one run, used to detect supersession.
pub struct RunGuard {
    generation: Arc<AtomicU64>,
    id: u64,
}

impl RunGuard {
    /// Whether this run is still the current one.
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.id
    }
}

/// One synchronization run.
pub struct Orchestrator {
    context: StoryContext,
    session: Session,
    guard: RunGuard,
    trace: Vec<Step>,
}

impl Orchestrator {
    /// Build a run from its context; the run immediately becomes the
    /// current one, superseding any other.
    pub fn new(context: StoryContext, runs: &SyncRuns) -> Self {
        Self {
            context,
            session: Session::default(),
            guard: runs.begin(),
            trace: Vec::new(),
        }
    }

    /// Normal synchronization, starting at credential discovery.
    pub async fn run(&mut self) -> StoryOutcome {
        self.run_from(Step::IsCloudServiceSet).await
    }

    /// Forced re-synchronization with known credentials.
    pub async fn run_forced(&mut self) -> StoryOutcome {
        self.run_from(Step::ExistsCloudRepository).await
    }

    /// Resume after the platform delivered an OAuth redirect.
    ///
    /// This is the re-entry half of the browser hand-off; the pending
    /// authorization record is read back from settings, so it works in
    /// a fresh process as well.
    pub async fn resume_after_redirect(&mut self, redirect_url: &str) -> StoryOutcome {
        self.session.oauth_redirect_url = Some(redirect_url.to_string());
        self.run_from(Step::HandleOAuthRedirect).await
    }

    /// The steps this run has executed, in order.
    pub fn visited_steps(&self) -> &[Step] {
        &self.trace
    }

    async fn run_from(&mut self, entry: Step) -> StoryOutcome {
        let mut step = entry;

        loop {
            if !self.guard.is_current() {
                info!(?step, "run superseded, stopping");
                return StoryOutcome::Superseded;
            }

            if self.context.mode == StoryMode::Silent && step.requires_user_input() {
                info!(?step, "silent run stopped, user attention needed");
                return StoryOutcome::NeedsAttention;
            }

            debug!(?step, "running step");
            self.trace.push(step);

            let result = steps::run_step(step, &self.context, &mut self.session, &self.guard).await;

            match result {
                StepResult::Continue { next, message } => {
                    if let Some(message) = message {
                        self.show_feedback(&message).await;
                    }
                    step = next;
                }
                StepResult::AwaitUser { message } => {
                    if let Some(message) = message {
                        self.show_feedback(&message).await;
                    }
                    return match self.context.mode {
                        StoryMode::Interactive => StoryOutcome::AwaitingUser,
                        StoryMode::Silent => StoryOutcome::NeedsAttention,
                    };
                }
                StepResult::AwaitRedirect => {
                    info!("authorization handed to external browser");
                    return StoryOutcome::AwaitingOAuthRedirect;
                }
                StepResult::Finished => {
                    info!("synchronization run finished");
                    return StoryOutcome::Finished;
                }
                StepResult::Failed(StoryError::Superseded) => {
                    info!(?step, "run superseded mid-step, result discarded");
                    return StoryOutcome::Superseded;
                }
                StepResult::Failed(error) => {
                    warn!(?step, %error, "step failed");
                    self.show_feedback(&error.to_string()).await;

                    if error.is_fatal() {
                        return StoryOutcome::Failed(error);
                    }
                    // Non-fatal: the workflow itself is the retry
                    // mechanism; the run stays where it is.
                    return match self.context.mode {
                        StoryMode::Interactive => StoryOutcome::AwaitingUser,
                        StoryMode::Silent => StoryOutcome::NeedsAttention,
                    };
                }
            }
        }
    }

    async fn show_feedback(&self, message: &str) {
        match self.context.mode {
            StoryMode::Interactive => self.context.ui.show_feedback(message).await,
            StoryMode::Silent => debug!(message, "feedback suppressed in silent mode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_supersedes_old() {
        let runs = SyncRuns::new();
        let first = runs.begin();
        assert!(first.is_current());

        let second = runs.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
    }
}
