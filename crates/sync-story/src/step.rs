//! The closed set of workflow steps and their result type.
//!
//! Every step of the synchronization story is one variant of [`Step`];
//! dispatch is a single match in [`crate::steps::run_step`]. A step
//! communicates outward only through its [`StepResult`]; it never
//! drives the orchestrator directly.

use crate::error::StoryError;

/// One step of the synchronization story.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    IsCloudServiceSet,
    ShowFirstTimeDialog,
    ShowCloudStorageChoice,
    ShowCloudStorageAccount,
    HandleOAuthRedirect,
    ExistsCloudRepository,
    DownloadCloudRepository,
    ExistsTransferCode,
    ShowTransferCode,
    DecryptCloudRepository,
    IsSameRepository,
    ShowMergeChoice,
    StoreMergedRepositoryAndQuit,
    StoreLocalRepositoryToCloudAndQuit,
    StoreCloudRepositoryToDeviceAndQuit,
    StopAndShowRepository,
}

impl Step {
    /// Steps that cannot proceed without the user. A silent run ends
    /// with a "needs attention" outcome instead of entering one.
    pub fn requires_user_input(&self) -> bool {
        matches!(
            self,
            Step::ShowFirstTimeDialog
                | Step::ShowCloudStorageChoice
                | Step::ShowCloudStorageAccount
                | Step::ShowTransferCode
                | Step::ShowMergeChoice
        )
    }
}

/// What a step tells the orchestrator to do next.
#[derive(Debug)]
pub enum StepResult {
    /// Run the given step next, optionally surfacing feedback first.
    Continue {
        next: Step,
        message: Option<String>,
    },

    /// Stay where we are; the user must act before sync can continue.
    AwaitUser { message: Option<String> },

    /// Control was handed to the external browser. The run resumes at
    /// `HandleOAuthRedirect` when the platform delivers the redirect.
    AwaitRedirect,

    /// The terminal step completed and the session was cleared.
    Finished,

    /// The step failed. The orchestrator decides whether the error is
    /// surfaced (interactive) or swallowed (silent), and whether it is
    /// fatal.
    Failed(StoryError),
}

impl StepResult {
    pub fn next(step: Step) -> Self {
        StepResult::Continue {
            next: step,
            message: None,
        }
    }

    pub fn next_with_message(step: Step, message: impl Into<String>) -> Self {
        StepResult::Continue {
            next: step,
            message: Some(message.into()),
        }
    }

    pub fn await_user(message: impl Into<String>) -> Self {
        StepResult::AwaitUser {
            message: Some(message.into()),
        }
    }
}
