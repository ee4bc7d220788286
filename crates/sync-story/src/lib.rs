//! sync-story: The synchronization workflow.
//!
//! A synchronization is a "story": a directed chain of steps walking
//! from credential discovery through download, decryption and merge to
//! persistence. The orchestrator executes the chain sequentially in one
//! of two modes: interactive (may open dialogs through the UI gateway)
//! or silent (background; any step needing input ends the run instead).
//!
//! This crate also owns the durable state around a run: the settings
//! file (transfer code, credentials, pending OAuth authorization) and
//! the atomic local persistence of the repository snapshot.

mod atomic;
pub mod background;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod settings;
pub mod step;
pub mod steps;
pub mod storage;

pub use background::{BackgroundReport, synchronize_at_shutdown, synchronize_at_startup};
pub use context::{CloudClientFactory, MergeChoice, StaticClientFactory, StoryContext, StoryMode, UiGateway};
pub use error::StoryError;
pub use orchestrator::{Orchestrator, RunGuard, StoryOutcome, SyncRuns};
pub use session::Session;
pub use settings::{
    AutoSyncMode, FileSettings, MemorySettings, PendingAuthorization, Settings, SettingsStore,
};
pub use step::{Step, StepResult};
pub use storage::{FileRepositoryStorage, MemoryRepositoryStorage, RepositoryStorage};
