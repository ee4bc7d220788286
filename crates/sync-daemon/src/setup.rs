//! Context assembly for the daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use cloud_client::{CloudStorageClient, Credentials, DirectoryCloud};
use sync_core::MergePolicy;
use sync_story::{
    FileRepositoryStorage, FileSettings, SettingsStore, StaticClientFactory, StoryContext,
    StoryMode,
};

use crate::headless::HeadlessUi;

/// Where the daemon keeps its state.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    /// The local plaintext repository file.
    pub notes_file: PathBuf,
    /// The settings file (transfer code, credentials, auto-sync mode).
    pub settings_file: PathBuf,
    /// The directory acting as the cloud byte bucket.
    pub cloud_dir: PathBuf,
}

/// Build a silent story context over a directory-backed cloud.
///
/// Credentials for the directory provider need no secrets, so a missing
/// credential entry is provisioned on the spot; the run would otherwise
/// stop and ask for attention the UI-less process cannot give.
pub fn build_context(paths: &DaemonPaths) -> Result<StoryContext> {
    let settings = Arc::new(FileSettings::open(paths.settings_file.clone())?);
    settings.update(&mut |s| {
        if s.credentials.is_none() {
            s.credentials = Some(Credentials::for_storage("directory"));
        }
    })?;

    Ok(StoryContext {
        mode: StoryMode::Silent,
        settings,
        repository_storage: Arc::new(FileRepositoryStorage::new(paths.notes_file.clone())),
        clients: Arc::new(StaticClientFactory::new(vec![
            Arc::new(DirectoryCloud::new(paths.cloud_dir.clone())) as Arc<dyn CloudStorageClient>,
        ])),
        ui: Arc::new(HeadlessUi),
        merge_policy: MergePolicy::default(),
    })
}
