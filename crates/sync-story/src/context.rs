//! The execution context a run is built from.
//!
//! Every collaborator a step may touch is carried explicitly in
//! [`StoryContext`] and injected at construction time. There is no
//! ambient registry to pull dependencies from; a test assembles the
//! context from fakes the same way the application assembles it from
//! real implementations.

use std::sync::Arc;

use async_trait::async_trait;
use cloud_client::{CloudStorageClient, CredentialRequirements, Credentials};
use sync_core::MergePolicy;

use crate::settings::SettingsStore;
use crate::storage::RepositoryStorage;

/// How a run is allowed to interact with the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryMode {
    /// May navigate the UI and show blocking dialogs.
    Interactive,
    /// Must never open UI; steps that need input end the run instead.
    Silent,
}

/// The strategies a user can pick when two unrelated repositories meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeChoice {
    /// Combine both collections.
    Merge,
    /// Keep the device's notes, overwrite the cloud.
    KeepLocal,
    /// Keep the cloud's notes, overwrite the device.
    KeepCloud,
}

/// Resolves a storage id to the client for that provider.
pub trait CloudClientFactory: Send + Sync {
    fn storage_ids(&self) -> Vec<String>;

    fn client_for(&self, storage_id: &str) -> Option<Arc<dyn CloudStorageClient>>;
}

/// The view layer, as the workflow sees it.
///
/// Interactive steps ask questions through this trait and get answers
/// back; `None` means the user dismissed the dialog. Silent runs never
/// call any of these methods.
#[async_trait]
pub trait UiGateway: Send + Sync {
    /// Welcome dialog on first-time sync. Returns whether to continue.
    async fn show_first_time_dialog(&self) -> bool;

    async fn choose_cloud_storage(&self, storage_ids: &[String]) -> Option<String>;

    async fn prompt_credentials(
        &self,
        storage_id: &str,
        requirements: &CredentialRequirements,
    ) -> Option<Credentials>;

    /// Hand the authorization URL to the external browser.
    async fn open_authorization_url(&self, url: &str);

    async fn prompt_transfer_code(&self) -> Option<String>;

    async fn choose_merge_strategy(&self) -> Option<MergeChoice>;

    async fn show_feedback(&self, message: &str);

    /// Navigate back to the note list after a finished run.
    async fn show_repository(&self);
}

/// Everything one synchronization run needs, injected explicitly.
#[derive(Clone)]
pub struct StoryContext {
    pub mode: StoryMode,
    pub settings: Arc<dyn SettingsStore>,
    pub repository_storage: Arc<dyn RepositoryStorage>,
    pub clients: Arc<dyn CloudClientFactory>,
    pub ui: Arc<dyn UiGateway>,
    pub merge_policy: MergePolicy,
}

/// A factory over a fixed set of pre-built clients.
pub struct StaticClientFactory {
    clients: Vec<Arc<dyn CloudStorageClient>>,
}

impl StaticClientFactory {
    pub fn new(clients: Vec<Arc<dyn CloudStorageClient>>) -> Self {
        Self { clients }
    }
}

impl CloudClientFactory for StaticClientFactory {
    fn storage_ids(&self) -> Vec<String> {
        self.clients
            .iter()
            .map(|c| c.storage_id().to_string())
            .collect()
    }

    fn client_for(&self, storage_id: &str) -> Option<Arc<dyn CloudStorageClient>> {
        self.clients
            .iter()
            .find(|c| c.storage_id() == storage_id)
            .cloned()
    }
}
