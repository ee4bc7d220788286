//! UI gateway for a process with no UI.
//!
//! Silent runs never call the gateway; the orchestrator stops them
//! before any input step. These implementations exist so the context can
//! be assembled at all, and decline everything should a code path reach
//! them anyway.

use async_trait::async_trait;
use cloud_client::{CredentialRequirements, Credentials};
use sync_story::{MergeChoice, UiGateway};
use tracing::warn;

pub struct HeadlessUi;

#[async_trait]
impl UiGateway for HeadlessUi {
    async fn show_first_time_dialog(&self) -> bool {
        warn!("first-time dialog requested in headless process");
        false
    }

    async fn choose_cloud_storage(&self, _storage_ids: &[String]) -> Option<String> {
        None
    }

    async fn prompt_credentials(
        &self,
        _storage_id: &str,
        _requirements: &CredentialRequirements,
    ) -> Option<Credentials> {
        None
    }

    async fn open_authorization_url(&self, url: &str) {
        warn!(url, "cannot open a browser in headless process");
    }

    async fn prompt_transfer_code(&self) -> Option<String> {
        None
    }

    async fn choose_merge_strategy(&self) -> Option<MergeChoice> {
        None
    }

    async fn show_feedback(&self, _message: &str) {}

    async fn show_repository(&self) {}
}
