//! Per-run session state.
//!
//! The session lives exactly as long as one orchestrator run and is
//! cleared on the terminal transition. Anything that must survive the
//! process (the pending OAuth authorization) goes to settings instead.

use cloud_client::Credentials;
use sync_core::Repository;

/// The typed scratchpad a run carries from step to step.
#[derive(Debug, Default)]
pub struct Session {
    /// Credentials picked up from settings or entered this run.
    pub credentials: Option<Credentials>,

    /// The encrypted blob, downloaded once per run. Later steps read
    /// this cache instead of re-issuing the network request.
    pub downloaded: Option<Vec<u8>>,

    /// The decrypted remote repository.
    pub remote_repository: Option<Repository>,

    /// A transfer code the user typed this run. When set, it is the
    /// only decryption candidate.
    pub user_entered_code: Option<String>,

    /// The redirect URL delivered by the platform OAuth callback.
    pub oauth_redirect_url: Option<String>,
}

impl Session {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
