//! In-memory cloud storage for tests.
//!
//! Mirrors the behavior contract of the real providers closely enough to
//! drive the whole workflow: credential validation, the error taxonomy
//! (via failure injection), and an optional OAuth2 surface with a
//! scriptable refresh-token expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::client::{CloudError, CloudStorageClient, Result};
use crate::credentials::{CredentialRequirements, Credentials};
use crate::oauth::{self, OAuth2Capable, OAuthError, OAuthToken, RedirectParams};

/// Which error the next operations should fail with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InjectedFailure {
    Connection,
    AccessDenied,
}

/// In-memory cloud storage account.
pub struct MemoryCloud {
    files: RwLock<HashMap<String, Vec<u8>>>,
    failure: Mutex<Option<InjectedFailure>>,
    oauth: Option<MemoryOAuth>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            failure: Mutex::new(None),
            oauth: None,
        }
    }

    /// A memory cloud whose provider authorizes via OAuth2.
    pub fn with_oauth() -> Self {
        Self {
            oauth: Some(MemoryOAuth::new()),
            ..Self::new()
        }
    }

    /// Make every following operation fail with the given error.
    pub fn inject_failure(&self, failure: Option<InjectedFailure>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Seed a file, bypassing the client interface.
    pub fn seed_file(&self, name: &str, bytes: Vec<u8>) {
        self.files.write().unwrap().insert(name.to_string(), bytes);
    }

    /// Read a file back, bypassing the client interface.
    pub fn raw_file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.read().unwrap().get(name).cloned()
    }

    /// The scriptable OAuth2 half, if this account uses OAuth2.
    pub fn oauth(&self) -> Option<&MemoryOAuth> {
        self.oauth.as_ref()
    }

    fn check_failure(&self) -> Result<()> {
        match *self.failure.lock().unwrap() {
            Some(InjectedFailure::Connection) => {
                Err(CloudError::ConnectionFailed("injected".into()))
            }
            Some(InjectedFailure::AccessDenied) => {
                Err(CloudError::AccessDenied("injected".into()))
            }
            None => Ok(()),
        }
    }

    fn check(&self, credentials: &Credentials) -> Result<()> {
        self.check_failure()?;
        credentials.validate(&self.requirements())
    }
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudStorageClient for MemoryCloud {
    fn storage_id(&self) -> &str {
        "memory"
    }

    fn requirements(&self) -> CredentialRequirements {
        if self.oauth.is_some() {
            CredentialRequirements::token_based()
        } else {
            CredentialRequirements::default()
        }
    }

    async fn upload_file(
        &self,
        name: &str,
        bytes: &[u8],
        credentials: &Credentials,
    ) -> Result<()> {
        self.check(credentials)?;
        self.files
            .write()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn download_file(&self, name: &str, credentials: &Credentials) -> Result<Vec<u8>> {
        self.check(credentials)?;
        self.files
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::ConnectionFailed(format!("no such file: {name}")))
    }

    async fn exists_file(&self, name: &str, credentials: &Credentials) -> Result<bool> {
        self.check(credentials)?;
        Ok(self.files.read().unwrap().contains_key(name))
    }

    async fn delete_file(&self, name: &str, credentials: &Credentials) -> Result<()> {
        self.check(credentials)?;
        self.files.write().unwrap().remove(name);
        Ok(())
    }

    async fn list_file_names(&self, credentials: &Credentials) -> Result<Vec<String>> {
        self.check(credentials)?;
        let mut names: Vec<String> = self.files.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn oauth2(&self) -> Option<&dyn OAuth2Capable> {
        self.oauth.as_ref().map(|o| o as &dyn OAuth2Capable)
    }
}

/// Scriptable OAuth2 endpoint for tests.
pub struct MemoryOAuth {
    refresh_expired: AtomicBool,
}

impl MemoryOAuth {
    fn new() -> Self {
        Self {
            refresh_expired: AtomicBool::new(false),
        }
    }

    /// Make the next refresh fail with `RefreshTokenExpired`.
    pub fn expire_refresh_token(&self) {
        self.refresh_expired.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OAuth2Capable for MemoryOAuth {
    fn build_authorization_request_url(&self, state: &str, code_verifier: &str) -> String {
        let challenge = oauth::code_challenge_s256(code_verifier);
        format!(
            "https://auth.example.org/authorize?response_type=code&state={state}&code_challenge={challenge}&code_challenge_method=S256"
        )
    }

    async fn fetch_token(
        &self,
        redirect_url: &str,
        state: &str,
        _code_verifier: &str,
    ) -> oauth::Result<OAuthToken> {
        let params = RedirectParams::parse(redirect_url)?;
        let code = params.authorization_code(state)?;
        Ok(OAuthToken {
            access_token: format!("access-{code}"),
            refresh_token: Some("refresh-token".into()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        })
    }

    async fn refresh_token(&self, token: &OAuthToken) -> oauth::Result<OAuthToken> {
        if self.refresh_expired.load(Ordering::SeqCst) {
            return Err(OAuthError::RefreshTokenExpired);
        }
        Ok(OAuthToken {
            access_token: "refreshed-access".into(),
            refresh_token: token.refresh_token.clone(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        })
    }
}
