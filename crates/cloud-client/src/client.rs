//! The `CloudStorageClient` trait and its error taxonomy.

use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::{CredentialRequirements, Credentials};
use crate::oauth::OAuth2Capable;

/// The one well-known file name holding the entire encrypted repository.
pub const REPOSITORY_FILE_NAME: &str = "quillsync.repository";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CloudError {
    /// DNS failure, refused connection, timeout.
    #[error("connection to cloud storage failed: {0}")]
    ConnectionFailed(String),

    /// 401/403, wrong or revoked credentials.
    #[error("cloud storage denied access: {0}")]
    AccessDenied(String),

    /// A required credential field is missing or malformed.
    #[error("invalid cloud storage parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// One cloud storage account, seen as a bucket of named files.
///
/// Implementations are thin wrappers around one provider's API. All
/// consistency logic stays on the caller's side; a client only moves
/// bytes.
#[async_trait]
pub trait CloudStorageClient: Send + Sync {
    /// Stable identifier of the provider ("webdav", "directory", ...).
    fn storage_id(&self) -> &str;

    /// Which credential fields this provider needs.
    fn requirements(&self) -> CredentialRequirements;

    async fn upload_file(&self, name: &str, bytes: &[u8], credentials: &Credentials)
    -> Result<()>;

    async fn download_file(&self, name: &str, credentials: &Credentials) -> Result<Vec<u8>>;

    async fn exists_file(&self, name: &str, credentials: &Credentials) -> Result<bool>;

    async fn delete_file(&self, name: &str, credentials: &Credentials) -> Result<()>;

    async fn list_file_names(&self, credentials: &Credentials) -> Result<Vec<String>>;

    /// The OAuth2 surface, for providers that authorize via an external
    /// browser instead of stored username/password.
    fn oauth2(&self) -> Option<&dyn OAuth2Capable> {
        None
    }
}
