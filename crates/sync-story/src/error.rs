//! The error type of a synchronization run.

use cloud_client::{CloudError, OAuthError};
use sync_core::ModelError;
use sync_core::crypto::CryptoError;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("settings persistence failed: {0}")]
    Settings(String),

    #[error("saving the repository locally failed")]
    SaveFailed,

    #[error("no cloud storage client registered for id {0}")]
    UnknownStorage(String),

    #[error("cloud storage {0} does not support oauth2")]
    NotOAuth2(String),

    #[error("session is missing {0}")]
    MissingSessionData(&'static str),

    #[error("another synchronization run superseded this one")]
    Superseded,
}

impl StoryError {
    /// Fatal errors end the run immediately; retrying with other input
    /// (another transfer code, another attempt) cannot help.
    ///
    /// A malformed envelope and a too-new document revision are the two
    /// load-bearing cases: both must escape the decrypt candidate loop
    /// on first sight.
    pub fn is_fatal(&self) -> bool {
        match self {
            StoryError::Crypto(CryptoError::InvalidCipherFormat) => true,
            StoryError::Crypto(CryptoError::EncryptionFailure) => true,
            StoryError::Crypto(CryptoError::WrongTransferCode) => false,
            StoryError::Model(_) => true,
            StoryError::Storage(StorageError::Model(_)) => true,
            StoryError::MissingSessionData(_) => true,
            _ => false,
        }
    }
}
