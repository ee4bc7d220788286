//! Local persistence of the repository snapshot.
//!
//! The local copy is the decrypted, plaintext serialized form; only the
//! cloud copy is wrapped in the encryption envelope. Saves use atomic
//! replacement so a crash mid-write never corrupts the on-disk file.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error};

use sync_core::{ModelError, Repository};

use crate::atomic;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("repository file io failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage seam for the local repository snapshot.
#[async_trait]
pub trait RepositoryStorage: Send + Sync {
    /// Load the stored repository, or a fresh empty one if none exists.
    ///
    /// Fails when the stored document is corrupt or written by a newer
    /// app version; such a file must never be silently replaced.
    async fn load_or_default(&self) -> Result<Repository>;

    /// Persist the repository. Returns whether the save succeeded;
    /// failures are logged, not propagated.
    async fn try_save(&self, repository: &Repository) -> bool;

    /// Drop any in-memory copy so the next load re-reads the disk.
    fn invalidate_cache(&self);
}

/// Repository stored as one JSON file, cached in memory per process.
pub struct FileRepositoryStorage {
    path: PathBuf,
    cache: Mutex<Option<Repository>>,
}

impl FileRepositoryStorage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RepositoryStorage for FileRepositoryStorage {
    async fn load_or_default(&self) -> Result<Repository> {
        if let Some(cached) = self.cache.lock().unwrap().clone() {
            return Ok(cached);
        }

        let repository = match std::fs::read(&self.path) {
            Ok(bytes) => Repository::from_json(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no local repository yet, starting fresh");
                let fresh = Repository::new(Utc::now());
                // Persist immediately so the lineage id is minted once,
                // not re-rolled on every load.
                atomic::replace_file(&self.path, &fresh.to_json())?;
                fresh
            }
            Err(e) => return Err(e.into()),
        };

        *self.cache.lock().unwrap() = Some(repository.clone());
        Ok(repository)
    }

    async fn try_save(&self, repository: &Repository) -> bool {
        if let Err(e) = repository.ensure_supported_revision() {
            error!("refusing to save repository: {e}");
            return false;
        }

        match atomic::replace_file(&self.path, &repository.to_json()) {
            Ok(()) => {
                *self.cache.lock().unwrap() = Some(repository.clone());
                true
            }
            Err(e) => {
                error!("failed to save repository: {e}");
                false
            }
        }
    }

    fn invalidate_cache(&self) {
        *self.cache.lock().unwrap() = None;
    }
}

/// In-memory repository storage for tests.
#[derive(Default)]
pub struct MemoryRepositoryStorage {
    repository: Mutex<Option<Repository>>,
    fail_saves: std::sync::atomic::AtomicBool,
}

impl MemoryRepositoryStorage {
    pub fn new(repository: Option<Repository>) -> Self {
        Self {
            repository: Mutex::new(repository),
            fail_saves: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self) {
        self.fail_saves
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// The stored repository, bypassing the trait.
    pub fn stored(&self) -> Option<Repository> {
        self.repository.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositoryStorage for MemoryRepositoryStorage {
    async fn load_or_default(&self) -> Result<Repository> {
        let mut stored = self.repository.lock().unwrap();
        match stored.as_ref() {
            Some(repository) => Ok(repository.clone()),
            None => {
                let fresh = Repository::new(Utc::now());
                *stored = Some(fresh.clone());
                Ok(fresh)
            }
        }
    }

    async fn try_save(&self, repository: &Repository) -> bool {
        if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
            error!("repository save failed (injected)");
            return false;
        }
        *self.repository.lock().unwrap() = Some(repository.clone());
        true
    }

    fn invalidate_cache(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::{NEWEST_SUPPORTED_REVISION, Note};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_file_creates_fresh_repository() {
        let dir = TempDir::new().unwrap();
        let storage = FileRepositoryStorage::new(dir.path().join("repository.json"));

        let repository = storage.load_or_default().await.unwrap();

        assert!(repository.notes.is_empty());
        assert_eq!(repository.revision, NEWEST_SUPPORTED_REVISION);

        // The fresh repository was persisted: a second storage sees the
        // same lineage id instead of minting a new one.
        let storage2 = FileRepositoryStorage::new(dir.path().join("repository.json"));
        assert_eq!(storage2.load_or_default().await.unwrap().id, repository.id);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repository.json");

        let mut repository = Repository::new(Utc::now());
        repository.notes.push(Note::new("persisted", Utc::now()));

        let storage = FileRepositoryStorage::new(path.clone());
        assert!(storage.try_save(&repository).await);

        // A second storage over the same path sees the saved state.
        let reloaded = FileRepositoryStorage::new(path)
            .load_or_default()
            .await
            .unwrap();
        assert_eq!(reloaded, repository);
    }

    #[tokio::test]
    async fn test_load_uses_cache_until_invalidated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repository.json");
        let storage = FileRepositoryStorage::new(path.clone());

        let repository = storage.load_or_default().await.unwrap();

        // Replace the file behind the cache's back.
        let mut other = Repository::new(Utc::now());
        other.notes.push(Note::new("outside edit", Utc::now()));
        atomic::replace_file(&path, &other.to_json()).unwrap();

        assert_eq!(storage.load_or_default().await.unwrap(), repository);

        storage.invalidate_cache();
        assert_eq!(storage.load_or_default().await.unwrap(), other);
    }

    #[tokio::test]
    async fn test_future_revision_fails_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repository.json");

        let mut repository = Repository::new(Utc::now());
        repository.revision = NEWEST_SUPPORTED_REVISION + 1;
        atomic::replace_file(&path, &repository.to_json()).unwrap();

        let storage = FileRepositoryStorage::new(path);
        let err = storage.load_or_default().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Model(ModelError::UnsupportedRevision { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_refuses_future_revision() {
        let dir = TempDir::new().unwrap();
        let storage = FileRepositoryStorage::new(dir.path().join("repository.json"));

        let mut repository = Repository::new(Utc::now());
        repository.revision = NEWEST_SUPPORTED_REVISION + 1;

        assert!(!storage.try_save(&repository).await);
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repository.json");
        std::fs::write(&path, b"{{{ not json").unwrap();

        let storage = FileRepositoryStorage::new(path);
        assert!(matches!(
            storage.load_or_default().await.unwrap_err(),
            StorageError::Model(ModelError::Malformed(_))
        ));
    }
}
