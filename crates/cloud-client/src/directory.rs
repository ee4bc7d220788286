//! A local directory posing as cloud storage.
//!
//! Useful for the headless daemon (point it at any folder a third-party
//! tool already synchronizes) and for end-to-end tests that should cross
//! a real filesystem boundary. Needs no credentials.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::client::{CloudError, CloudStorageClient, Result};
use crate::credentials::{CredentialRequirements, Credentials};

pub struct DirectoryCloud {
    base: PathBuf,
}

impl DirectoryCloud {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    /// Resolve a remote file name inside the base directory.
    ///
    /// Names are flat; anything that looks like a path is rejected so a
    /// crafted name cannot escape the base directory.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(CloudError::InvalidParameter(format!(
                "invalid remote file name: {name}"
            )));
        }
        Ok(self.base.join(name))
    }

    fn io_error(err: std::io::Error) -> CloudError {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => CloudError::AccessDenied(err.to_string()),
            _ => CloudError::ConnectionFailed(err.to_string()),
        }
    }
}

#[async_trait]
impl CloudStorageClient for DirectoryCloud {
    fn storage_id(&self) -> &str {
        "directory"
    }

    fn requirements(&self) -> CredentialRequirements {
        CredentialRequirements::default()
    }

    async fn upload_file(
        &self,
        name: &str,
        bytes: &[u8],
        _credentials: &Credentials,
    ) -> Result<()> {
        let path = self.resolve(name)?;
        fs::create_dir_all(&self.base)
            .await
            .map_err(Self::io_error)?;
        fs::write(&path, bytes).await.map_err(Self::io_error)
    }

    async fn download_file(&self, name: &str, _credentials: &Credentials) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        fs::read(&path).await.map_err(Self::io_error)
    }

    async fn exists_file(&self, name: &str, _credentials: &Credentials) -> Result<bool> {
        let path = self.resolve(name)?;
        Ok(fs::try_exists(&path).await.map_err(Self::io_error)?)
    }

    async fn delete_file(&self, name: &str, _credentials: &Credentials) -> Result<()> {
        let path = self.resolve(name)?;
        fs::remove_file(&path).await.map_err(Self::io_error)
    }

    async fn list_file_names(&self, _credentials: &Credentials) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = match fs::read_dir(&self.base).await {
            Ok(dir) => dir,
            // A base directory nobody has uploaded to yet is an empty
            // account, not an error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(Self::io_error(e)),
        };

        while let Some(entry) = dir.next_entry().await.map_err(Self::io_error)? {
            let metadata = entry.metadata().await.map_err(Self::io_error)?;
            if metadata.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::REPOSITORY_FILE_NAME;
    use tempfile::TempDir;

    fn credentials() -> Credentials {
        Credentials::for_storage("directory")
    }

    #[tokio::test]
    async fn test_upload_creates_base_and_roundtrips() {
        let dir = TempDir::new().unwrap();
        let cloud = DirectoryCloud::new(dir.path().join("remote"));

        cloud
            .upload_file(REPOSITORY_FILE_NAME, b"payload", &credentials())
            .await
            .unwrap();

        assert!(
            cloud
                .exists_file(REPOSITORY_FILE_NAME, &credentials())
                .await
                .unwrap()
        );
        assert_eq!(
            cloud
                .download_file(REPOSITORY_FILE_NAME, &credentials())
                .await
                .unwrap(),
            b"payload"
        );
    }

    #[tokio::test]
    async fn test_missing_file_does_not_exist() {
        let dir = TempDir::new().unwrap();
        let cloud = DirectoryCloud::new(dir.path().to_path_buf());
        assert!(
            !cloud
                .exists_file(REPOSITORY_FILE_NAME, &credentials())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_list_on_missing_base_is_empty() {
        let dir = TempDir::new().unwrap();
        let cloud = DirectoryCloud::new(dir.path().join("never-created"));
        assert!(
            cloud
                .list_file_names(&credentials())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_path_like_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let cloud = DirectoryCloud::new(dir.path().to_path_buf());

        for name in ["../escape", "a/b", "", ".."] {
            let err = cloud
                .exists_file(name, &credentials())
                .await
                .unwrap_err();
            assert!(matches!(err, CloudError::InvalidParameter(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let cloud = DirectoryCloud::new(dir.path().to_path_buf());

        cloud
            .upload_file(REPOSITORY_FILE_NAME, b"x", &credentials())
            .await
            .unwrap();
        cloud
            .delete_file(REPOSITORY_FILE_NAME, &credentials())
            .await
            .unwrap();
        assert!(
            !cloud
                .exists_file(REPOSITORY_FILE_NAME, &credentials())
                .await
                .unwrap()
        );
    }
}
