//! Persisted synchronization settings.
//!
//! Settings hold everything that must outlive a run: the transfer code
//! and its history, the account credentials, the auto-sync mode, and a
//! pending OAuth authorization waiting for its browser redirect.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use cloud_client::Credentials;

use crate::atomic;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// When background runs are allowed to synchronize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutoSyncMode {
    Never,
    #[default]
    Always,
}

/// An OAuth authorization that left for the external browser and has
/// not returned yet. Persisted so the hand-off survives an app restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAuthorization {
    pub cloud_storage_id: String,
    pub state: String,
    pub code_verifier: String,
    /// The redirect URI registered with the provider.
    pub redirect_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// The currently active transfer code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_code: Option<String>,

    /// Previously used codes, most recently used first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transfer_code_history: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub auto_sync_mode: AutoSyncMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_authorization: Option<PendingAuthorization>,
}

impl Settings {
    /// Make `code` the active transfer code, demoting the previous one
    /// to the front of the history.
    ///
    /// Used both when the user enters a new code and when decryption
    /// succeeds with a non-current candidate (self-healing after a code
    /// rotation on another device).
    pub fn adopt_transfer_code(&mut self, code: String) {
        if self.transfer_code.as_deref() == Some(code.as_str()) {
            return;
        }
        self.transfer_code_history.retain(|c| *c != code);
        if let Some(previous) = self.transfer_code.take() {
            self.transfer_code_history.insert(0, previous);
        }
        self.transfer_code = Some(code);
    }

    /// All known codes in decryption candidate order: the active code
    /// first, then the history, most recently used first.
    pub fn transfer_code_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::with_capacity(1 + self.transfer_code_history.len());
        if let Some(current) = &self.transfer_code {
            candidates.push(current.clone());
        }
        candidates.extend(self.transfer_code_history.iter().cloned());
        candidates
    }
}

/// Storage seam for settings.
pub trait SettingsStore: Send + Sync {
    /// A snapshot of the current settings.
    fn snapshot(&self) -> Settings;

    /// Mutate the settings and persist the result atomically.
    fn update(&self, mutate: &mut dyn FnMut(&mut Settings)) -> Result<()>;
}

/// Settings persisted as one JSON file, cached in memory.
pub struct FileSettings {
    path: PathBuf,
    cache: Mutex<Settings>,
}

impl FileSettings {
    /// Open the settings file, starting from defaults if it is absent.
    pub fn open(path: PathBuf) -> Result<Self> {
        let cache = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }
}

impl SettingsStore for FileSettings {
    fn snapshot(&self) -> Settings {
        self.cache.lock().unwrap().clone()
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut Settings)) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        let mut updated = cache.clone();
        mutate(&mut updated);

        if updated != *cache {
            let bytes = serde_json::to_vec_pretty(&updated)?;
            atomic::replace_file(&self.path, &bytes)?;
            *cache = updated;
        }
        Ok(())
    }
}

/// In-memory settings for tests.
#[derive(Default)]
pub struct MemorySettings {
    cache: Mutex<Settings>,
    fail_updates: std::sync::atomic::AtomicBool,
}

impl MemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            cache: Mutex::new(settings),
            fail_updates: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Make every following update fail, simulating a broken disk.
    pub fn fail_updates(&self) {
        self.fail_updates
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

impl SettingsStore for MemorySettings {
    fn snapshot(&self) -> Settings {
        self.cache.lock().unwrap().clone()
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut Settings)) -> Result<()> {
        if self.fail_updates.load(std::sync::atomic::Ordering::SeqCst) {
            warn!("settings update failed (injected)");
            return Err(SettingsError::Io(std::io::Error::other("injected")));
        }
        mutate(&mut self.cache.lock().unwrap());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_adopt_transfer_code_demotes_previous() {
        let mut settings = Settings::default();
        settings.adopt_transfer_code("AAAA".into());
        settings.adopt_transfer_code("BBBB".into());
        settings.adopt_transfer_code("CCCC".into());

        assert_eq!(settings.transfer_code.as_deref(), Some("CCCC"));
        assert_eq!(settings.transfer_code_history, vec!["BBBB", "AAAA"]);
    }

    #[test]
    fn test_adopt_current_code_is_noop() {
        let mut settings = Settings::default();
        settings.adopt_transfer_code("AAAA".into());
        settings.adopt_transfer_code("AAAA".into());

        assert_eq!(settings.transfer_code.as_deref(), Some("AAAA"));
        assert!(settings.transfer_code_history.is_empty());
    }

    #[test]
    fn test_adopting_history_code_removes_it_from_history() {
        let mut settings = Settings::default();
        settings.adopt_transfer_code("AAAA".into());
        settings.adopt_transfer_code("BBBB".into());
        // Rotate back to AAAA, as after decrypting with a history code.
        settings.adopt_transfer_code("AAAA".into());

        assert_eq!(settings.transfer_code.as_deref(), Some("AAAA"));
        assert_eq!(settings.transfer_code_history, vec!["BBBB"]);
    }

    #[test]
    fn test_candidate_order_is_current_then_mru_history() {
        let mut settings = Settings::default();
        settings.adopt_transfer_code("AAAA".into());
        settings.adopt_transfer_code("BBBB".into());
        settings.adopt_transfer_code("CCCC".into());

        assert_eq!(
            settings.transfer_code_candidates(),
            vec!["CCCC", "BBBB", "AAAA"]
        );
    }

    #[test]
    fn test_file_settings_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        {
            let store = FileSettings::open(path.clone()).unwrap();
            store
                .update(&mut |s| s.adopt_transfer_code("ABCD2345EFGH6789".into()))
                .unwrap();
        }

        let reopened = FileSettings::open(path).unwrap();
        assert_eq!(
            reopened.snapshot().transfer_code.as_deref(),
            Some("ABCD2345EFGH6789")
        );
    }

    #[test]
    fn test_file_settings_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let store = FileSettings::open(dir.path().join("none.json")).unwrap();
        assert_eq!(store.snapshot(), Settings::default());
    }
}
