//! Content fingerprints for change detection.
//!
//! Two repository snapshots differ exactly when their fingerprints do, so
//! the sync workflow can decide "did anything change?" without a full
//! comparison, and background runs can report a before/after pair instead
//! of UI state.

use sha2::{Digest, Sha256};

use crate::model::Repository;

/// SHA-256 over the canonical JSON serialization, as lowercase hex.
pub fn fingerprint(repository: &Repository) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repository.to_json());
    hex::encode(hasher.finalize())
}
