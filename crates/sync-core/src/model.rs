//! Repository data model.
//!
//! A `Repository` is one device's complete note collection: an ordered
//! list of notes, a tombstone list of deleted note ids, and the safes
//! (encrypted groupings) the notes may belong to. The repository `id`
//! identifies the lineage: two repositories with the same id descend from
//! the same originating device and can be merged without asking the user.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The newest document revision this build can read and write.
///
/// A repository with a higher revision comes from a newer app version and
/// must never be merged or persisted by this build.
pub const NEWEST_SUPPORTED_REVISION: u32 = 2;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("repository document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("repository revision {found} is newer than supported revision {supported}")]
    UnsupportedRevision { found: u32, supported: u32 },
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// A single note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,

    /// Last user edit.
    pub modified_at: DateTime<Utc>,

    /// Last housekeeping touch (not a user edit). Secondary recency
    /// tie-break only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintained_at: Option<DateTime<Utc>>,

    /// The safe this note is locked into, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_id: Option<Uuid>,

    pub content: String,
}

impl Note {
    pub fn new(content: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            modified_at,
            maintained_at: None,
            safe_id: None,
            content: content.into(),
        }
    }

    /// Recency key: `modified_at` first, `maintained_at` as tie-break
    /// (absent counts as the smallest possible value).
    pub fn recency(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.modified_at,
            self.maintained_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }
}

/// An encrypted grouping of notes requiring its own unlock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Safe {
    pub id: Uuid,

    pub modified_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintained_at: Option<DateTime<Utc>>,
}

impl Safe {
    pub fn new(modified_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            modified_at,
            maintained_at: None,
        }
    }

    pub fn recency(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.modified_at,
            self.maintained_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }
}

/// One device's complete note collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Lineage identity, assigned once per device-originated repository.
    pub id: Uuid,

    /// Document format revision.
    pub revision: u32,

    /// When the note ordering was last changed.
    pub order_modified_at: DateTime<Utc>,

    #[serde(default)]
    pub notes: Vec<Note>,

    /// Tombstones: ids of notes deleted on this device, kept so deletions
    /// propagate instead of being resurrected by merge.
    #[serde(default)]
    pub deleted_note_ids: Vec<Uuid>,

    #[serde(default)]
    pub safes: Vec<Safe>,
}

impl Repository {
    /// Create a fresh, empty repository with a new lineage id.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            revision: NEWEST_SUPPORTED_REVISION,
            order_modified_at: now,
            notes: Vec::new(),
            deleted_note_ids: Vec::new(),
            safes: Vec::new(),
        }
    }

    /// Parse a repository from its serialized JSON form.
    ///
    /// Rejects documents written by a newer app version.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let repository: Self = serde_json::from_slice(bytes)?;
        repository.ensure_supported_revision()?;
        Ok(repository)
    }

    /// Serialize to the canonical JSON form.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("repository serialization should not fail")
    }

    /// Fail if this document's revision is newer than this build supports.
    pub fn ensure_supported_revision(&self) -> Result<()> {
        if self.revision > NEWEST_SUPPORTED_REVISION {
            return Err(ModelError::UnsupportedRevision {
                found: self.revision,
                supported: NEWEST_SUPPORTED_REVISION,
            });
        }
        Ok(())
    }

    pub fn find_note(&self, id: Uuid) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn contains_note(&self, id: Uuid) -> bool {
        self.find_note(id).is_some()
    }

    /// The tombstones of this repository as an indexed set.
    pub fn tombstones(&self) -> TombstoneSet {
        TombstoneSet::from_ids(self.deleted_note_ids.iter().copied())
    }

    /// Delete a note, leaving a tombstone behind.
    pub fn delete_note(&mut self, id: Uuid) {
        let before = self.notes.len();
        self.notes.retain(|n| n.id != id);
        if before != self.notes.len() && !self.deleted_note_ids.contains(&id) {
            self.deleted_note_ids.push(id);
        }
    }

    /// Invariant check used by tests: no id appears in both `notes` and
    /// `deleted_note_ids`, and there are no duplicate note ids.
    pub fn is_consistent(&self) -> bool {
        let tombstones = self.tombstones();
        let mut seen = BTreeSet::new();
        self.notes
            .iter()
            .all(|n| !tombstones.contains(n.id) && seen.insert(n.id))
    }
}

/// A sorted set of deleted note ids, for fast membership tests during
/// merge and for the canonical serialized tombstone list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TombstoneSet(BTreeSet<Uuid>);

impl TombstoneSet {
    pub fn from_ids(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.0.contains(&id)
    }

    pub fn insert(&mut self, id: Uuid) {
        self.0.insert(id);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.0.iter().copied()
    }

    /// The tombstones in sorted order, for the serialized form.
    pub fn into_sorted_vec(self) -> Vec<Uuid> {
        self.0.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_repository_json_roundtrip() {
        let mut repository = Repository::new(t(1000));
        let mut note = Note::new("# Groceries", t(1001));
        note.maintained_at = Some(t(1002));
        repository.notes.push(note);
        repository.safes.push(Safe::new(t(1003)));

        let json = repository.to_json();
        let parsed = Repository::from_json(&json).unwrap();
        assert_eq!(repository, parsed);
    }

    #[test]
    fn test_from_json_rejects_future_revision() {
        let mut repository = Repository::new(t(0));
        repository.revision = NEWEST_SUPPORTED_REVISION + 1;
        let json = repository.to_json();

        let err = Repository::from_json(&json).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedRevision { .. }));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = Repository::from_json(b"not a document").unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }

    #[test]
    fn test_delete_note_leaves_tombstone() {
        let mut repository = Repository::new(t(0));
        let note = Note::new("bye", t(1));
        let id = note.id;
        repository.notes.push(note);

        repository.delete_note(id);

        assert!(repository.notes.is_empty());
        assert_eq!(repository.deleted_note_ids, vec![id]);
        assert!(repository.is_consistent());
    }

    #[test]
    fn test_delete_note_is_idempotent() {
        let mut repository = Repository::new(t(0));
        let note = Note::new("bye", t(1));
        let id = note.id;
        repository.notes.push(note);

        repository.delete_note(id);
        repository.delete_note(id);

        assert_eq!(repository.deleted_note_ids, vec![id]);
    }

    #[test]
    fn test_recency_absent_maintained_at_is_smallest() {
        let mut touched = Note::new("a", t(100));
        touched.maintained_at = Some(t(50));
        let untouched = Note::new("b", t(100));

        assert!(touched.recency() > untouched.recency());
    }

    #[test]
    fn test_tombstone_set_sorted_and_deduplicated() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let set = TombstoneSet::from_ids([b, a, b]);

        assert_eq!(set.len(), 2);
        let sorted = set.into_sorted_vec();
        assert!(sorted.windows(2).all(|w| w[0] < w[1]));
    }
}
