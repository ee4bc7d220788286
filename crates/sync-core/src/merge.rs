//! Deterministic two-way merge of repository snapshots.
//!
//! The merge is a pure function over two independently edited snapshots of
//! the same note collection. It reconciles deletions through tombstones,
//! resolves concurrent edits by recency, and preserves the note ordering
//! of whichever side reordered most recently.
//!
//! Determinism matters: both devices compute the same merged repository
//! from the same pair of inputs, so the cloud copy converges without any
//! server-side logic.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::model::{NEWEST_SUPPORTED_REVISION, Note, Repository, Safe, TombstoneSet};

/// Tunable merge behavior.
#[derive(Debug, Clone)]
pub struct MergePolicy {
    /// `maintained_at` markers older than this are cleared before the
    /// merge, so stale housekeeping touches cannot outvote real edits.
    pub maintained_at_horizon: Duration,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            maintained_at_horizon: Duration::hours(18),
        }
    }
}

/// Merge two snapshots of the same note collection into a new repository.
///
/// Neither input is mutated. The result takes its lineage id from
/// `remote` (the copy all devices converge toward) and its ordering from
/// the side with the more recent `order_modified_at`.
pub fn merge(
    local: &Repository,
    remote: &Repository,
    now: DateTime<Utc>,
    policy: &MergePolicy,
) -> Repository {
    let mut local = local.clone();
    let mut remote = remote.clone();
    clear_stale_maintenance(&mut local, now, policy);
    clear_stale_maintenance(&mut remote, now, policy);

    let tombstones = merged_tombstones(&local, &remote);

    let local_living = living_notes(&local.notes, &tombstones);
    let remote_living = living_notes(&remote.notes, &tombstones);

    // Order precedence: the side that reordered most recently drives the
    // merged ordering. Ties go to the remote side, consistent with the
    // remote lineage winning identity.
    let local_is_primary = local.order_modified_at > remote.order_modified_at;
    let order_modified_at = if local_is_primary {
        local.order_modified_at
    } else {
        remote.order_modified_at
    };

    let notes = if local_is_primary {
        outer_join(&local_living, &remote_living)
    } else {
        outer_join(&remote_living, &local_living)
    };

    let mut safes = if local_is_primary {
        outer_join(&local.safes, &remote.safes)
    } else {
        outer_join(&remote.safes, &local.safes)
    };

    // Prune safes no surviving note refers to.
    let referenced: HashSet<Uuid> = notes.iter().filter_map(|n| n.safe_id).collect();
    safes.retain(|s| referenced.contains(&s.id));

    Repository {
        id: remote.id,
        revision: NEWEST_SUPPORTED_REVISION,
        order_modified_at,
        notes,
        deleted_note_ids: tombstones.into_sorted_vec(),
        safes,
    }
}

/// Merged tombstone set: every remote deletion, plus local deletions of
/// notes the remote side actually has. A local-only deletion of a note
/// the remote never received has nothing to reconcile against and is
/// forgotten.
fn merged_tombstones(local: &Repository, remote: &Repository) -> TombstoneSet {
    let remote_note_ids: HashSet<Uuid> = remote.notes.iter().map(|n| n.id).collect();

    let mut tombstones = TombstoneSet::from_ids(remote.deleted_note_ids.iter().copied());
    for &id in &local.deleted_note_ids {
        if remote_note_ids.contains(&id) {
            tombstones.insert(id);
        }
    }
    tombstones
}

fn living_notes(notes: &[Note], tombstones: &TombstoneSet) -> Vec<Note> {
    notes
        .iter()
        .filter(|n| !tombstones.contains(n.id))
        .cloned()
        .collect()
}

fn clear_stale_maintenance(repository: &mut Repository, now: DateTime<Utc>, policy: &MergePolicy) {
    let cutoff = now - policy.maintained_at_horizon;
    for note in &mut repository.notes {
        if note.maintained_at.is_some_and(|m| m < cutoff) {
            note.maintained_at = None;
        }
    }
    for safe in &mut repository.safes {
        if safe.maintained_at.is_some_and(|m| m < cutoff) {
            safe.maintained_at = None;
        }
    }
}

/// Items that can flow through the order-preserving outer join.
trait Joinable: Clone {
    fn join_id(&self) -> Uuid;
    fn join_recency(&self) -> (DateTime<Utc>, DateTime<Utc>);

    /// Resolve a matched pair: the more recently touched copy survives,
    /// ties keep the primary side's copy.
    fn pick<'a>(primary: &'a Self, secondary: &'a Self) -> &'a Self {
        if secondary.join_recency() > primary.join_recency() {
            secondary
        } else {
            primary
        }
    }
}

impl Joinable for Note {
    fn join_id(&self) -> Uuid {
        self.id
    }

    fn join_recency(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.recency()
    }
}

impl Joinable for Safe {
    fn join_id(&self) -> Uuid {
        self.id
    }

    fn join_recency(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.recency()
    }
}

/// Outer-join two lists by id, preserving the primary side's relative
/// order.
///
/// Both lists are walked with position pointers: runs of ids present on
/// one side only are emitted in their original order, and a matched pair
/// is emitted at the point where the primary walk reaches it. Matches are
/// located through an index, so incompatible interleavings degrade to
/// primary-order emission rather than dropping or duplicating items.
/// O(n+m).
fn outer_join<T: Joinable>(primary: &[T], secondary: &[T]) -> Vec<T> {
    let primary_ids: HashSet<Uuid> = primary.iter().map(|x| x.join_id()).collect();
    let secondary_pos: HashMap<Uuid, usize> = secondary
        .iter()
        .enumerate()
        .map(|(i, x)| (x.join_id(), i))
        .collect();

    let mut out = Vec::with_capacity(primary.len() + secondary.len());
    let mut consumed = vec![false; secondary.len()];
    let mut j = 0;

    for item in primary {
        match secondary_pos.get(&item.join_id()) {
            Some(&k) => {
                // Flush the secondary-only run sitting before this match.
                while j < secondary.len() {
                    if consumed[j] {
                        j += 1;
                        continue;
                    }
                    if primary_ids.contains(&secondary[j].join_id()) {
                        break;
                    }
                    out.push(secondary[j].clone());
                    consumed[j] = true;
                    j += 1;
                }
                out.push(T::pick(item, &secondary[k]).clone());
                consumed[k] = true;
            }
            None => out.push(item.clone()),
        }
    }

    // Trailing secondary-only items keep their original order.
    for (k, item) in secondary.iter().enumerate() {
        if !consumed[k] && !primary_ids.contains(&item.join_id()) {
            out.push(item.clone());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn note_with_id(id: Uuid, content: &str, modified: i64) -> Note {
        Note {
            id,
            modified_at: t(modified),
            maintained_at: None,
            safe_id: None,
            content: content.into(),
        }
    }

    fn repository_with_notes(notes: Vec<Note>, order_modified: i64) -> Repository {
        Repository {
            id: Uuid::new_v4(),
            revision: NEWEST_SUPPORTED_REVISION,
            order_modified_at: t(order_modified),
            notes,
            deleted_note_ids: Vec::new(),
            safes: Vec::new(),
        }
    }

    fn policy() -> MergePolicy {
        MergePolicy::default()
    }

    #[test]
    fn test_merge_is_idempotent() {
        let n1 = note_with_id(Uuid::new_v4(), "one", 10);
        let n2 = note_with_id(Uuid::new_v4(), "two", 20);
        let mut a = repository_with_notes(vec![n1, n2], 30);
        a.deleted_note_ids.push(Uuid::new_v4());

        let merged = merge(&a, &a, t(100), &policy());

        assert_eq!(merged.notes, a.notes);
        assert_eq!(merged.safes, a.safes);
        assert_eq!(merged.id, a.id);
        // Local-only tombstones of notes the "remote" also lacks are kept
        // here because the remote side (a itself) carries the same list.
        assert_eq!(
            TombstoneSet::from_ids(merged.deleted_note_ids.iter().copied()),
            a.tombstones()
        );
        assert!(merged.is_consistent());
    }

    #[test]
    fn test_local_only_deletion_is_forgotten() {
        // Local deleted N1; remote never had N1.
        let n1 = Uuid::new_v4();
        let mut local = repository_with_notes(vec![], 10);
        local.deleted_note_ids.push(n1);
        let remote = repository_with_notes(vec![], 20);

        let merged = merge(&local, &remote, t(100), &policy());

        assert!(!merged.deleted_note_ids.contains(&n1));
        assert!(!merged.contains_note(n1));
    }

    #[test]
    fn test_remote_tombstone_removes_local_note() {
        // Local has [N1, N2]; remote has [N2] and a tombstone for N1.
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let local = repository_with_notes(
            vec![note_with_id(id1, "one", 10), note_with_id(id2, "two", 10)],
            10,
        );
        let mut remote = repository_with_notes(vec![note_with_id(id2, "two", 10)], 20);
        remote.deleted_note_ids.push(id1);

        let merged = merge(&local, &remote, t(100), &policy());

        assert_eq!(merged.deleted_note_ids, vec![id1]);
        assert_eq!(merged.notes.len(), 1);
        assert_eq!(merged.notes[0].id, id2);
        assert!(merged.is_consistent());
    }

    #[test]
    fn test_local_tombstone_of_remote_note_propagates() {
        let id1 = Uuid::new_v4();
        let mut local = repository_with_notes(vec![], 10);
        local.deleted_note_ids.push(id1);
        let remote = repository_with_notes(vec![note_with_id(id1, "still here", 5)], 20);

        let merged = merge(&local, &remote, t(100), &policy());

        assert_eq!(merged.deleted_note_ids, vec![id1]);
        assert!(!merged.contains_note(id1));
    }

    #[test]
    fn test_recency_wins_for_matched_notes() {
        let id = Uuid::new_v4();
        let local = repository_with_notes(vec![note_with_id(id, "old", 10)], 10);
        let remote = repository_with_notes(vec![note_with_id(id, "new", 20)], 5);

        let merged = merge(&local, &remote, t(100), &policy());

        assert_eq!(merged.notes[0].content, "new");
    }

    #[test]
    fn test_maintained_at_breaks_modified_ties() {
        let id = Uuid::new_v4();
        let mut local_note = note_with_id(id, "touched", 10);
        local_note.maintained_at = Some(t(95));
        let remote_note = note_with_id(id, "untouched", 10);

        let local = repository_with_notes(vec![local_note], 10);
        let remote = repository_with_notes(vec![remote_note], 20);

        let merged = merge(&local, &remote, t(100), &policy());

        assert_eq!(merged.notes[0].content, "touched");
    }

    #[test]
    fn test_stale_maintained_at_is_cleared_before_merge() {
        let id = Uuid::new_v4();
        let mut local_note = note_with_id(id, "stale touch", 10);
        // Way past the horizon relative to `now`.
        local_note.maintained_at = Some(t(0));
        let remote_note = note_with_id(id, "plain", 10);

        let local = repository_with_notes(vec![local_note], 10);
        let remote = repository_with_notes(vec![remote_note], 20);

        let now = t(0) + Duration::days(30);
        let merged = merge(&local, &remote, now, &policy());

        // With the marker cleared the tie resolves to the primary
        // (remote) copy, and the stale marker is gone from the result.
        assert_eq!(merged.notes[0].content, "plain");
        assert_eq!(merged.notes[0].maintained_at, None);
    }

    #[test]
    fn test_order_follows_most_recent_reorder() {
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let local = repository_with_notes(
            vec![note_with_id(id1, "a", 1), note_with_id(id2, "b", 1)],
            // Local reordered most recently.
            50,
        );
        let remote = repository_with_notes(
            vec![note_with_id(id2, "b", 1), note_with_id(id1, "a", 1)],
            20,
        );

        let merged = merge(&local, &remote, t(100), &policy());

        let ids: Vec<Uuid> = merged.notes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![id1, id2]);
        assert_eq!(merged.order_modified_at, t(50));
        // Identity still follows the remote lineage.
        assert_eq!(merged.id, remote.id);
    }

    #[test]
    fn test_one_sided_runs_keep_their_order() {
        let shared = Uuid::new_v4();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();

        // Primary: [p1, shared, p2]; secondary: [s1, shared, s2].
        let remote = repository_with_notes(
            vec![
                note_with_id(p1, "p1", 1),
                note_with_id(shared, "shared", 1),
                note_with_id(p2, "p2", 1),
            ],
            50,
        );
        let local = repository_with_notes(
            vec![
                note_with_id(s1, "s1", 1),
                note_with_id(shared, "shared", 1),
                note_with_id(s2, "s2", 1),
            ],
            10,
        );

        let merged = merge(&local, &remote, t(100), &policy());

        let ids: Vec<Uuid> = merged.notes.iter().map(|n| n.id).collect();
        // The secondary-only run before the match lands before it, the
        // trailing run after; the primary's relative order is intact.
        assert_eq!(ids, vec![p1, s1, shared, p2, s2]);
        assert!(merged.is_consistent());
    }

    #[test]
    fn test_merge_emits_no_duplicates_for_crossed_orderings() {
        // Orderings that disagree about every relative position.
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let remote = repository_with_notes(
            vec![
                note_with_id(a, "a", 1),
                note_with_id(b, "b", 1),
                note_with_id(c, "c", 1),
            ],
            50,
        );
        let local = repository_with_notes(
            vec![
                note_with_id(c, "c", 1),
                note_with_id(b, "b", 1),
                note_with_id(a, "a", 1),
            ],
            10,
        );

        let merged = merge(&local, &remote, t(100), &policy());

        let mut ids: Vec<Uuid> = merged.notes.iter().map(|n| n.id).collect();
        assert_eq!(ids.len(), 3);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        // Primary (remote) order drives the result.
        let ordered: Vec<Uuid> = merged.notes.iter().map(|n| n.id).collect();
        assert_eq!(ordered, vec![a, b, c]);
    }

    #[test]
    fn test_unreferenced_safes_are_pruned() {
        let keep = Safe::new(t(1));
        let drop = Safe::new(t(1));
        let mut note = note_with_id(Uuid::new_v4(), "locked", 1);
        note.safe_id = Some(keep.id);

        let mut local = repository_with_notes(vec![note], 10);
        local.safes = vec![keep.clone(), drop.clone()];
        let remote = repository_with_notes(vec![], 5);

        let merged = merge(&local, &remote, t(100), &policy());

        assert_eq!(merged.safes.len(), 1);
        assert_eq!(merged.safes[0].id, keep.id);
    }

    #[test]
    fn test_safes_merge_by_recency() {
        let id = Uuid::new_v4();
        let older = Safe {
            id,
            modified_at: t(10),
            maintained_at: None,
        };
        let newer = Safe {
            id,
            modified_at: t(20),
            maintained_at: None,
        };
        let mut note = note_with_id(Uuid::new_v4(), "locked", 1);
        note.safe_id = Some(id);

        let mut local = repository_with_notes(vec![note], 10);
        local.safes = vec![older];
        let mut remote = repository_with_notes(vec![], 20);
        remote.safes = vec![newer.clone()];

        let merged = merge(&local, &remote, t(100), &policy());

        assert_eq!(merged.safes, vec![newer]);
    }

    #[test]
    fn test_result_revision_is_newest_supported() {
        let local = repository_with_notes(vec![], 10);
        let mut remote = repository_with_notes(vec![], 20);
        remote.revision = 1;

        let merged = merge(&local, &remote, t(100), &policy());

        assert_eq!(merged.revision, NEWEST_SUPPORTED_REVISION);
    }
}
