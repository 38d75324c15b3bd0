//! Change notifications published by the store.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::models::Reminder;

/// One notification on a subscription stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Always the first event: the complete sorted collection.
    Initial(Arc<Vec<Reminder>>),
    /// Every later event: what moved between two consecutive snapshots.
    Update(ChangeSet),
}

impl ChangeEvent {
    pub fn snapshot(&self) -> &[Reminder] {
        match self {
            ChangeEvent::Initial(snapshot) => snapshot,
            ChangeEvent::Update(changes) => &changes.snapshot,
        }
    }
}

/// Positional description of one step from an old snapshot to a new one.
///
/// `removed` indexes the old snapshot; `inserted` and `changed` index the new
/// one. All three lists are ascending and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub snapshot: Arc<Vec<Reminder>>,
    pub removed: Vec<usize>,
    pub inserted: Vec<usize>,
    pub changed: Vec<usize>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.inserted.is_empty() && self.changed.is_empty()
    }
}

/// Compute the change set between two id-descending snapshots with a single
/// merge walk. Ids present only in `old` are removals, ids present only in
/// `new` are insertions, and shared ids whose value differs are changes.
pub fn diff(old: &[Reminder], new: Arc<Vec<Reminder>>) -> ChangeSet {
    let mut removed = Vec::new();
    let mut inserted = Vec::new();
    let mut changed = Vec::new();

    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        // Descending order: the larger id comes first.
        match old[i].id.cmp(&new[j].id) {
            Ordering::Greater => {
                removed.push(i);
                i += 1;
            }
            Ordering::Less => {
                inserted.push(j);
                j += 1;
            }
            Ordering::Equal => {
                if old[i] != new[j] {
                    changed.push(j);
                }
                i += 1;
                j += 1;
            }
        }
    }
    removed.extend(i..old.len());
    inserted.extend(j..new.len());

    ChangeSet {
        snapshot: new,
        removed,
        inserted,
        changed,
    }
}
