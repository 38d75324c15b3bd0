//! Client-side mirror of the store's sorted collection.
//!
//! [`ReminderList`] applies each [`ChangeEvent`] in place instead of swapping the
//! whole vector, so rows that did not change keep their slot (and whatever
//! selection the UI has pinned to it).

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, Utc};
use thiserror::Error;
use tracing::{error, trace};

use crate::models::{Reminder, ReminderId};
use crate::store::{ChangeEvent, ChangeSet};

/// Renders the scheduled instant for list rows.
#[derive(Debug, Clone)]
pub struct DateTimeFormat {
    pattern: String,
    /// `None` renders in the system's local zone.
    offset: Option<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date format {0:?}")]
pub struct InvalidDateFormat(pub String);

impl DateTimeFormat {
    /// Same shape as `yyyy-MM-dd hh:mm a`.
    pub const DEFAULT_PATTERN: &'static str = "%Y-%m-%d %I:%M %p";

    pub fn new(pattern: impl Into<String>) -> Result<Self, InvalidDateFormat> {
        let pattern = pattern.into();
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(InvalidDateFormat(pattern));
        }
        Ok(Self {
            pattern,
            offset: None,
        })
    }

    /// Pin rendering to a fixed UTC offset instead of the local zone.
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn format(&self, at: &DateTime<Utc>) -> String {
        match self.offset {
            Some(offset) => at.with_timezone(&offset).format(&self.pattern).to_string(),
            None => at.with_timezone(&Local).format(&self.pattern).to_string(),
        }
    }
}

impl Default for DateTimeFormat {
    fn default() -> Self {
        Self {
            pattern: Self::DEFAULT_PATTERN.to_string(),
            offset: None,
        }
    }
}

/// A reminder plus its display text. The text is computed when the row is
/// placed into the list and is replaced together with the reminder.
#[derive(Debug, Clone)]
pub struct ReminderRow {
    reminder: Reminder,
    when: String,
}

impl ReminderRow {
    pub fn reminder(&self) -> &Reminder {
        &self.reminder
    }

    pub fn when(&self) -> &str {
        &self.when
    }
}

/// Ways an update event can fail to line up with the local collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("removed position {position} is out of range for {len} rows")]
    RemovedOutOfRange { position: usize, len: usize },
    #[error("inserted position {position} is out of range for a snapshot of {len}")]
    InsertedOutOfRange { position: usize, len: usize },
    #[error("changed position {position} is out of range for a snapshot of {len}")]
    ChangedOutOfRange { position: usize, len: usize },
    #[error("applying the event would leave {actual} rows, snapshot has {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    /// The positions were in range but the result still differs from the
    /// snapshot. The list has already been resynced when this is returned.
    #[error("rows diverged from the snapshot at position {position}")]
    Diverged { position: usize },
}

/// Ordered view collection kept identical to the store's sorted reminders.
pub struct ReminderList {
    rows: Vec<ReminderRow>,
    format: DateTimeFormat,
    loaded: bool,
}

impl ReminderList {
    pub fn new(format: DateTimeFormat) -> Self {
        Self {
            rows: Vec::new(),
            format,
            loaded: false,
        }
    }

    /// `false` until the first [`ChangeEvent::Initial`] arrives.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn rows(&self) -> &[ReminderRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ReminderRow> {
        self.rows.get(index)
    }

    pub fn position(&self, id: ReminderId) -> Option<usize> {
        self.rows.iter().position(|row| row.reminder.id == id)
    }

    pub fn reminders(&self) -> impl Iterator<Item = &Reminder> {
        self.rows.iter().map(|row| &row.reminder)
    }

    /// Apply one event. Malformed events trip a debug assertion; release
    /// builds log them and fall back to the event's full snapshot.
    pub fn apply(&mut self, event: &ChangeEvent) {
        if let Err(err) = self.try_apply(event) {
            error!(%err, "malformed change event, resyncing from snapshot");
            debug_assert!(false, "malformed change event: {err}");
            self.resync(event.snapshot());
        }
    }

    /// Apply one event, reporting malformed ones instead of asserting.
    ///
    /// Range and length problems are detected before anything is touched, so
    /// a rejected event leaves the rows exactly as they were.
    pub fn try_apply(&mut self, event: &ChangeEvent) -> Result<(), ReconcileError> {
        match event {
            ChangeEvent::Initial(snapshot) => {
                self.resync(snapshot);
                Ok(())
            }
            ChangeEvent::Update(changes) => self.apply_changes(changes),
        }
    }

    /// Throw away the current rows and rebuild them from `snapshot`.
    pub fn resync(&mut self, snapshot: &[Reminder]) {
        self.rows = snapshot
            .iter()
            .map(|reminder| project(&self.format, reminder))
            .collect();
        self.loaded = true;
    }

    fn apply_changes(&mut self, changes: &ChangeSet) -> Result<(), ReconcileError> {
        let snapshot = changes.snapshot.as_slice();

        // A replayed subscription can report removals against a list that is
        // still empty; there is nothing to remove in that case.
        let mut removed = if self.rows.is_empty() {
            Vec::new()
        } else {
            sorted_unique(&changes.removed)
        };
        let inserted = sorted_unique(&changes.inserted);
        let changed = sorted_unique(&changes.changed);

        validate(self.rows.len(), snapshot.len(), &removed, &inserted, &changed)?;

        // Highest index first, otherwise each removal shifts the rest.
        removed.reverse();
        for position in removed {
            self.rows.remove(position);
        }
        // Lowest index first: positions are already final-snapshot indices.
        for &position in &inserted {
            let row = project(&self.format, &snapshot[position]);
            self.rows.insert(position, row);
        }
        for &position in &changed {
            self.rows[position] = project(&self.format, &snapshot[position]);
        }

        trace!(rows = self.rows.len(), "applied change set");

        if let Some(position) = first_divergence(&self.rows, snapshot) {
            self.resync(snapshot);
            return Err(ReconcileError::Diverged { position });
        }
        Ok(())
    }
}

fn project(format: &DateTimeFormat, reminder: &Reminder) -> ReminderRow {
    ReminderRow {
        reminder: reminder.clone(),
        when: format.format(&reminder.scheduled_at),
    }
}

fn sorted_unique(positions: &[usize]) -> Vec<usize> {
    let mut positions = positions.to_vec();
    positions.sort_unstable();
    positions.dedup();
    positions
}

fn validate(
    current: usize,
    target: usize,
    removed: &[usize],
    inserted: &[usize],
    changed: &[usize],
) -> Result<(), ReconcileError> {
    if let Some(&position) = removed.iter().find(|&&p| p >= current) {
        return Err(ReconcileError::RemovedOutOfRange {
            position,
            len: current,
        });
    }
    if let Some(&position) = inserted.iter().find(|&&p| p >= target) {
        return Err(ReconcileError::InsertedOutOfRange {
            position,
            len: target,
        });
    }
    if let Some(&position) = changed.iter().find(|&&p| p >= target) {
        return Err(ReconcileError::ChangedOutOfRange {
            position,
            len: target,
        });
    }

    let actual = current - removed.len() + inserted.len();
    if actual != target {
        return Err(ReconcileError::LengthMismatch {
            expected: target,
            actual,
        });
    }
    Ok(())
}

fn first_divergence(rows: &[ReminderRow], snapshot: &[Reminder]) -> Option<usize> {
    rows.iter()
        .zip(snapshot)
        .position(|(row, reminder)| row.reminder != *reminder)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::fixtures::{reminder, snapshot, titled};

    fn utc_list() -> ReminderList {
        let format = DateTimeFormat::default().with_offset(FixedOffset::east_opt(0).unwrap());
        ReminderList::new(format)
    }

    fn ids(list: &ReminderList) -> Vec<i64> {
        list.reminders().map(|r| r.id.0).collect()
    }

    fn update(
        snapshot: Arc<Vec<Reminder>>,
        removed: &[usize],
        inserted: &[usize],
        changed: &[usize],
    ) -> ChangeEvent {
        ChangeEvent::Update(ChangeSet {
            snapshot,
            removed: removed.to_vec(),
            inserted: inserted.to_vec(),
            changed: changed.to_vec(),
        })
    }

    fn loaded(ids_in_order: &[i64]) -> ReminderList {
        let mut list = utc_list();
        list.apply(&ChangeEvent::Initial(snapshot(ids_in_order)));
        list
    }

    #[test]
    fn initial_event_loads_newest_first() {
        let mut list = utc_list();
        assert!(!list.is_loaded());

        list.apply(&ChangeEvent::Initial(snapshot(&[3, 2, 1])));

        assert!(list.is_loaded());
        assert_eq!(ids(&list), vec![3, 2, 1]);
    }

    #[test]
    fn initial_event_replaces_whatever_was_there() {
        let mut list = loaded(&[9, 8, 7, 6]);

        list.apply(&ChangeEvent::Initial(snapshot(&[2, 1])));
        assert_eq!(ids(&list), vec![2, 1]);

        list.apply(&ChangeEvent::Initial(snapshot(&[])));
        assert!(list.is_empty());
    }

    #[test]
    fn delete_removes_the_middle_row() {
        let mut list = loaded(&[3, 2, 1]);
        list.apply(&update(snapshot(&[3, 1]), &[1], &[], &[]));
        assert_eq!(ids(&list), vec![3, 1]);
    }

    #[test]
    fn create_inserts_at_the_front() {
        let mut list = loaded(&[3, 1]);
        list.apply(&update(snapshot(&[4, 3, 1]), &[], &[0], &[]));
        assert_eq!(ids(&list), vec![4, 3, 1]);
    }

    #[test]
    fn change_replaces_only_that_slot() {
        let mut list = loaded(&[4, 3, 1]);
        let untouched = list.get(0).unwrap().reminder().clone();
        let next = Arc::new(vec![reminder(4), titled(3, "renamed"), reminder(1)]);

        list.apply(&update(next, &[], &[], &[1]));

        assert_eq!(list.len(), 3);
        assert_eq!(list.get(1).unwrap().reminder().title, "renamed");
        assert_eq!(list.get(0).unwrap().reminder(), &untouched);
        assert_eq!(ids(&list), vec![4, 3, 1]);
    }

    #[test]
    fn removal_and_insertion_in_the_same_event() {
        let mut list = loaded(&[4, 3, 1]);
        list.apply(&update(snapshot(&[5, 4, 3]), &[2], &[0], &[]));
        assert_eq!(ids(&list), vec![5, 4, 3]);
    }

    #[test]
    fn mixed_event_converges_on_the_snapshot() {
        let mut list = loaded(&[8, 7, 6, 5, 4, 3]);
        let next = Arc::new(vec![
            reminder(10),
            reminder(9),
            titled(7, "edited"),
            reminder(5),
            reminder(3),
        ]);

        // 8, 6 and 4 go; 10 and 9 arrive; 7 changes.
        list.apply(&update(Arc::clone(&next), &[0, 2, 4], &[0, 1], &[2]));

        let mirrored: Vec<Reminder> = list.reminders().cloned().collect();
        assert_eq!(mirrored, *next);
    }

    #[test]
    fn unordered_position_lists_are_still_applied_in_order() {
        let mut list = loaded(&[5, 4, 3, 2, 1]);
        list.apply(&update(snapshot(&[7, 5, 6, 3, 1]), &[1, 3], &[2, 0], &[]));
        assert_eq!(ids(&list), vec![7, 5, 6, 3, 1]);
    }

    #[test]
    fn the_other_order_gives_the_wrong_result() {
        let old = vec![5, 4, 3, 2, 1];
        let removed = [1, 3];
        let inserted = [0, 2];
        let expected = vec![7, 5, 6, 3, 1];
        let incoming = |pos: usize| expected[pos];

        // Ascending removals: the second index now points one row too far.
        let mut ascending = old.clone();
        for &pos in &removed {
            ascending.remove(pos);
        }
        assert_eq!(ascending, vec![5, 3, 2]);

        // Insertions before removals: removals hit the freshly inserted rows.
        let mut inserts_first = old.clone();
        for &pos in &inserted {
            inserts_first.insert(pos, incoming(pos));
        }
        for &pos in removed.iter().rev() {
            inserts_first.remove(pos);
        }
        assert_ne!(inserts_first, expected);

        // Descending removals, then ascending insertions.
        let mut list = loaded(&old);
        list.apply(&update(snapshot(&expected), &removed, &inserted, &[]));
        assert_eq!(ids(&list), expected);
    }

    #[test]
    fn removals_against_an_empty_list_are_skipped() {
        let mut list = loaded(&[]);
        list.apply(&update(snapshot(&[1]), &[0], &[0], &[]));
        assert_eq!(ids(&list), vec![1]);
    }

    #[test]
    fn out_of_range_event_is_rejected_untouched() {
        let mut list = loaded(&[3, 2, 1]);

        let err = list
            .try_apply(&update(snapshot(&[3, 2]), &[5], &[], &[]))
            .unwrap_err();
        assert_eq!(err, ReconcileError::RemovedOutOfRange { position: 5, len: 3 });

        let err = list
            .try_apply(&update(snapshot(&[3, 2, 1]), &[], &[], &[3]))
            .unwrap_err();
        assert_eq!(err, ReconcileError::ChangedOutOfRange { position: 3, len: 3 });

        let err = list
            .try_apply(&update(snapshot(&[4, 3, 2, 1]), &[], &[], &[]))
            .unwrap_err();
        assert_eq!(err, ReconcileError::LengthMismatch { expected: 4, actual: 3 });

        assert_eq!(ids(&list), vec![3, 2, 1]);
    }

    #[test]
    fn missed_change_is_caught_and_resynced() {
        let mut list = loaded(&[3, 2, 1]);
        let next = Arc::new(vec![reminder(3), titled(2, "silently edited"), reminder(1)]);

        let err = list.try_apply(&update(next, &[], &[], &[])).unwrap_err();

        assert_eq!(err, ReconcileError::Diverged { position: 1 });
        assert_eq!(list.get(1).unwrap().reminder().title, "silently edited");
    }

    #[test]
    fn display_text_is_computed_on_placement() {
        let list = loaded(&[1]);
        assert_eq!(list.get(0).unwrap().when(), "2024-01-01 12:00 PM");
    }

    #[test]
    fn bad_pattern_is_rejected() {
        assert!(DateTimeFormat::new("%Y-%m-%d %Q").is_err());
        assert_eq!(
            DateTimeFormat::new("%d %b %Y").unwrap().pattern(),
            "%d %b %Y"
        );
    }
}
