//! Domain models that mirror the SQLite schema and get passed between the
//! store, the reconciler and the TUI. These stay plain data holders; the
//! display-only projection lives in `reconcile::ReminderRow` so nothing that
//! is never persisted ends up on the entity.

use std::fmt;

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveTime, SubsecRound, TimeZone, Utc,
};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use thiserror::Error;

/// Labels for every repeat option, in ordinal order. The index into this list
/// is the only representation that reaches the database.
pub const REPEAT_OPTIONS: [&str; 5] = ["Does not repeat", "Daily", "Weekly", "Monthly", "Yearly"];

/// Store-assigned primary key. SQLite `AUTOINCREMENT` hands these out in
/// increasing order and never reuses them, which is what makes "descending
/// id" equivalent to "newest first".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReminderId(pub i64);

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl ToSql for ReminderId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for ReminderId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(ReminderId)
    }
}

/// How often a reminder repeats. Display-only: nothing schedules recurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatInterval {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Raised when an ordinal does not point into [`REPEAT_OPTIONS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("repeat option {0} is out of range (expected 0..{len})", len = REPEAT_OPTIONS.len())]
pub struct RepeatIndexError(pub i64);

impl RepeatInterval {
    /// Every variant in ordinal order.
    pub const ALL: [RepeatInterval; 5] = [
        RepeatInterval::None,
        RepeatInterval::Daily,
        RepeatInterval::Weekly,
        RepeatInterval::Monthly,
        RepeatInterval::Yearly,
    ];

    /// Position of this option in [`REPEAT_OPTIONS`].
    pub fn index(self) -> usize {
        match self {
            RepeatInterval::None => 0,
            RepeatInterval::Daily => 1,
            RepeatInterval::Weekly => 2,
            RepeatInterval::Monthly => 3,
            RepeatInterval::Yearly => 4,
        }
    }

    pub fn label(self) -> &'static str {
        REPEAT_OPTIONS[self.index()]
    }

    /// Cycle to the neighbouring option, wrapping at both ends. The form uses
    /// this for the left/right arrow keys.
    pub fn step(self, offset: isize) -> Self {
        let len = Self::ALL.len() as isize;
        let next = (self.index() as isize + offset).rem_euclid(len);
        Self::ALL[next as usize]
    }
}

impl TryFrom<i64> for RepeatInterval {
    type Error = RepeatIndexError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or(RepeatIndexError(value))
    }
}

impl fmt::Display for RepeatInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl ToSql for RepeatInterval {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.index() as i64))
    }
}

impl FromSql for RepeatInterval {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        RepeatInterval::try_from(raw).map_err(|_| FromSqlError::OutOfRange(raw))
    }
}

/// The full set of mutable fields. Creates and updates always carry every
/// field; there is no partial patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderFields {
    pub title: String,
    pub description: String,
    /// Absolute instant, truncated to milliseconds because that is the
    /// resolution the database keeps.
    pub scheduled_at: DateTime<Utc>,
    pub repeat: RepeatInterval,
}

impl ReminderFields {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        repeat: RepeatInterval,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            scheduled_at: scheduled_at.trunc_subsecs(3),
            repeat,
        }
    }

    /// Build fields from a calendar date and a wall-clock time in `tz`.
    pub fn at_local<Tz: TimeZone>(
        title: impl Into<String>,
        description: impl Into<String>,
        tz: &Tz,
        date: NaiveDate,
        time: NaiveTime,
        repeat: RepeatInterval,
    ) -> Self {
        Self::new(title, description, resolve_local(tz, date, time), repeat)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A persisted reminder as returned by the store.
pub struct Reminder {
    pub id: ReminderId,
    pub title: String,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub repeat: RepeatInterval,
}

impl Reminder {
    /// Attach a store-assigned id to a set of fields.
    pub fn from_fields(id: ReminderId, fields: ReminderFields) -> Self {
        Self {
            id,
            title: fields.title,
            description: fields.description,
            scheduled_at: fields.scheduled_at,
            repeat: fields.repeat,
        }
    }

    /// Copy the mutable fields back out, e.g. to prefill the edit form.
    pub fn fields(&self) -> ReminderFields {
        ReminderFields {
            title: self.title.clone(),
            description: self.description.clone(),
            scheduled_at: self.scheduled_at,
            repeat: self.repeat,
        }
    }
}

/// Combine a date and a wall-clock time in `tz` into an absolute instant.
///
/// Ambiguous times (clocks going back) pick the earlier instant. Times that
/// fall into a gap (clocks going forward) are pushed one hour ahead; if even
/// that does not exist the wall-clock value is read as UTC.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(at) | LocalResult::Ambiguous(at, _) => at.with_timezone(&Utc),
        LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(at) | LocalResult::Ambiguous(at, _) => at.with_timezone(&Utc),
            LocalResult::None => Utc.from_utc_datetime(&naive),
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;

    #[test]
    fn repeat_ordinals_follow_option_list() {
        for (idx, option) in RepeatInterval::ALL.iter().enumerate() {
            assert_eq!(option.index(), idx);
            assert_eq!(option.label(), REPEAT_OPTIONS[idx]);
            assert_eq!(RepeatInterval::try_from(idx as i64), Ok(*option));
        }
        assert_eq!(RepeatInterval::default().label(), "Does not repeat");
    }

    #[test]
    fn out_of_range_ordinal_is_rejected() {
        assert_eq!(RepeatInterval::try_from(5), Err(RepeatIndexError(5)));
        assert_eq!(RepeatInterval::try_from(-1), Err(RepeatIndexError(-1)));
    }

    #[test]
    fn step_wraps_both_directions() {
        assert_eq!(RepeatInterval::None.step(-1), RepeatInterval::Yearly);
        assert_eq!(RepeatInterval::Yearly.step(1), RepeatInterval::None);
        assert_eq!(RepeatInterval::Daily.step(2), RepeatInterval::Monthly);
    }

    #[test]
    fn local_date_and_time_resolve_against_zone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();

        let at = resolve_local(&tz, date, time);

        assert_eq!(at.to_rfc3339(), "2024-03-01T07:30:00+00:00");
    }

    #[test]
    fn fields_drop_sub_millisecond_precision() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let fields = ReminderFields::new("t", "d", at, RepeatInterval::Weekly);
        assert_eq!(fields.scheduled_at.timestamp_subsec_nanos(), 123_000_000);
    }
}
