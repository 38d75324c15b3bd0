use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{DbContext, StoreError};
use crate::models::{Reminder, ReminderFields, ReminderId};

const SELECT_COLUMNS: &str =
    "SELECT id, title, description, scheduled_at, repeat_interval FROM reminders";

/// Retrieve every reminder, newest first. This ordering is the one the store
/// publishes and the reconciler mirrors.
pub fn fetch_reminders(conn: &Connection) -> Result<Vec<Reminder>, StoreError> {
    let mut stmt = conn
        .prepare_cached(&format!("{SELECT_COLUMNS} ORDER BY id DESC"))
        .db("prepare reminder query")?;

    let reminders = stmt
        .query_map([], reminder_from_row)
        .db("load reminders")?
        .collect::<Result<Vec<_>, _>>()
        .db("collect reminders")?;

    Ok(reminders)
}

/// Point lookup. A missing id is `None`, not an error.
pub fn fetch_reminder(conn: &Connection, id: ReminderId) -> Result<Option<Reminder>, StoreError> {
    let mut stmt = conn
        .prepare_cached(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
        .db("prepare reminder lookup")?;

    let reminder = stmt
        .query_row(params![id], reminder_from_row)
        .optional()
        .db("look up reminder")?;

    Ok(reminder)
}

/// Insert a new row and echo back the hydrated reminder.
pub fn insert_reminder(conn: &Connection, fields: ReminderFields) -> Result<Reminder, StoreError> {
    conn.execute(
        "INSERT INTO reminders (title, description, scheduled_at, repeat_interval)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            fields.title,
            fields.description,
            fields.scheduled_at.timestamp_millis(),
            fields.repeat
        ],
    )
    .db("insert reminder")?;

    let id = ReminderId(conn.last_insert_rowid());
    Ok(Reminder::from_fields(id, fields))
}

/// Replace every mutable field. Returns the number of rows touched so the
/// caller can tell a real update from a vanished record.
pub fn update_reminder(
    conn: &Connection,
    id: ReminderId,
    fields: &ReminderFields,
) -> Result<usize, StoreError> {
    conn.execute(
        "UPDATE reminders
         SET title = ?1, description = ?2, scheduled_at = ?3, repeat_interval = ?4
         WHERE id = ?5",
        params![
            fields.title,
            fields.description,
            fields.scheduled_at.timestamp_millis(),
            fields.repeat,
            id
        ],
    )
    .db("update reminder")
}

pub fn delete_reminder(conn: &Connection, id: ReminderId) -> Result<usize, StoreError> {
    conn.execute("DELETE FROM reminders WHERE id = ?1", params![id])
        .db("delete reminder")
}

fn reminder_from_row(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let millis: i64 = row.get(3)?;
    let scheduled_at = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Integer,
            format!("timestamp {millis} is out of range").into(),
        )
    })?;

    Ok(Reminder {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        scheduled_at,
        repeat: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::db::ensure_schema;
    use crate::models::RepeatInterval;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    fn fields(title: &str) -> ReminderFields {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        ReminderFields::new(title, "desc", at, RepeatInterval::Monthly)
    }

    #[test]
    fn reminders_come_back_newest_first() {
        let conn = memory_db();
        let first = insert_reminder(&conn, fields("first")).unwrap();
        let second = insert_reminder(&conn, fields("second")).unwrap();

        let all = fetch_reminders(&conn).unwrap();

        assert_eq!(all, vec![second, first]);
    }

    #[test]
    fn deleted_ids_are_not_reused() {
        let conn = memory_db();
        let first = insert_reminder(&conn, fields("first")).unwrap();
        delete_reminder(&conn, first.id).unwrap();
        let second = insert_reminder(&conn, fields("second")).unwrap();

        assert!(second.id > first.id);
    }

    #[test]
    fn update_and_delete_report_touched_rows() {
        let conn = memory_db();
        let stored = insert_reminder(&conn, fields("first")).unwrap();

        assert_eq!(update_reminder(&conn, stored.id, &fields("renamed")).unwrap(), 1);
        assert_eq!(update_reminder(&conn, ReminderId(999), &fields("x")).unwrap(), 0);
        assert_eq!(
            fetch_reminder(&conn, stored.id).unwrap().map(|r| r.title),
            Some("renamed".to_string())
        );
        assert_eq!(delete_reminder(&conn, stored.id).unwrap(), 1);
        assert_eq!(delete_reminder(&conn, stored.id).unwrap(), 0);
        assert_eq!(fetch_reminder(&conn, stored.id).unwrap(), None);
    }

    #[test]
    fn corrupt_repeat_ordinal_fails_the_read() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO reminders (title, description, scheduled_at, repeat_interval)
             VALUES ('t', 'd', 0, 9)",
            [],
        )
        .unwrap();

        assert!(matches!(
            fetch_reminders(&conn),
            Err(StoreError::Database { .. })
        ));
    }
}
