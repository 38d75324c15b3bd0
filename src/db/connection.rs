use std::fs;
use std::path::Path;

use rusqlite::Connection;

use crate::error::{DbContext, StoreError};

/// Open (or create) the SQLite file at `path`, creating parent directories
/// on the way, and make sure the schema exists.
pub fn open_database(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StoreError::DataDir {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let conn = Connection::open(path).db("open SQLite database")?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Run the lazy migration. `AUTOINCREMENT` matters here: it keeps ids
/// strictly increasing and never reuses the id of a deleted row, so sorting
/// by id descending always lists the newest reminder first.
pub fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS reminders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            scheduled_at INTEGER NOT NULL,
            repeat_interval INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )
    .db("create reminders table")?;

    Ok(())
}
