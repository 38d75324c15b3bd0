//! Persistence helpers around the embedded SQLite database. Each function
//! wraps one query or migration; the store in `crate::store` layers change
//! notifications on top.

mod connection;
mod reminders;

pub use connection::{ensure_schema, open_database};
pub use reminders::{
    delete_reminder, fetch_reminder, fetch_reminders, insert_reminder, update_reminder,
};
