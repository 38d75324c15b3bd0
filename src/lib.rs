//! Core library surface for the reminder manager TUI.
//!
//! The store and the reconciler are usable without the terminal front-end:
//! subscribe to a [`ReminderStore`], feed every [`ChangeEvent`] to a
//! [`ReminderList`], and the list stays identical to the stored reminders.
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod ui;

pub use config::AppConfig;
pub use error::StoreError;

/// The domain types other layers manipulate.
pub use models::{Reminder, ReminderFields, ReminderId, RepeatInterval, REPEAT_OPTIONS};

pub use reconcile::{DateTimeFormat, ReconcileError, ReminderList, ReminderRow};
pub use store::{ChangeEvent, ChangeSet, ChangeStream, ReminderStore};

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
