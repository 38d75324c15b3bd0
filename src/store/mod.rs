//! The reminder store: CRUD over the `reminders` table plus live
//! subscriptions that describe every committed write as a positional
//! [`ChangeSet`].
//!
//! Writes are serialized behind one mutex and published while it is still
//! held, so every subscriber observes the same order, and that order is the
//! commit order. Blocking SQLite work runs on the tokio blocking pool; callers
//! simply `.await` the operation.

mod changes;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::db::{
    delete_reminder, ensure_schema, fetch_reminder, fetch_reminders, insert_reminder,
    open_database, update_reminder,
};
use crate::error::{DbContext, StoreError};
use crate::models::{Reminder, ReminderFields, ReminderId};

pub use changes::{diff, ChangeEvent, ChangeSet};

#[cfg(test)]
pub(crate) use changes::tests as fixtures;

/// Cloneable handle to the store. Every clone talks to the same connection
/// and the same set of subscribers.
#[derive(Clone)]
pub struct ReminderStore {
    state: Arc<Mutex<StoreState>>,
}

struct StoreState {
    conn: Connection,
    /// The last snapshot published, used as the base for the next diff.
    snapshot: Arc<Vec<Reminder>>,
    subscribers: Vec<UnboundedSender<ChangeEvent>>,
}

/// Receiving half of a subscription. Dropping it unsubscribes.
pub struct ChangeStream {
    rx: UnboundedReceiver<ChangeEvent>,
    closed: bool,
}

impl ChangeStream {
    fn new(rx: UnboundedReceiver<ChangeEvent>) -> Self {
        Self { rx, closed: false }
    }

    /// Wait for the next event. `None` once every store handle is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        let event = self.rx.recv().await;
        self.closed = event.is_none();
        event
    }

    /// Non-blocking poll used by the terminal loop between frames. `None`
    /// means nothing is pending; check [`ChangeStream::is_closed`] to tell
    /// that apart from a store that has gone away.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// True once a poll has drained every buffered event and found no store
    /// handle left to send more.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ReminderStore {
    /// Open the database file at `path`, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = open_database(path)?;
        info!(path = %path.display(), "opened reminder database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().db("open in-memory database")?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection, running the migration first.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        ensure_schema(&conn)?;
        let snapshot = Arc::new(fetch_reminders(&conn)?);
        Ok(Self {
            state: Arc::new(Mutex::new(StoreState {
                conn,
                snapshot,
                subscribers: Vec::new(),
            })),
        })
    }

    /// Persist a new reminder and return it with its assigned id.
    pub async fn create(&self, fields: ReminderFields) -> Result<Reminder, StoreError> {
        let reminder = self
            .run(move |state| state.write(|conn| insert_reminder(conn, fields)))
            .await?;
        info!(id = reminder.id.0, "created reminder");
        Ok(reminder)
    }

    pub async fn get(&self, id: ReminderId) -> Result<Option<Reminder>, StoreError> {
        self.run(move |state| fetch_reminder(&state.conn, id)).await
    }

    /// Replace every mutable field of `id`. Returns `false` without touching
    /// anything when the record no longer exists.
    pub async fn update(&self, id: ReminderId, fields: ReminderFields) -> Result<bool, StoreError> {
        let touched = self
            .run(move |state| state.write(|conn| update_reminder(conn, id, &fields)))
            .await?;
        if touched == 0 {
            debug!(id = id.0, "update skipped, reminder no longer exists");
        } else {
            info!(id = id.0, "updated reminder");
        }
        Ok(touched > 0)
    }

    /// Remove `reminder`, re-resolving it by id since the caller's copy may be
    /// stale. Returns `false` if it was already gone.
    pub async fn delete(&self, reminder: &Reminder) -> Result<bool, StoreError> {
        let id = reminder.id;
        let touched = self
            .run(move |state| state.write(|conn| delete_reminder(conn, id)))
            .await?;
        if touched == 0 {
            debug!(id = id.0, "delete skipped, reminder already gone");
        } else {
            info!(id = id.0, "deleted reminder");
        }
        Ok(touched > 0)
    }

    /// Start a subscription. The first event is always
    /// [`ChangeEvent::Initial`] with the current sorted collection.
    pub fn subscribe(&self) -> Result<ChangeStream, StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive right here, so this send cannot fail.
        let _ = tx.send(ChangeEvent::Initial(Arc::clone(&state.snapshot)));
        state.subscribers.push(tx);
        debug!(subscribers = state.subscribers.len(), "new subscription");
        Ok(ChangeStream::new(rx))
    }

    /// Number of subscribers still registered. Dropped streams are pruned on
    /// the next published change.
    pub fn subscriber_count(&self) -> Result<usize, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.subscribers.len())
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut StoreState) -> Result<T, StoreError> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || {
            let mut guard = state.lock().map_err(|_| StoreError::Poisoned)?;
            op(&mut guard)
        })
        .await?
    }
}

impl StoreState {
    /// Run `op` in a transaction together with the re-query of the sorted
    /// collection, then publish the difference. Any failure rolls the whole
    /// thing back and publishes nothing.
    fn write<T>(
        &mut self,
        op: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self.conn.transaction().db("begin transaction")?;
        let out = op(&tx)?;
        let snapshot = Arc::new(fetch_reminders(&tx)?);
        tx.commit().db("commit transaction")?;

        self.publish(snapshot);
        Ok(out)
    }

    fn publish(&mut self, snapshot: Arc<Vec<Reminder>>) {
        let changes = diff(&self.snapshot, Arc::clone(&snapshot));
        self.snapshot = snapshot;
        if changes.is_empty() {
            return;
        }

        debug!(
            removed = ?changes.removed,
            inserted = ?changes.inserted,
            changed = ?changes.changed,
            "publishing change set"
        );
        self.subscribers
            .retain(|tx| tx.send(ChangeEvent::Update(changes.clone())).is_ok());
    }
}
