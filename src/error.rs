//! Error types shared by the persistence layer and the store.

use thiserror::Error;

/// Failures that abort a single store operation. A failed write never emits a
/// change event.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {action}")]
    Database {
        action: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create data directory {path}")]
    DataDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// A previous writer panicked while holding the connection.
    #[error("reminder store lock was poisoned")]
    Poisoned,
    #[error("reminder store worker stopped unexpectedly")]
    Worker(#[from] tokio::task::JoinError),
}

/// Attach a human-readable action to rusqlite errors, mirroring the
/// `.context("failed to ...")` style used at the application boundary.
pub(crate) trait DbContext<T> {
    fn db(self, action: &'static str) -> Result<T, StoreError>;
}

impl<T> DbContext<T> for rusqlite::Result<T> {
    fn db(self, action: &'static str) -> Result<T, StoreError> {
        self.map_err(|source| StoreError::Database { action, source })
    }
}
