//! Store error types

use thiserror::Error;

/// Errors surfaced by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same id already exists in the collection
    #[error("record already exists: {collection}/{id}")]
    Duplicate { collection: String, id: String },

    /// No record with that id in the collection
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Compare-and-swap failed: the stored version moved past the one the
    /// caller read
    #[error("version conflict on {collection}/{id}: expected version {expected}")]
    VersionConflict {
        collection: String,
        id: String,
        expected: u64,
    },

    /// Underlying SQLite failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Record body could not be (de)serialized
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Filesystem failure while preparing the database path
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True when the failure is a lost optimistic-concurrency race and the
    /// caller should re-read and re-apply.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}
