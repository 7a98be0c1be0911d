//! Storage-specific error type wrapping sqlx errors.

use std::path::PathBuf;

use sakit_domain::error::StorageError;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    /// A query or connection failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failed to (de)serialize a stored JSON value.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The directory holding the database file cannot be created or used.
    #[error("cannot prepare database directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database file was written by a newer schema.
    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: i64, supported: i64 },

    /// The database cannot be destroyed while a connection is open.
    #[error("database is still open; close it before destroying")]
    DatabaseInUse,

    /// Failed to remove a database file.
    #[error("cannot remove database file {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored timestamp does not fit the supported range.
    #[error("stored timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
}

impl From<SqliteError> for StorageError {
    fn from(err: SqliteError) -> Self {
        Self::operation(err)
    }
}
