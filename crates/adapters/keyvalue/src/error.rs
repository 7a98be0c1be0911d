//! Key-value specific error type.

use std::path::PathBuf;

use sakit_domain::error::StorageError;

/// Errors originating from a key-value engine or its stored documents.
#[derive(Debug, thiserror::Error)]
pub enum KeyValueError {
    /// The storage directory cannot be created or used.
    #[error("cannot prepare storage directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading, writing or removing the file of a key failed.
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored document is not valid JSON for its key.
    #[error("invalid document under `{key}`: {source}")]
    Document {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<KeyValueError> for StorageError {
    fn from(err: KeyValueError) -> Self {
        match err {
            KeyValueError::Directory { .. } => Self::unavailable(err),
            _ => Self::operation(err),
        }
    }
}
