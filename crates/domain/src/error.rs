//! Common error types used across the workspace.
//!
//! Each adapter defines its own typed error and converts it into
//! [`StorageError`] at the port boundary. A record that does not exist is
//! never an error: lookups return `Option` and deletes/updates are no-ops.

/// Boxed source error carried by [`StorageError`] variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by any storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The host environment lacks the storage engine or location.
    ///
    /// Fatal for the adapter instance: callers should fall back to another
    /// backend.
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] BoxError),

    /// Opening the database or migrating its schema failed.
    ///
    /// The failure is not cached, the next operation retries the open.
    #[error("failed to open storage: {0}")]
    Open(#[source] BoxError),

    /// A single storage transaction failed.
    #[error("storage operation failed: {0}")]
    Operation(#[source] BoxError),
}

impl StorageError {
    /// Wrap an adapter error as [`StorageError::Unavailable`].
    pub fn unavailable(err: impl Into<BoxError>) -> Self {
        Self::Unavailable(err.into())
    }

    /// Wrap an adapter error as [`StorageError::Open`].
    pub fn open(err: impl Into<BoxError>) -> Self {
        Self::Open(err.into())
    }

    /// Wrap an adapter error as [`StorageError::Operation`].
    pub fn operation(err: impl Into<BoxError>) -> Self {
        Self::Operation(err.into())
    }
}

/// Domain invariant violations raised by record builders.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A credential identifier must not be empty.
    #[error("credential id must not be empty")]
    EmptyCredentialId,

    /// A contract identifier must not be empty.
    #[error("contract id must not be empty")]
    EmptyContractId,

    /// A required builder field was never set.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A metadata key collides with a serialized record field.
    #[error("metadata key `{0}` is reserved")]
    ReservedMetadataKey(String),
}
