//! Storage port — the capability interface for credential and session
//! persistence.
//!
//! Every backend (indexed `SQLite`, in-memory, key-value) implements
//! [`StorageAdapter`] with the same observable semantics, so callers can swap
//! backends without changing code.
//!
//! ## Consistency
//! Each method runs as its own storage transaction. There is no atomicity
//! across calls: [`StorageAdapter::update`] is a read followed by a write and
//! two concurrent updates of the same credential may lose one of the changes,
//! and [`StorageAdapter::clear`] removes credentials and the session in two
//! separate steps.
//!
//! No method times out. Callers needing a deadline wrap the returned future
//! (e.g. with `tokio::time::timeout`).

use std::future::Future;
use std::sync::Arc;

use sakit_domain::credential::{CredentialUpdate, StoredCredential};
use sakit_domain::error::StorageError;
use sakit_domain::id::{ContractId, CredentialId};
use sakit_domain::session::StoredSession;

/// Durable storage for credentials and the active session.
pub trait StorageAdapter {
    /// Insert or replace a credential, keyed by its `credential_id`.
    fn save(
        &self,
        credential: StoredCredential,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Get a credential by id. A missing credential is `Ok(None)`.
    fn get(
        &self,
        id: &CredentialId,
    ) -> impl Future<Output = Result<Option<StoredCredential>, StorageError>> + Send;

    /// Get every credential owned by `contract_id`.
    fn get_by_contract(
        &self,
        contract_id: &ContractId,
    ) -> impl Future<Output = Result<Vec<StoredCredential>, StorageError>> + Send;

    /// Get all credentials.
    fn get_all(&self) -> impl Future<Output = Result<Vec<StoredCredential>, StorageError>> + Send;

    /// Delete a credential. Deleting a missing id is a no-op.
    fn delete(&self, id: &CredentialId) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Merge `update` over the stored credential. A missing id is a no-op:
    /// nothing is created and no error is returned.
    fn update(
        &self,
        id: &CredentialId,
        update: CredentialUpdate,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Delete every credential, then clear the session.
    fn clear(&self) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Replace the active session.
    fn save_session(
        &self,
        session: StoredSession,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Get the active session, if any.
    fn get_session(
        &self,
    ) -> impl Future<Output = Result<Option<StoredSession>, StorageError>> + Send;

    /// Remove the active session. Clearing an absent session is a no-op.
    fn clear_session(&self) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Release the underlying connection. The next operation reopens it.
    fn close(&self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

impl<T: StorageAdapter + Send + Sync> StorageAdapter for Arc<T> {
    fn save(
        &self,
        credential: StoredCredential,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).save(credential)
    }

    fn get(
        &self,
        id: &CredentialId,
    ) -> impl Future<Output = Result<Option<StoredCredential>, StorageError>> + Send {
        (**self).get(id)
    }

    fn get_by_contract(
        &self,
        contract_id: &ContractId,
    ) -> impl Future<Output = Result<Vec<StoredCredential>, StorageError>> + Send {
        (**self).get_by_contract(contract_id)
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<StoredCredential>, StorageError>> + Send {
        (**self).get_all()
    }

    fn delete(&self, id: &CredentialId) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).delete(id)
    }

    fn update(
        &self,
        id: &CredentialId,
        update: CredentialUpdate,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).update(id, update)
    }

    fn clear(&self) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).clear()
    }

    fn save_session(
        &self,
        session: StoredSession,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).save_session(session)
    }

    fn get_session(
        &self,
    ) -> impl Future<Output = Result<Option<StoredSession>, StorageError>> + Send {
        (**self).get_session()
    }

    fn clear_session(&self) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).clear_session()
    }

    fn close(&self) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).close()
    }
}
