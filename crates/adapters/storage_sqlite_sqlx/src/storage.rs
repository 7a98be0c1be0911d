//! `SQLite` implementation of [`StorageAdapter`].

use sakit_app::ports::StorageAdapter;
use sakit_domain::credential::{CredentialUpdate, StoredCredential};
use sakit_domain::error::StorageError;
use sakit_domain::id::{ContractId, CredentialId};
use sakit_domain::session::StoredSession;

use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::{credential_store, session_store};

/// `SQLite`-backed credential and session storage.
///
/// The database is opened on the first operation and shared by every
/// operation after that.
pub struct SqliteStorage {
    connection: ConnectionManager,
}

impl SqliteStorage {
    /// Create a storage for `config` without opening it.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            connection: ConnectionManager::new(config),
        }
    }

    /// Create a storage and open it right away.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] or [`StorageError::Open`] if the
    /// database cannot be opened.
    pub async fn connect(config: Config) -> Result<Self, StorageError> {
        let storage = Self::new(config);
        storage.connection.open().await?;
        Ok(storage)
    }

    /// Lifecycle handle of the underlying database.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Delete the database files. The storage must be closed first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Operation`] if the database is still open or a
    /// file cannot be removed.
    pub async fn destroy(&self) -> Result<(), StorageError> {
        self.connection.destroy().await
    }
}

impl StorageAdapter for SqliteStorage {
    async fn save(&self, credential: StoredCredential) -> Result<(), StorageError> {
        let pool = self.connection.open().await?;
        credential_store::save(&pool, &credential.normalized()).await?;
        Ok(())
    }

    async fn get(&self, id: &CredentialId) -> Result<Option<StoredCredential>, StorageError> {
        let pool = self.connection.open().await?;
        Ok(credential_store::get(&pool, id).await?)
    }

    async fn get_by_contract(
        &self,
        contract_id: &ContractId,
    ) -> Result<Vec<StoredCredential>, StorageError> {
        let pool = self.connection.open().await?;
        Ok(credential_store::get_by_contract(&pool, contract_id).await?)
    }

    async fn get_all(&self) -> Result<Vec<StoredCredential>, StorageError> {
        let pool = self.connection.open().await?;
        Ok(credential_store::get_all(&pool).await?)
    }

    async fn delete(&self, id: &CredentialId) -> Result<(), StorageError> {
        let pool = self.connection.open().await?;
        credential_store::delete(&pool, id).await?;
        Ok(())
    }

    async fn update(&self, id: &CredentialId, update: CredentialUpdate) -> Result<(), StorageError> {
        let pool = self.connection.open().await?;
        let Some(mut credential) = credential_store::get(&pool, id).await? else {
            return Ok(());
        };
        credential.apply(update);
        credential_store::save(&pool, &credential).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let pool = self.connection.open().await?;
        credential_store::clear(&pool).await?;
        session_store::clear(&pool).await?;
        Ok(())
    }

    async fn save_session(&self, session: StoredSession) -> Result<(), StorageError> {
        let pool = self.connection.open().await?;
        session_store::save(&pool, &session.normalized()).await?;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<StoredSession>, StorageError> {
        let pool = self.connection.open().await?;
        Ok(session_store::get(&pool).await?)
    }

    async fn clear_session(&self) -> Result<(), StorageError> {
        let pool = self.connection.open().await?;
        session_store::clear(&pool).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.connection.close().await;
        Ok(())
    }
}
