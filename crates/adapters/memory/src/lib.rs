//! # sakit-adapter-memory
//!
//! Volatile [`StorageAdapter`] keeping every record in process memory.
//!
//! Data lives as long as the [`InMemoryStorage`] value; [`close`] does not
//! discard it. Useful for tests and for wallets that must not touch disk.
//!
//! [`close`]: StorageAdapter::close

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sakit_app::ports::StorageAdapter;
use sakit_domain::credential::{CredentialUpdate, StoredCredential};
use sakit_domain::error::StorageError;
use sakit_domain::id::{ContractId, CredentialId};
use sakit_domain::session::StoredSession;

#[derive(Debug, Default)]
struct State {
    credentials: BTreeMap<CredentialId, StoredCredential>,
    session: Option<StoredSession>,
}

impl State {
    fn sorted<'a>(records: impl Iterator<Item = &'a StoredCredential>) -> Vec<StoredCredential> {
        let mut records: Vec<StoredCredential> = records.cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.credential_id.cmp(&b.credential_id))
        });
        records
    }
}

/// In-memory credential and session storage.
///
/// All records sit behind one lock, so [`update`](StorageAdapter::update) is
/// atomic here.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().credentials.len()
    }

    /// Whether no credential is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().credentials.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageAdapter for InMemoryStorage {
    fn save(
        &self,
        credential: StoredCredential,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        let credential = credential.normalized();
        self.lock()
            .credentials
            .insert(credential.credential_id.clone(), credential);
        async { Ok(()) }
    }

    fn get(
        &self,
        id: &CredentialId,
    ) -> impl Future<Output = Result<Option<StoredCredential>, StorageError>> + Send {
        let result = self.lock().credentials.get(id).cloned();
        async { Ok(result) }
    }

    fn get_by_contract(
        &self,
        contract_id: &ContractId,
    ) -> impl Future<Output = Result<Vec<StoredCredential>, StorageError>> + Send {
        let result = State::sorted(
            self.lock()
                .credentials
                .values()
                .filter(|c| &c.contract_id == contract_id),
        );
        async { Ok(result) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<StoredCredential>, StorageError>> + Send {
        let result = State::sorted(self.lock().credentials.values());
        async { Ok(result) }
    }

    fn delete(&self, id: &CredentialId) -> impl Future<Output = Result<(), StorageError>> + Send {
        self.lock().credentials.remove(id);
        async { Ok(()) }
    }

    fn update(
        &self,
        id: &CredentialId,
        update: CredentialUpdate,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        if let Some(credential) = self.lock().credentials.get_mut(id) {
            credential.apply(update);
        }
        async { Ok(()) }
    }

    fn clear(&self) -> impl Future<Output = Result<(), StorageError>> + Send {
        let mut state = self.lock();
        tracing::debug!(count = state.credentials.len(), "clearing in-memory storage");
        state.credentials.clear();
        state.session = None;
        drop(state);
        async { Ok(()) }
    }

    fn save_session(
        &self,
        session: StoredSession,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        self.lock().session = Some(session.normalized());
        async { Ok(()) }
    }

    fn get_session(
        &self,
    ) -> impl Future<Output = Result<Option<StoredSession>, StorageError>> + Send {
        let result = self.lock().session.clone();
        async { Ok(result) }
    }

    fn clear_session(&self) -> impl Future<Output = Result<(), StorageError>> + Send {
        self.lock().session = None;
        async { Ok(()) }
    }

    fn close(&self) -> impl Future<Output = Result<(), StorageError>> + Send {
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sakit_app::testing;

    use super::*;

    async fn setup() -> InMemoryStorage {
        InMemoryStorage::new()
    }

    mod conformance {
        use super::*;

        sakit_app::storage_conformance_tests!(setup());
    }

    #[tokio::test]
    async fn should_keep_records_when_closed() {
        let storage = InMemoryStorage::new();
        storage.save(testing::credential("cred1", "C1", 1000)).await.unwrap();
        storage
            .save_session(testing::session("C1", "cred1", 5000))
            .await
            .unwrap();

        storage.close().await.unwrap();

        assert_eq!(storage.len(), 1);
        assert!(storage.get_session().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn should_apply_every_concurrent_update() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.save(testing::credential("cred1", "C1", 1000)).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .update(
                            &CredentialId::new("cred1"),
                            CredentialUpdate::new().metadata(format!("k{n}"), n),
                        )
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = storage
            .get(&CredentialId::new("cred1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.metadata.len(), 16);
    }

    #[tokio::test]
    async fn should_report_length() {
        let storage = InMemoryStorage::new();
        assert!(storage.is_empty());

        storage.save(testing::credential("a", "C1", 1000)).await.unwrap();
        storage.save(testing::credential("b", "C1", 2000)).await.unwrap();

        assert_eq!(storage.len(), 2);
        storage.clear().await.unwrap();
        assert!(storage.is_empty());
    }
}
