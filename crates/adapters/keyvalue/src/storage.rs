//! [`StorageAdapter`] over a [`KeyValueBackend`].

use sakit_app::ports::StorageAdapter;
use sakit_domain::credential::{CredentialUpdate, StoredCredential};
use sakit_domain::error::StorageError;
use sakit_domain::id::{ContractId, CredentialId};
use sakit_domain::session::StoredSession;
use tokio::sync::Mutex;

use crate::backend::KeyValueBackend;
use crate::error::KeyValueError;

/// Key of the JSON array holding every credential.
pub const CREDENTIALS_KEY: &str = "smart-account-kit:credentials";

/// Key of the JSON object holding the active session.
pub const SESSION_KEY: &str = "smart-account-kit:session";

/// Credential and session storage on top of a key-value engine.
///
/// Every write, credential or session, is serialized inside this value.
/// Another process writing the same engine concurrently can still lose
/// updates.
#[derive(Debug)]
pub struct KeyValueStorage<B> {
    backend: B,
    writer: Mutex<()>,
}

impl<B: KeyValueBackend> KeyValueStorage<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            writer: Mutex::new(()),
        }
    }

    /// The underlying engine.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn read_credentials(&self) -> Result<Vec<StoredCredential>, KeyValueError> {
        let Some(raw) = self.backend.get_item(CREDENTIALS_KEY).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|source| KeyValueError::Document {
            key: CREDENTIALS_KEY,
            source,
        })
    }

    async fn write_credentials(&self, credentials: &[StoredCredential]) -> Result<(), KeyValueError> {
        let raw = serde_json::to_string(credentials)?;
        self.backend.set_item(CREDENTIALS_KEY, raw).await
    }

    async fn read_sorted(&self) -> Result<Vec<StoredCredential>, KeyValueError> {
        let mut credentials = self.read_credentials().await?;
        credentials.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.credential_id.cmp(&b.credential_id))
        });
        Ok(credentials)
    }
}

impl<B: KeyValueBackend + Send + Sync> StorageAdapter for KeyValueStorage<B> {
    async fn save(&self, credential: StoredCredential) -> Result<(), StorageError> {
        let credential = credential.normalized();
        let _writer = self.writer.lock().await;
        let mut credentials = self.read_credentials().await?;
        let existing = credentials
            .iter()
            .position(|c| c.credential_id == credential.credential_id);
        match existing {
            Some(index) => credentials[index] = credential,
            None => credentials.push(credential),
        }
        self.write_credentials(&credentials).await?;
        Ok(())
    }

    async fn get(&self, id: &CredentialId) -> Result<Option<StoredCredential>, StorageError> {
        let credentials = self.read_credentials().await?;
        Ok(credentials.into_iter().find(|c| &c.credential_id == id))
    }

    async fn get_by_contract(
        &self,
        contract_id: &ContractId,
    ) -> Result<Vec<StoredCredential>, StorageError> {
        let mut credentials = self.read_sorted().await?;
        credentials.retain(|c| &c.contract_id == contract_id);
        Ok(credentials)
    }

    async fn get_all(&self) -> Result<Vec<StoredCredential>, StorageError> {
        Ok(self.read_sorted().await?)
    }

    async fn delete(&self, id: &CredentialId) -> Result<(), StorageError> {
        let _writer = self.writer.lock().await;
        let mut credentials = self.read_credentials().await?;
        let before = credentials.len();
        credentials.retain(|c| &c.credential_id != id);
        if credentials.len() != before {
            self.write_credentials(&credentials).await?;
        }
        Ok(())
    }

    async fn update(&self, id: &CredentialId, update: CredentialUpdate) -> Result<(), StorageError> {
        let _writer = self.writer.lock().await;
        let mut credentials = self.read_credentials().await?;
        let Some(credential) = credentials.iter_mut().find(|c| &c.credential_id == id) else {
            return Ok(());
        };
        credential.apply(update);
        self.write_credentials(&credentials).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let _writer = self.writer.lock().await;
        tracing::debug!("clearing key-value storage");
        self.backend.remove_item(CREDENTIALS_KEY).await?;
        self.backend.remove_item(SESSION_KEY).await?;
        Ok(())
    }

    async fn save_session(&self, session: StoredSession) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&session.normalized()).map_err(KeyValueError::from)?;
        let _writer = self.writer.lock().await;
        self.backend.set_item(SESSION_KEY, raw).await?;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<StoredSession>, StorageError> {
        let Some(raw) = self.backend.get_item(SESSION_KEY).await? else {
            return Ok(None);
        };
        let session = serde_json::from_str(&raw).map_err(|source| KeyValueError::Document {
            key: SESSION_KEY,
            source,
        })?;
        Ok(Some(session))
    }

    async fn clear_session(&self) -> Result<(), StorageError> {
        let _writer = self.writer.lock().await;
        self.backend.remove_item(SESSION_KEY).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sakit_app::testing;
    use sakit_domain::time;
    use serde_json::json;

    use super::*;
    use crate::backend::{FileKeyValue, MemoryKeyValue};

    async fn setup() -> KeyValueStorage<MemoryKeyValue> {
        KeyValueStorage::new(MemoryKeyValue::new())
    }

    mod conformance {
        use super::*;

        sakit_app::storage_conformance_tests!(setup());
    }

    mod file_conformance {
        use super::*;

        // The directory is leaked for the duration of the test process.
        async fn file_setup() -> KeyValueStorage<FileKeyValue> {
            let dir = tempfile::tempdir().unwrap().keep();
            KeyValueStorage::new(FileKeyValue::open(dir).await.unwrap())
        }

        sakit_app::storage_conformance_tests!(file_setup());
    }

    #[tokio::test]
    async fn should_store_credentials_as_camel_case_json_array() {
        let storage = setup().await;
        let mut credential = testing::credential("cred1", "C1", 1000);
        credential.is_primary = true;
        credential.last_used_at = time::from_millis(1500);
        credential
            .metadata
            .insert("transports".to_string(), json!(["internal"]));
        storage.save(credential).await.unwrap();

        let raw = storage
            .backend()
            .get_item(CREDENTIALS_KEY)
            .await
            .unwrap()
            .unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(
            stored,
            json!([{
                "credentialId": "cred1",
                "publicKey": [4, 1, 2, 3],
                "contractId": "C1",
                "createdAt": 1000,
                "lastUsedAt": 1500,
                "isPrimary": true,
                "transports": ["internal"],
            }])
        );
    }

    #[tokio::test]
    async fn should_store_session_as_json_object() {
        let storage = setup().await;
        storage
            .save_session(testing::session("C1", "cred1", 5000))
            .await
            .unwrap();

        let raw = storage.backend().get_item(SESSION_KEY).await.unwrap().unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(
            stored,
            json!({
                "contractId": "C1",
                "credentialId": "cred1",
                "connectedAt": 1000,
                "expiresAt": 5000,
            })
        );
    }

    #[tokio::test]
    async fn should_read_records_written_by_previous_instance() {
        let dir = tempfile::tempdir().unwrap();
        let storage = KeyValueStorage::new(FileKeyValue::open(dir.path()).await.unwrap());
        storage.save(testing::credential("cred1", "C1", 1000)).await.unwrap();
        storage
            .save_session(testing::session("C1", "cred1", 5000))
            .await
            .unwrap();
        drop(storage);

        let storage = KeyValueStorage::new(FileKeyValue::open(dir.path()).await.unwrap());

        assert_eq!(
            storage.get_all().await.unwrap(),
            vec![testing::credential("cred1", "C1", 1000)]
        );
        assert_eq!(
            storage.get_session().await.unwrap(),
            Some(testing::session("C1", "cred1", 5000))
        );
    }

    #[tokio::test]
    async fn should_fail_operation_when_stored_document_is_corrupt() {
        let storage = setup().await;
        storage
            .backend()
            .set_item(CREDENTIALS_KEY, "{not json".to_string())
            .await
            .unwrap();

        let result = storage.get_all().await;

        assert!(matches!(result, Err(StorageError::Operation(_))));
    }

    #[tokio::test]
    async fn should_not_rewrite_when_deleting_missing_credential() {
        let storage = setup().await;

        storage.delete(&CredentialId::new("missing")).await.unwrap();

        assert_eq!(storage.backend().get_item(CREDENTIALS_KEY).await.unwrap(), None);
    }

    async fn file_storage() -> (tempfile::TempDir, Arc<KeyValueStorage<FileKeyValue>>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = KeyValueStorage::new(FileKeyValue::open(dir.path()).await.unwrap());
        (dir, Arc::new(storage))
    }

    #[tokio::test]
    async fn should_keep_every_record_when_saved_concurrently() {
        let (_dir, storage) = file_storage().await;

        let handles: Vec<_> = (0..16_i64)
            .map(|n| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .save(testing::credential(&format!("cred{n}"), "C1", 1000 + n))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(storage.get_all().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn should_apply_every_concurrent_update() {
        let (_dir, storage) = file_storage().await;
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
    async fn should_leave_consistent_state_when_session_save_races_clear() {
        let (_dir, storage) = file_storage().await;
        storage.save(testing::credential("cred1", "C1", 1000)).await.unwrap();

        let saving = {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move {
                storage
                    .save_session(testing::session("C1", "cred1", 5000))
                    .await
            })
        };
        let clearing = {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move { storage.clear().await })
        };
        saving.await.unwrap().unwrap();
        clearing.await.unwrap().unwrap();

        assert!(storage.get_all().await.unwrap().is_empty());
        let session = storage.get_session().await.unwrap();
        assert!(session.is_none() || session == Some(testing::session("C1", "cred1", 5000)));
    }

    #[tokio::test]
    async fn should_store_one_session_when_saved_concurrently() {
        let (_dir, storage) = file_storage().await;

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage
                        .save_session(testing::session(&format!("C{n}"), "cred1", 5000))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let current = storage.get_session().await.unwrap().unwrap();
        assert!(current.contract_id.as_str().starts_with('C'));
        assert_eq!(current.credential_id.as_str(), "cred1");
    }
}
