//! Behavioural conformance suite for [`StorageAdapter`] implementations.
//!
//! Each check takes a freshly opened, empty adapter and panics on the first
//! violated expectation. Backends run the whole suite through
//! [`storage_conformance_tests!`](crate::storage_conformance_tests):
//!
//! ```ignore
//! mod conformance {
//!     use super::*;
//!     sakit_app::storage_conformance_tests!(setup());
//! }
//! ```

use sakit_domain::credential::{CredentialUpdate, StoredCredential};
use sakit_domain::id::{ContractId, CredentialId};
use sakit_domain::session::StoredSession;
use sakit_domain::time;

use crate::ports::StorageAdapter;

/// Build a credential fixture created at `created_at_ms`.
///
/// # Panics
///
/// Panics if the fixture fails validation (empty identifiers).
#[must_use]
pub fn credential(id: &str, contract_id: &str, created_at_ms: i64) -> StoredCredential {
    StoredCredential::builder()
        .credential_id(id)
        .public_key(vec![4, 1, 2, 3])
        .contract_id(contract_id)
        .created_at(time::from_millis(created_at_ms).expect("fixture timestamp in range"))
        .build()
        .expect("valid credential fixture")
}

/// Build a session fixture that expires at `expires_at_ms`.
///
/// # Panics
///
/// Panics if `expires_at_ms` is out of range.
#[must_use]
pub fn session(contract_id: &str, credential_id: &str, expires_at_ms: i64) -> StoredSession {
    StoredSession::started_at(
        contract_id,
        credential_id,
        time::from_millis(1_000).expect("fixture timestamp in range"),
    )
    .with_expires_at(time::from_millis(expires_at_ms))
}

fn sorted_ids(credentials: &[StoredCredential]) -> Vec<&str> {
    let mut ids: Vec<&str> = credentials.iter().map(|c| c.credential_id.as_str()).collect();
    ids.sort_unstable();
    ids
}

/// `save` followed by `get` returns an equal record.
pub async fn should_round_trip_saved_credential<S: StorageAdapter>(storage: &S) {
    let mut record = StoredCredential::builder()
        .credential_id("cred1")
        .public_key(vec![1, 2, 3])
        .contract_id("C1")
        .created_at(time::from_millis(1000).expect("in range"))
        .primary(true)
        .nickname("laptop")
        .metadata("transports", serde_json::json!(["internal", "hybrid"]))
        .build()
        .expect("valid credential");
    record.last_used_at = time::from_millis(1500);

    storage.save(record.clone()).await.expect("save");

    let fetched = storage
        .get(&CredentialId::new("cred1"))
        .await
        .expect("get")
        .expect("record present");
    assert_eq!(fetched, record);
}

/// `get` on an unknown id is `Ok(None)`.
pub async fn should_return_none_when_credential_missing<S: StorageAdapter>(storage: &S) {
    let fetched = storage.get(&CredentialId::new("missing")).await.expect("get");
    assert!(fetched.is_none());
}

/// Saving an existing id replaces the record.
pub async fn should_replace_credential_when_saved_twice<S: StorageAdapter>(storage: &S) {
    storage.save(credential("cred1", "C1", 1000)).await.expect("save");

    let mut replacement = credential("cred1", "C9", 2000);
    replacement.public_key = vec![9, 9];
    storage.save(replacement.clone()).await.expect("save");

    let all = storage.get_all().await.expect("get_all");
    assert_eq!(all, vec![replacement]);
}

/// `get_by_contract` returns exactly the records of that contract.
pub async fn should_find_credentials_by_contract<S: StorageAdapter>(storage: &S) {
    storage.save(credential("a", "C1", 1000)).await.expect("save");
    storage.save(credential("b", "C1", 2000)).await.expect("save");
    storage.save(credential("c", "C2", 3000)).await.expect("save");

    let c1 = storage
        .get_by_contract(&ContractId::new("C1"))
        .await
        .expect("get_by_contract");
    assert_eq!(sorted_ids(&c1), vec!["a", "b"]);
    assert!(c1.iter().all(|c| c.contract_id.as_str() == "C1"));

    let c2 = storage
        .get_by_contract(&ContractId::new("C2"))
        .await
        .expect("get_by_contract");
    assert_eq!(sorted_ids(&c2), vec!["c"]);

    let none = storage
        .get_by_contract(&ContractId::new("C3"))
        .await
        .expect("get_by_contract");
    assert!(none.is_empty());
}

/// `get_all` lists records oldest first.
pub async fn should_list_credentials_oldest_first<S: StorageAdapter>(storage: &S) {
    storage.save(credential("late", "C1", 3000)).await.expect("save");
    storage.save(credential("early", "C2", 1000)).await.expect("save");
    storage.save(credential("middle", "C1", 2000)).await.expect("save");

    let all = storage.get_all().await.expect("get_all");
    let ids: Vec<&str> = all.iter().map(|c| c.credential_id.as_str()).collect();
    assert_eq!(ids, vec!["early", "middle", "late"]);
}

/// `delete` removes the target only; deleting a missing id is a no-op.
pub async fn should_delete_only_target_credential<S: StorageAdapter>(storage: &S) {
    storage.save(credential("a", "C1", 1000)).await.expect("save");
    storage.save(credential("b", "C1", 2000)).await.expect("save");

    storage.delete(&CredentialId::new("a")).await.expect("delete");
    assert!(storage.get(&CredentialId::new("a")).await.expect("get").is_none());

    storage
        .delete(&CredentialId::new("missing"))
        .await
        .expect("deleting a missing id is not an error");
    storage
        .delete(&CredentialId::new("a"))
        .await
        .expect("deleting twice is not an error");

    let all = storage.get_all().await.expect("get_all");
    assert_eq!(sorted_ids(&all), vec!["b"]);
}

/// `update` on a missing id neither creates a record nor fails.
pub async fn should_ignore_update_when_credential_missing<S: StorageAdapter>(storage: &S) {
    storage.save(credential("a", "C1", 1000)).await.expect("save");
    let before = storage.get_all().await.expect("get_all");

    storage
        .update(&CredentialId::new("missing"), CredentialUpdate::new().is_primary(true))
        .await
        .expect("update of a missing id is not an error");

    let after = storage.get_all().await.expect("get_all");
    assert_eq!(before, after);
}

/// `update` changes only the supplied fields.
pub async fn should_merge_only_supplied_fields_when_updating<S: StorageAdapter>(storage: &S) {
    let mut original = credential("cred1", "C1", 1000);
    original.is_primary = true;
    original
        .metadata
        .insert("transports".to_string(), serde_json::json!(["usb"]));
    storage.save(original.clone()).await.expect("save");

    storage
        .update(
            &CredentialId::new("cred1"),
            CredentialUpdate::new()
                .is_primary(false)
                .nickname("phone")
                .metadata("backedUp", true),
        )
        .await
        .expect("update");

    let updated = storage
        .get(&CredentialId::new("cred1"))
        .await
        .expect("get")
        .expect("record present");
    assert!(!updated.is_primary);
    assert_eq!(updated.nickname.as_deref(), Some("phone"));
    assert_eq!(updated.public_key, original.public_key);
    assert_eq!(updated.contract_id, original.contract_id);
    assert_eq!(updated.created_at, original.created_at);
    assert_eq!(updated.metadata["transports"], serde_json::json!(["usb"]));
    assert_eq!(updated.metadata["backedUp"], true);
}

/// `update` moving a credential to another contract is reflected by the index.
pub async fn should_reindex_contract_when_updated<S: StorageAdapter>(storage: &S) {
    storage.save(credential("cred1", "C1", 1000)).await.expect("save");

    storage
        .update(&CredentialId::new("cred1"), CredentialUpdate::new().contract_id("C2"))
        .await
        .expect("update");

    let c1 = storage
        .get_by_contract(&ContractId::new("C1"))
        .await
        .expect("get_by_contract");
    assert!(c1.is_empty());
    let c2 = storage
        .get_by_contract(&ContractId::new("C2"))
        .await
        .expect("get_by_contract");
    assert_eq!(sorted_ids(&c2), vec!["cred1"]);
}

/// Session save/get/clear round trip.
pub async fn should_round_trip_session_without_internal_key<S: StorageAdapter>(storage: &S) {
    assert!(storage.get_session().await.expect("get_session").is_none());

    let saved = session("C1", "cred1", 5000);
    storage.save_session(saved.clone()).await.expect("save_session");
    assert_eq!(
        storage.get_session().await.expect("get_session"),
        Some(saved)
    );

    storage.clear_session().await.expect("clear_session");
    assert!(storage.get_session().await.expect("get_session").is_none());

    storage
        .clear_session()
        .await
        .expect("clearing an absent session is not an error");
}

/// Saving a session replaces the previous one entirely.
pub async fn should_overwrite_session_when_saved_again<S: StorageAdapter>(storage: &S) {
    let mut first = session("C1", "cred1", 5000);
    first
        .metadata
        .insert("walletName".to_string(), serde_json::json!("main"));
    storage.save_session(first).await.expect("save_session");

    let second = session("C2", "cred2", 9000).with_expires_at(None);
    storage.save_session(second.clone()).await.expect("save_session");

    let current = storage
        .get_session()
        .await
        .expect("get_session")
        .expect("session present");
    assert_eq!(current, second);
    assert!(current.metadata.is_empty());
}

/// `clear` empties both the credential and the session store.
pub async fn should_empty_both_stores_when_cleared<S: StorageAdapter>(storage: &S) {
    storage.save(credential("a", "C1", 1000)).await.expect("save");
    storage.save(credential("b", "C1", 2000)).await.expect("save");
    storage.save(credential("c", "C2", 3000)).await.expect("save");
    storage
        .update(&CredentialId::new("a"), CredentialUpdate::new().is_primary(false))
        .await
        .expect("update");
    storage
        .save_session(session("C1", "a", 5000))
        .await
        .expect("save_session");

    storage.clear().await.expect("clear");

    assert!(storage.get_all().await.expect("get_all").is_empty());
    assert!(storage.get_session().await.expect("get_session").is_none());
}

/// Metadata entries named like a record field never reach the stored
/// document, so the store stays readable and the real fields stay intact.
pub async fn should_ignore_reserved_metadata_keys<S: StorageAdapter>(storage: &S) {
    let mut record = credential("cred1", "C1", 1000);
    record
        .metadata
        .insert("publicKey".to_string(), serde_json::json!([9, 9]));
    record
        .metadata
        .insert("transports".to_string(), serde_json::json!(["usb"]));
    storage.save(record).await.expect("save");
    storage.save(credential("cred2", "C1", 2000)).await.expect("save");

    storage
        .update(
            &CredentialId::new("cred1"),
            CredentialUpdate::new()
                .metadata("isPrimary", true)
                .metadata("credentialId", "other"),
        )
        .await
        .expect("update");
    storage
        .save(credential("cred3", "C2", 3000))
        .await
        .expect("save after update");

    let all = storage.get_all().await.expect("get_all");
    assert_eq!(sorted_ids(&all), vec!["cred1", "cred2", "cred3"]);
    let stored = all
        .iter()
        .find(|c| c.credential_id.as_str() == "cred1")
        .expect("cred1 present");
    assert_eq!(stored.public_key, vec![4, 1, 2, 3]);
    assert!(!stored.is_primary);
    assert_eq!(
        stored.metadata.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["transports"]
    );

    let mut current = session("C1", "cred1", 5000);
    current
        .metadata
        .insert("contractId".to_string(), serde_json::json!("C9"));
    current
        .metadata
        .insert("walletName".to_string(), serde_json::json!("main"));
    storage.save_session(current).await.expect("save_session");

    let fetched = storage
        .get_session()
        .await
        .expect("get_session")
        .expect("session present");
    assert_eq!(fetched.contract_id.as_str(), "C1");
    assert_eq!(
        fetched.metadata.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["walletName"]
    );
}

/// Timestamps are stored at millisecond precision whatever the caller set.
pub async fn should_truncate_sub_millisecond_timestamps_when_saved<S: StorageAdapter>(storage: &S) {
    let precise = chrono::DateTime::from_timestamp(2, 987_654_321).expect("in range");

    let mut record = credential("cred1", "C1", 1000);
    record.created_at = precise;
    record.last_used_at = Some(precise);
    storage.save(record.clone()).await.expect("save");

    let fetched = storage
        .get(&CredentialId::new("cred1"))
        .await
        .expect("get")
        .expect("credential present");
    assert_eq!(fetched, record.normalized());
    assert_eq!(time::to_millis(fetched.created_at), 2_987);
    assert_eq!(fetched.created_at.timestamp_subsec_nanos(), 987_000_000);

    let mut current = session("C1", "cred1", 5000);
    current.connected_at = precise;
    current.expires_at = Some(precise);
    storage.save_session(current.clone()).await.expect("save_session");

    let fetched = storage
        .get_session()
        .await
        .expect("get_session")
        .expect("session present");
    assert_eq!(fetched, current.normalized());
    assert_eq!(fetched.connected_at.timestamp_subsec_nanos(), 987_000_000);
}

/// Expand to one `#[tokio::test]` per conformance check.
///
/// `$setup` is an expression evaluating to a future that yields a fresh,
/// empty adapter. It is evaluated once per test.
#[macro_export]
macro_rules! storage_conformance_tests {
    (@case $setup:expr; $($check:ident),+ $(,)?) => {
        $(
            #[tokio::test]
            async fn $check() {
                let storage = $setup.await;
                $crate::testing::$check(&storage).await;
            }
        )+
    };
    ($setup:expr) => {
        $crate::storage_conformance_tests!(@case $setup;
            should_round_trip_saved_credential,
            should_return_none_when_credential_missing,
            should_replace_credential_when_saved_twice,
            should_find_credentials_by_contract,
            should_list_credentials_oldest_first,
            should_delete_only_target_credential,
            should_ignore_update_when_credential_missing,
            should_merge_only_supplied_fields_when_updating,
            should_reindex_contract_when_updated,
            should_round_trip_session_without_internal_key,
            should_overwrite_session_when_saved_again,
            should_empty_both_stores_when_cleared,
            should_ignore_reserved_metadata_keys,
            should_truncate_sub_millisecond_timestamps_when_saved,
        );
    };
}
