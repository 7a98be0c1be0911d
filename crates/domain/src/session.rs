//! Session — the currently connected smart account.
//!
//! At most one session exists at a time. Backends store it under a fixed
//! key that never appears in this type.

use serde::{Deserialize, Serialize};

use crate::credential::{Metadata, strip_reserved};
use crate::id::{ContractId, CredentialId};
use crate::time::{self, DEFAULT_SESSION_TTL_MS, Timestamp};

/// Serialized field names of [`StoredSession`].
pub const RESERVED_KEYS: &[&str] = &["contractId", "credentialId", "connectedAt", "expiresAt"];

/// The active session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub contract_id: ContractId,
    pub credential_id: CredentialId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub connected_at: Timestamp,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<Timestamp>,
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl StoredSession {
    /// Start a session now, expiring after the default lifetime.
    #[must_use]
    pub fn new(contract_id: impl Into<ContractId>, credential_id: impl Into<CredentialId>) -> Self {
        Self::started_at(contract_id, credential_id, time::now())
    }

    /// Start a session at `connected_at`, expiring after the default lifetime.
    #[must_use]
    pub fn started_at(
        contract_id: impl Into<ContractId>,
        credential_id: impl Into<CredentialId>,
        connected_at: Timestamp,
    ) -> Self {
        let connected_at = time::truncate(connected_at);
        let expires_at = time::from_millis(time::to_millis(connected_at) + DEFAULT_SESSION_TTL_MS);
        Self {
            contract_id: contract_id.into(),
            credential_id: credential_id.into(),
            connected_at,
            expires_at,
            metadata: Metadata::new(),
        }
    }

    /// Replace the expiry.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: Option<Timestamp>) -> Self {
        self.expires_at = expires_at.map(time::truncate);
        self
    }

    /// Bring the session to its persisted form: timestamps cut to whole
    /// milliseconds and reserved metadata keys dropped.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.connected_at = time::truncate(self.connected_at);
        self.expires_at = self.expires_at.map(time::truncate);
        strip_reserved(&mut self.metadata, RESERVED_KEYS);
        self
    }

    /// Whether the session has lapsed at `at`. Sessions without an expiry
    /// never lapse.
    #[must_use]
    pub fn is_expired(&self, at: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_expire_after_default_ttl() {
        let start = time::from_millis(1_000).unwrap();
        let session = StoredSession::started_at("C1", "cred1", start);
        assert_eq!(
            session.expires_at.map(time::to_millis),
            Some(1_000 + DEFAULT_SESSION_TTL_MS)
        );
    }

    #[test]
    fn should_report_expired_when_expiry_reached() {
        let session = StoredSession::started_at("C1", "cred1", time::from_millis(0).unwrap())
            .with_expires_at(time::from_millis(2_000));
        assert!(!session.is_expired(time::from_millis(1_999).unwrap()));
        assert!(session.is_expired(time::from_millis(2_000).unwrap()));
    }

    #[test]
    fn should_never_expire_without_expiry() {
        let session = StoredSession::new("C1", "cred1").with_expires_at(None);
        assert!(!session.is_expired(time::from_millis(4_102_444_800_000).unwrap()));
    }

    #[test]
    fn should_serialize_without_singleton_key() {
        let session = StoredSession::started_at("C1", "cred1", time::from_millis(10).unwrap())
            .with_expires_at(time::from_millis(2_000));
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["expiresAt"], 2_000);
        assert_eq!(json["connectedAt"], 10);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn should_truncate_and_strip_when_normalized() {
        let mut session = StoredSession::started_at("C1", "cred1", time::from_millis(0).unwrap());
        session.connected_at = chrono::DateTime::from_timestamp(3, 500_600).unwrap();
        session
            .metadata
            .insert("credentialId".to_string(), serde_json::json!("other"));
        session
            .metadata
            .insert("walletName".to_string(), serde_json::json!("main"));

        let session = session.normalized();

        assert_eq!(time::to_millis(session.connected_at), 3_000);
        assert_eq!(session.connected_at.timestamp_subsec_nanos(), 0);
        assert_eq!(
            session.metadata.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["walletName"]
        );
    }
}
