//! Credential — one enrolled passkey and the metadata stored alongside it.
//!
//! A credential is created by the enrollment ceremony (out of scope here) and
//! persisted by a storage backend. Its `credential_id` and `public_key` never
//! change for the lifetime of the record; everything else can be patched
//! through a [`CredentialUpdate`].

mod update;

pub use update::CredentialUpdate;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::{ContractId, CredentialId};
use crate::time::{self, Timestamp};

/// Free-form fields carried with a record without interpretation.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Serialized field names of [`StoredCredential`]. Metadata never holds them,
/// otherwise the flattened record would carry the same key twice.
pub const RESERVED_KEYS: &[&str] = &[
    "credentialId",
    "publicKey",
    "contractId",
    "nickname",
    "createdAt",
    "lastUsedAt",
    "isPrimary",
    "deploymentStatus",
    "deploymentError",
];

/// Drop every entry of `metadata` whose key is in `reserved`.
pub(crate) fn strip_reserved(metadata: &mut Metadata, reserved: &[&str]) {
    metadata.retain(|key, _| !reserved.contains(&key.as_str()));
}

/// Deployment state of the smart-account contract backing a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// The contract deployment was submitted but not confirmed yet.
    Pending,
    /// The contract deployment failed; see `deployment_error`.
    Failed,
}

impl DeploymentStatus {
    /// Stable textual form, as persisted.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = UnknownDeploymentStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownDeploymentStatus(other.to_string())),
        }
    }
}

/// Returned when parsing a [`DeploymentStatus`] from an unknown string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown deployment status `{0}`")]
pub struct UnknownDeploymentStatus(pub String);

/// A stored authentication credential.
///
/// Serialized with camelCase field names and epoch-millisecond timestamps;
/// unknown fields are collected into [`metadata`](Self::metadata) and written
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    pub credential_id: CredentialId,
    pub public_key: Vec<u8>,
    pub contract_id: ContractId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: Timestamp,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_used_at: Option<Timestamp>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<DeploymentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_error: Option<String>,
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl StoredCredential {
    /// Create a builder for constructing a [`StoredCredential`].
    #[must_use]
    pub fn builder() -> StoredCredentialBuilder {
        StoredCredentialBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when either identifier is empty or a
    /// metadata key shadows a record field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.credential_id.is_empty() {
            return Err(ValidationError::EmptyCredentialId);
        }
        if self.contract_id.is_empty() {
            return Err(ValidationError::EmptyContractId);
        }
        if let Some(key) = self
            .metadata
            .keys()
            .find(|key| RESERVED_KEYS.contains(&key.as_str()))
        {
            return Err(ValidationError::ReservedMetadataKey(key.clone()));
        }
        Ok(())
    }

    /// Bring the record to its persisted form: timestamps cut to whole
    /// milliseconds and reserved metadata keys dropped.
    pub fn normalize(&mut self) {
        self.created_at = time::truncate(self.created_at);
        self.last_used_at = self.last_used_at.map(time::truncate);
        strip_reserved(&mut self.metadata, RESERVED_KEYS);
    }

    /// Owned variant of [`normalize`](Self::normalize).
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Merge `update` over this record.
    ///
    /// Only the fields present in the update change; metadata entries are
    /// merged key by key. `credential_id` and `public_key` cannot be touched,
    /// and metadata entries named like a record field are ignored.
    pub fn apply(&mut self, update: CredentialUpdate) {
        let CredentialUpdate {
            contract_id,
            nickname,
            created_at,
            last_used_at,
            is_primary,
            deployment_status,
            deployment_error,
            metadata,
        } = update;

        if let Some(contract_id) = contract_id {
            self.contract_id = contract_id;
        }
        if let Some(nickname) = nickname {
            self.nickname = nickname;
        }
        if let Some(created_at) = created_at {
            self.created_at = time::truncate(created_at);
        }
        if let Some(last_used_at) = last_used_at {
            self.last_used_at = last_used_at.map(time::truncate);
        }
        if let Some(is_primary) = is_primary {
            self.is_primary = is_primary;
        }
        if let Some(deployment_status) = deployment_status {
            self.deployment_status = deployment_status;
        }
        if let Some(deployment_error) = deployment_error {
            self.deployment_error = deployment_error;
        }
        self.metadata.extend(
            metadata
                .into_iter()
                .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str())),
        );
    }
}

/// Step-by-step builder for [`StoredCredential`].
#[derive(Debug, Default)]
pub struct StoredCredentialBuilder {
    credential_id: Option<CredentialId>,
    public_key: Option<Vec<u8>>,
    contract_id: Option<ContractId>,
    nickname: Option<String>,
    created_at: Option<Timestamp>,
    last_used_at: Option<Timestamp>,
    is_primary: bool,
    deployment_status: Option<DeploymentStatus>,
    deployment_error: Option<String>,
    metadata: Metadata,
}

impl StoredCredentialBuilder {
    #[must_use]
    pub fn credential_id(mut self, id: impl Into<CredentialId>) -> Self {
        self.credential_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn public_key(mut self, public_key: impl Into<Vec<u8>>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    #[must_use]
    pub fn contract_id(mut self, id: impl Into<ContractId>) -> Self {
        self.contract_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    #[must_use]
    pub fn last_used_at(mut self, ts: Timestamp) -> Self {
        self.last_used_at = Some(ts);
        self
    }

    #[must_use]
    pub fn primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    #[must_use]
    pub fn deployment_status(mut self, status: DeploymentStatus) -> Self {
        self.deployment_status = Some(status);
        self
    }

    #[must_use]
    pub fn deployment_error(mut self, error: impl Into<String>) -> Self {
        self.deployment_error = Some(error.into());
        self
    }

    /// Add a metadata entry. Keys named like a record field are ignored.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let key = key.into();
        if !RESERVED_KEYS.contains(&key.as_str()) {
            self.metadata.insert(key, value.into());
        }
        self
    }

    /// Consume the builder, validate, and return a [`StoredCredential`].
    ///
    /// `created_at` defaults to the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if an identifier is missing or empty, or
    /// if no public key was provided.
    pub fn build(self) -> Result<StoredCredential, ValidationError> {
        let credential = StoredCredential {
            credential_id: self.credential_id.unwrap_or_else(|| CredentialId::new("")),
            public_key: self
                .public_key
                .ok_or(ValidationError::MissingField("public_key"))?,
            contract_id: self.contract_id.unwrap_or_else(|| ContractId::new("")),
            nickname: self.nickname,
            created_at: self.created_at.map_or_else(time::now, time::truncate),
            last_used_at: self.last_used_at.map(time::truncate),
            is_primary: self.is_primary,
            deployment_status: self.deployment_status,
            deployment_error: self.deployment_error,
            metadata: self.metadata,
        };
        credential.validate()?;
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredCredential {
        StoredCredential::builder()
            .credential_id("cred1")
            .public_key(vec![1, 2, 3])
            .contract_id("C1")
            .created_at(time::from_millis(1000).unwrap())
            .primary(true)
            .build()
            .unwrap()
    }

    #[test]
    fn should_build_valid_credential_when_required_fields_provided() {
        let credential = sample();
        assert_eq!(credential.credential_id.as_str(), "cred1");
        assert_eq!(credential.public_key, vec![1, 2, 3]);
        assert_eq!(credential.contract_id.as_str(), "C1");
        assert!(credential.is_primary);
        assert!(credential.metadata.is_empty());
    }

    #[test]
    fn should_return_validation_error_when_credential_id_is_empty() {
        let result = StoredCredential::builder()
            .public_key(vec![1])
            .contract_id("C1")
            .build();
        assert_eq!(result, Err(ValidationError::EmptyCredentialId));
    }

    #[test]
    fn should_return_validation_error_when_contract_id_is_empty() {
        let result = StoredCredential::builder()
            .credential_id("cred1")
            .public_key(vec![1])
            .build();
        assert_eq!(result, Err(ValidationError::EmptyContractId));
    }

    #[test]
    fn should_return_validation_error_when_public_key_missing() {
        let result = StoredCredential::builder()
            .credential_id("cred1")
            .contract_id("C1")
            .build();
        assert_eq!(result, Err(ValidationError::MissingField("public_key")));
    }

    #[test]
    fn should_truncate_created_at_to_millis() {
        let ts = chrono::DateTime::from_timestamp(1, 999_999).unwrap();
        let credential = StoredCredential::builder()
            .credential_id("cred1")
            .public_key(vec![1])
            .contract_id("C1")
            .created_at(ts)
            .build()
            .unwrap();
        assert_eq!(time::to_millis(credential.created_at), 1000);
        assert_eq!(credential.created_at.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn should_change_only_is_primary_when_applying_primary_update() {
        let mut credential = sample();
        let before = credential.clone();

        credential.apply(CredentialUpdate::new().is_primary(false));

        assert!(!credential.is_primary);
        assert_eq!(credential.public_key, before.public_key);
        assert_eq!(credential.contract_id, before.contract_id);
        assert_eq!(credential.created_at, before.created_at);
        assert_eq!(credential.nickname, before.nickname);
    }

    #[test]
    fn should_merge_metadata_entries_by_key() {
        let mut credential = StoredCredential::builder()
            .credential_id("cred1")
            .public_key(vec![1])
            .contract_id("C1")
            .metadata("transports", "internal")
            .metadata("backedUp", true)
            .build()
            .unwrap();

        credential.apply(CredentialUpdate::new().metadata("backedUp", false));

        assert_eq!(credential.metadata["transports"], "internal");
        assert_eq!(credential.metadata["backedUp"], false);
    }

    #[test]
    fn should_ignore_metadata_named_like_a_field_when_applying_update() {
        let mut credential = sample();
        let before = credential.clone();

        credential.apply(
            CredentialUpdate::new()
                .metadata("publicKey", vec![9, 9])
                .metadata("isPrimary", false)
                .metadata("transports", "usb"),
        );

        assert_eq!(credential.public_key, before.public_key);
        assert_eq!(credential.is_primary, before.is_primary);
        assert_eq!(
            credential.metadata.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["transports"]
        );
        serde_json::from_value::<StoredCredential>(serde_json::to_value(&credential).unwrap())
            .unwrap();
    }

    #[test]
    fn should_skip_reserved_keys_in_builder_metadata() {
        let credential = StoredCredential::builder()
            .credential_id("cred1")
            .public_key(vec![1])
            .contract_id("C1")
            .metadata("contractId", "C9")
            .build()
            .unwrap();
        assert!(credential.metadata.is_empty());
    }

    #[test]
    fn should_reject_reserved_metadata_key_when_validating() {
        let mut credential = sample();
        credential
            .metadata
            .insert("createdAt".to_string(), serde_json::json!(1));

        assert_eq!(
            credential.validate(),
            Err(ValidationError::ReservedMetadataKey("createdAt".to_string()))
        );
    }

    #[test]
    fn should_truncate_and_strip_when_normalizing() {
        let precise = chrono::DateTime::from_timestamp(2, 987_654_321).unwrap();
        let mut credential = sample();
        credential.created_at = precise;
        credential.last_used_at = Some(precise);
        credential
            .metadata
            .insert("publicKey".to_string(), serde_json::json!([9]));
        credential
            .metadata
            .insert("aaguid".to_string(), serde_json::json!("00"));

        let credential = credential.normalized();

        assert_eq!(credential.created_at.timestamp_subsec_nanos(), 987_000_000);
        assert_eq!(credential.last_used_at, Some(credential.created_at));
        assert!(credential.metadata.get("publicKey").is_none());
        assert_eq!(credential.metadata["aaguid"], "00");
        assert_eq!(credential.validate(), Ok(()));
    }

    #[test]
    fn should_clear_deployment_fields_when_update_clears_them() {
        let mut credential = StoredCredential::builder()
            .credential_id("cred1")
            .public_key(vec![1])
            .contract_id("C1")
            .deployment_status(DeploymentStatus::Failed)
            .deployment_error("tx rejected")
            .build()
            .unwrap();

        credential.apply(CredentialUpdate::new().clear_deployment());

        assert!(credential.deployment_status.is_none());
        assert!(credential.deployment_error.is_none());
    }

    #[test]
    fn should_serialize_with_camel_case_and_millis() {
        let credential = sample();
        let json = serde_json::to_value(&credential).unwrap();
        assert_eq!(json["credentialId"], "cred1");
        assert_eq!(json["contractId"], "C1");
        assert_eq!(json["createdAt"], 1000);
        assert_eq!(json["isPrimary"], true);
        assert!(json.get("nickname").is_none());
    }

    #[test]
    fn should_keep_unknown_fields_as_metadata_when_deserializing() {
        let json = serde_json::json!({
            "credentialId": "cred1",
            "publicKey": [4, 5],
            "contractId": "C1",
            "createdAt": 5000,
            "deviceType": "multiDevice",
        });
        let credential: StoredCredential = serde_json::from_value(json).unwrap();
        assert!(!credential.is_primary);
        assert_eq!(credential.metadata["deviceType"], "multiDevice");

        let back = serde_json::to_value(&credential).unwrap();
        assert_eq!(back["deviceType"], "multiDevice");
    }

    #[test]
    fn should_parse_deployment_status_from_persisted_form() {
        assert_eq!("pending".parse(), Ok(DeploymentStatus::Pending));
        assert_eq!("failed".parse(), Ok(DeploymentStatus::Failed));
        assert!("deployed".parse::<DeploymentStatus>().is_err());
    }
}
