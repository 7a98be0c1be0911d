//! Partial credential update.

use crate::id::ContractId;
use crate::time::Timestamp;

use super::{DeploymentStatus, Metadata};

/// The fields of a [`StoredCredential`](super::StoredCredential) that may
/// change after enrollment.
///
/// `None` leaves a field untouched. For optional record fields the inner
/// `Option` is the new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialUpdate {
    pub contract_id: Option<ContractId>,
    pub nickname: Option<Option<String>>,
    pub created_at: Option<Timestamp>,
    pub last_used_at: Option<Option<Timestamp>>,
    pub is_primary: Option<bool>,
    pub deployment_status: Option<Option<DeploymentStatus>>,
    pub deployment_error: Option<Option<String>>,
    pub metadata: Metadata,
}

impl CredentialUpdate {
    /// An update that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether applying this update would leave a record unchanged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    #[must_use]
    pub fn contract_id(mut self, id: impl Into<ContractId>) -> Self {
        self.contract_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(Some(nickname.into()));
        self
    }

    #[must_use]
    pub fn clear_nickname(mut self) -> Self {
        self.nickname = Some(None);
        self
    }

    #[must_use]
    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    #[must_use]
    pub fn last_used_at(mut self, ts: Timestamp) -> Self {
        self.last_used_at = Some(Some(ts));
        self
    }

    #[must_use]
    pub fn is_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = Some(is_primary);
        self
    }

    #[must_use]
    pub fn deployment_status(mut self, status: DeploymentStatus) -> Self {
        self.deployment_status = Some(Some(status));
        self
    }

    #[must_use]
    pub fn deployment_error(mut self, error: impl Into<String>) -> Self {
        self.deployment_error = Some(Some(error.into()));
        self
    }

    /// Clear both `deployment_status` and `deployment_error`, as done once a
    /// contract deployment is confirmed.
    #[must_use]
    pub fn clear_deployment(mut self) -> Self {
        self.deployment_status = Some(None);
        self.deployment_error = Some(None);
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
