//! Queries against the `credentials` table.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use sakit_domain::credential::{DeploymentStatus, Metadata, StoredCredential};
use sakit_domain::id::{ContractId, CredentialId};
use sakit_domain::time::{self, Timestamp};

use crate::error::SqliteError;

/// Wrapper for converting database rows into domain types without polluting
/// domain structs with database concerns.
struct Wrapper(StoredCredential);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<StoredCredential> {
        value.map(|w| w.0)
    }

    fn list(values: Vec<Self>) -> Vec<StoredCredential> {
        values.into_iter().map(|w| w.0).collect()
    }
}

pub(crate) fn decode_timestamp(millis: i64) -> Result<Timestamp, sqlx::Error> {
    time::from_millis(millis)
        .ok_or_else(|| sqlx::Error::Decode(Box::new(SqliteError::TimestampOutOfRange(millis))))
}

pub(crate) fn decode_metadata(json: &str) -> Result<Metadata, sqlx::Error> {
    serde_json::from_str(json).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let credential_id: String = row.try_get("credential_id")?;
        let public_key: Vec<u8> = row.try_get("public_key")?;
        let contract_id: String = row.try_get("contract_id")?;
        let created_at: i64 = row.try_get("created_at")?;
        let is_primary: bool = row.try_get("is_primary")?;
        let nickname: Option<String> = row.try_get("nickname")?;
        let last_used_at: Option<i64> = row.try_get("last_used_at")?;
        let deployment_status: Option<String> = row.try_get("deployment_status")?;
        let deployment_error: Option<String> = row.try_get("deployment_error")?;
        let metadata: String = row.try_get("metadata")?;

        let deployment_status = deployment_status
            .map(|status| status.parse::<DeploymentStatus>())
            .transpose()
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

        Ok(Self(StoredCredential {
            credential_id: CredentialId::from(credential_id),
            public_key,
            contract_id: ContractId::from(contract_id),
            nickname,
            created_at: decode_timestamp(created_at)?,
            last_used_at: last_used_at.map(decode_timestamp).transpose()?,
            is_primary,
            deployment_status,
            deployment_error,
            metadata: decode_metadata(&metadata)?,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO credentials (
        credential_id, public_key, contract_id, created_at, is_primary,
        nickname, last_used_at, deployment_status, deployment_error, metadata
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(credential_id) DO UPDATE SET
        public_key = excluded.public_key,
        contract_id = excluded.contract_id,
        created_at = excluded.created_at,
        is_primary = excluded.is_primary,
        nickname = excluded.nickname,
        last_used_at = excluded.last_used_at,
        deployment_status = excluded.deployment_status,
        deployment_error = excluded.deployment_error,
        metadata = excluded.metadata
";

const SELECT_BY_ID: &str = "SELECT * FROM credentials WHERE credential_id = ?";
const SELECT_BY_CONTRACT: &str =
    "SELECT * FROM credentials WHERE contract_id = ? ORDER BY created_at, credential_id";
const SELECT_ALL: &str = "SELECT * FROM credentials ORDER BY created_at, credential_id";
const DELETE_BY_ID: &str = "DELETE FROM credentials WHERE credential_id = ?";
const DELETE_ALL: &str = "DELETE FROM credentials";

pub(crate) async fn save(pool: &SqlitePool, credential: &StoredCredential) -> Result<(), SqliteError> {
    let metadata = serde_json::to_string(&credential.metadata)?;

    sqlx::query(UPSERT)
        .bind(credential.credential_id.as_str())
        .bind(&credential.public_key)
        .bind(credential.contract_id.as_str())
        .bind(time::to_millis(credential.created_at))
        .bind(credential.is_primary)
        .bind(credential.nickname.as_deref())
        .bind(credential.last_used_at.map(time::to_millis))
        .bind(credential.deployment_status.map(DeploymentStatus::as_str))
        .bind(credential.deployment_error.as_deref())
        .bind(metadata)
        .execute(pool)
        .await?;

    Ok(())
}

pub(crate) async fn get(
    pool: &SqlitePool,
    id: &CredentialId,
) -> Result<Option<StoredCredential>, SqliteError> {
    let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;
    Ok(Wrapper::maybe(row))
}

pub(crate) async fn get_by_contract(
    pool: &SqlitePool,
    contract_id: &ContractId,
) -> Result<Vec<StoredCredential>, SqliteError> {
    let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_CONTRACT)
        .bind(contract_id.as_str())
        .fetch_all(pool)
        .await?;
    Ok(Wrapper::list(rows))
}

pub(crate) async fn get_all(pool: &SqlitePool) -> Result<Vec<StoredCredential>, SqliteError> {
    let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL).fetch_all(pool).await?;
    Ok(Wrapper::list(rows))
}

pub(crate) async fn delete(pool: &SqlitePool, id: &CredentialId) -> Result<(), SqliteError> {
    sqlx::query(DELETE_BY_ID)
        .bind(id.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn clear(pool: &SqlitePool) -> Result<(), SqliteError> {
    sqlx::query(DELETE_ALL).execute(pool).await?;
    Ok(())
}
