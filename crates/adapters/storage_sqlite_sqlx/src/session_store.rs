//! Queries against the singleton `session` table.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use sakit_domain::id::{ContractId, CredentialId};
use sakit_domain::session::StoredSession;
use sakit_domain::time;

use crate::credential_store::{decode_metadata, decode_timestamp};
use crate::error::SqliteError;

/// Fixed key of the only session row.
pub(crate) const SESSION_KEY: &str = "current";

struct Wrapper(StoredSession);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let contract_id: String = row.try_get("contract_id")?;
        let credential_id: String = row.try_get("credential_id")?;
        let connected_at: i64 = row.try_get("connected_at")?;
        let expires_at: Option<i64> = row.try_get("expires_at")?;
        let metadata: String = row.try_get("metadata")?;

        Ok(Self(StoredSession {
            contract_id: ContractId::from(contract_id),
            credential_id: CredentialId::from(credential_id),
            connected_at: decode_timestamp(connected_at)?,
            expires_at: expires_at.map(decode_timestamp).transpose()?,
            metadata: decode_metadata(&metadata)?,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO session (id, contract_id, credential_id, connected_at, expires_at, metadata)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        contract_id = excluded.contract_id,
        credential_id = excluded.credential_id,
        connected_at = excluded.connected_at,
        expires_at = excluded.expires_at,
        metadata = excluded.metadata
";

const SELECT: &str = r"
    SELECT contract_id, credential_id, connected_at, expires_at, metadata
    FROM session WHERE id = ?
";

const DELETE: &str = "DELETE FROM session WHERE id = ?";

pub(crate) async fn save(pool: &SqlitePool, session: &StoredSession) -> Result<(), SqliteError> {
    let metadata = serde_json::to_string(&session.metadata)?;

    sqlx::query(UPSERT)
        .bind(SESSION_KEY)
        .bind(session.contract_id.as_str())
        .bind(session.credential_id.as_str())
        .bind(time::to_millis(session.connected_at))
        .bind(session.expires_at.map(time::to_millis))
        .bind(metadata)
        .execute(pool)
        .await?;

    Ok(())
}

pub(crate) async fn get(pool: &SqlitePool) -> Result<Option<StoredSession>, SqliteError> {
    let row: Option<Wrapper> = sqlx::query_as(SELECT)
        .bind(SESSION_KEY)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|w| w.0))
}

pub(crate) async fn clear(pool: &SqlitePool) -> Result<(), SqliteError> {
    sqlx::query(DELETE).bind(SESSION_KEY).execute(pool).await?;
    Ok(())
}
