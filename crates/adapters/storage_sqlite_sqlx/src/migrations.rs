//! Schema migrations.
//!
//! The on-disk schema version lives in `PRAGMA user_version`. Each entry of
//! [`MIGRATIONS`] upgrades the schema by exactly one version, only ever adds
//! tables or indexes, and uses `IF NOT EXISTS` everywhere so replaying it
//! after an interrupted upgrade is harmless.

use sqlx::SqlitePool;

use crate::error::SqliteError;

/// Schema version this crate reads and writes.
pub const SCHEMA_VERSION: i64 = 2;

/// One additive upgrade step.
#[derive(Debug)]
pub struct Migration {
    pub from: i64,
    pub to: i64,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

/// Every upgrade step, in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        from: 0,
        to: 1,
        description: "credentials store with contract, creation time and primary indexes",
        statements: &[
            r"
            CREATE TABLE IF NOT EXISTS credentials (
                credential_id     TEXT    PRIMARY KEY NOT NULL,
                public_key        BLOB    NOT NULL,
                contract_id       TEXT    NOT NULL,
                created_at        INTEGER NOT NULL,
                is_primary        INTEGER NOT NULL DEFAULT 0,
                nickname          TEXT,
                last_used_at      INTEGER,
                deployment_status TEXT,
                deployment_error  TEXT,
                metadata          TEXT    NOT NULL DEFAULT '{}'
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_credentials_contract_id ON credentials (contract_id)",
            "CREATE INDEX IF NOT EXISTS idx_credentials_created_at ON credentials (created_at)",
            "CREATE INDEX IF NOT EXISTS idx_credentials_is_primary ON credentials (is_primary)",
        ],
    },
    Migration {
        from: 1,
        to: 2,
        description: "singleton session store",
        statements: &[r"
            CREATE TABLE IF NOT EXISTS session (
                id            TEXT    PRIMARY KEY NOT NULL CHECK (id = 'current'),
                contract_id   TEXT    NOT NULL,
                credential_id TEXT    NOT NULL,
                connected_at  INTEGER NOT NULL,
                expires_at    INTEGER,
                metadata      TEXT    NOT NULL DEFAULT '{}'
            )
            "],
    },
];

/// Read the schema version recorded in the database header.
///
/// # Errors
///
/// Returns [`SqliteError::Database`] if the pragma cannot be read.
pub async fn current_version(pool: &SqlitePool) -> Result<i64, SqliteError> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

/// Apply one migration and record its target version, atomically.
///
/// # Errors
///
/// Returns [`SqliteError::Database`] if a statement fails; nothing is
/// committed in that case.
pub async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<(), SqliteError> {
    let mut tx = pool.begin().await?;
    for statement in migration.statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    // PRAGMA does not accept bound parameters.
    let bump = format!("PRAGMA user_version = {}", migration.to);
    sqlx::query(&bump).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Bring the schema up to [`SCHEMA_VERSION`], returning the version found
/// before upgrading.
///
/// # Errors
///
/// Returns [`SqliteError::UnsupportedVersion`] if the database was written by
/// a newer schema, or [`SqliteError::Database`] if a migration fails.
pub async fn run(pool: &SqlitePool) -> Result<i64, SqliteError> {
    let found = current_version(pool).await?;
    if found > SCHEMA_VERSION {
        return Err(SqliteError::UnsupportedVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.from >= found) {
        tracing::debug!(
            from = migration.from,
            to = migration.to,
            "applying schema migration"
        );
        apply(pool, migration).await?;
        tracing::info!(
            version = migration.to,
            description = migration.description,
            "schema migration applied"
        );
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn object_names(pool: &SqlitePool, kind: &str) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .bind(kind)
        .fetch_all(pool)
        .await
        .unwrap()
    }

    #[test]
    fn should_chain_migrations_up_to_schema_version() {
        let mut expected_from = 0;
        for migration in MIGRATIONS {
            assert_eq!(migration.from, expected_from);
            assert_eq!(migration.to, migration.from + 1);
            expected_from = migration.to;
        }
        assert_eq!(expected_from, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn should_create_stores_and_indexes_when_database_is_new() {
        let pool = memory_pool().await;

        let found = run(&pool).await.unwrap();

        assert_eq!(found, 0);
        assert_eq!(current_version(&pool).await.unwrap(), SCHEMA_VERSION);
        assert_eq!(object_names(&pool, "table").await, vec!["credentials", "session"]);
        assert_eq!(
            object_names(&pool, "index").await,
            vec![
                "idx_credentials_contract_id",
                "idx_credentials_created_at",
                "idx_credentials_is_primary",
            ]
        );
    }

    #[tokio::test]
    async fn should_do_nothing_when_already_at_latest_version() {
        let pool = memory_pool().await;
        run(&pool).await.unwrap();

        let found = run(&pool).await.unwrap();

        assert_eq!(found, SCHEMA_VERSION);
        assert_eq!(current_version(&pool).await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn should_keep_credentials_when_upgrading_from_version_one() {
        let pool = memory_pool().await;
        apply(&pool, &MIGRATIONS[0]).await.unwrap();
        sqlx::query(
            "INSERT INTO credentials (credential_id, public_key, contract_id, created_at) VALUES ('cred1', x'0102', 'C1', 1000)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let found = run(&pool).await.unwrap();

        assert_eq!(found, 1);
        let ids: Vec<String> = sqlx::query_scalar("SELECT credential_id FROM credentials")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(ids, vec!["cred1"]);
        assert!(object_names(&pool, "table").await.contains(&"session".to_string()));
    }

    #[tokio::test]
    async fn should_resume_when_previous_upgrade_was_interrupted() {
        let pool = memory_pool().await;
        apply(&pool, &MIGRATIONS[0]).await.unwrap();
        // The session table exists but the version bump never landed.
        for statement in MIGRATIONS[1].statements {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        assert_eq!(current_version(&pool).await.unwrap(), 1);

        run(&pool).await.unwrap();

        assert_eq!(current_version(&pool).await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn should_reject_database_from_newer_schema() {
        let pool = memory_pool().await;
        sqlx::query("PRAGMA user_version = 3")
            .execute(&pool)
            .await
            .unwrap();

        let result = run(&pool).await;

        assert!(matches!(
            result,
            Err(SqliteError::UnsupportedVersion {
                found: 3,
                supported: SCHEMA_VERSION
            })
        ));
    }

    #[tokio::test]
    async fn should_enforce_singleton_session_key() {
        let pool = memory_pool().await;
        run(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO session (id, contract_id, credential_id, connected_at) VALUES ('other', 'C1', 'cred1', 0)",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err());
    }
}
