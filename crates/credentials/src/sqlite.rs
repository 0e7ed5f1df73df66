//! SQLite credential store.
//!
//! One table, `credentials`, keyed by an autoincrement id with a unique
//! secret column. Timestamps are stored as fixed-width RFC 3339 text so
//! that lexical order matches chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteQueryResult, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use toolrelay_core::{Credential, CredentialError, CredentialStore};
use tracing::{debug, info};

const NEXT_USABLE: &str = r#"
    SELECT * FROM credentials
    WHERE is_active = 1 AND is_valid = 1
    ORDER BY last_used IS NOT NULL, last_used ASC, created_at ASC, id ASC
    LIMIT 1
"#;

/// A persistent credential pool backed by SQLite.
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Open (or create) the database at `path`.
    ///
    /// Accepts a plain file path or a `sqlite:` URL. `sqlite::memory:`
    /// gives an ephemeral database for tests.
    pub async fn new(path: &str) -> Result<Self, CredentialError> {
        let in_memory = path.contains(":memory:");
        if !in_memory {
            if let Some(parent) = std::path::Path::new(path.trim_start_matches("sqlite:").trim_start_matches("//")).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        CredentialError::Storage(format!("Failed to create {}: {e}", parent.display()))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| CredentialError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| CredentialError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite credential store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, CredentialError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), CredentialError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL DEFAULT '',
                secret      TEXT NOT NULL UNIQUE,
                is_active   INTEGER NOT NULL DEFAULT 1,
                is_valid    INTEGER NOT NULL DEFAULT 0,
                last_used   TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CredentialError::MigrationFailed(format!("credentials table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_credentials_is_active ON credentials(is_active)")
            .execute(&self.pool)
            .await
            .map_err(|e| CredentialError::MigrationFailed(format!("is_active index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_credentials_is_valid ON credentials(is_valid)")
            .execute(&self.pool)
            .await
            .map_err(|e| CredentialError::MigrationFailed(format!("is_valid index: {e}")))?;

        debug!("Credential migrations complete");
        Ok(())
    }

    fn row_to_credential(row: &sqlx::sqlite::SqliteRow) -> Result<Credential, CredentialError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| CredentialError::Storage(format!("id column: {e}")))?;
        let name: String = row
            .try_get("name")
            .map_err(|e| CredentialError::Storage(format!("name column: {e}")))?;
        let secret: String = row
            .try_get("secret")
            .map_err(|e| CredentialError::Storage(format!("secret column: {e}")))?;
        let is_active: i64 = row
            .try_get("is_active")
            .map_err(|e| CredentialError::Storage(format!("is_active column: {e}")))?;
        let is_valid: i64 = row
            .try_get("is_valid")
            .map_err(|e| CredentialError::Storage(format!("is_valid column: {e}")))?;
        let last_used: Option<String> = row
            .try_get("last_used")
            .map_err(|e| CredentialError::Storage(format!("last_used column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| CredentialError::Storage(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| CredentialError::Storage(format!("updated_at column: {e}")))?;

        Ok(Credential {
            id,
            name,
            secret,
            is_active: is_active != 0,
            is_valid: is_valid != 0,
            last_used: last_used.as_deref().map(parse_timestamp),
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

/// Map a single-row write result, turning "no rows" into `NotFound`.
fn expect_row(
    id: i64,
    result: Result<SqliteQueryResult, sqlx::Error>,
) -> Result<(), CredentialError> {
    let result = result.map_err(|e| CredentialError::Storage(format!("Update failed: {e}")))?;
    if result.rows_affected() == 0 {
        return Err(CredentialError::NotFound(id));
    }
    Ok(())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn add(&self, name: &str, secret: &str) -> Result<Credential, CredentialError> {
        let now = timestamp(Utc::now());
        let row = sqlx::query(
            r#"
            INSERT INTO credentials (name, secret, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(secret)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => CredentialError::Duplicate,
            _ => CredentialError::Storage(format!("Insert failed: {e}")),
        })?;

        let credential = Self::row_to_credential(&row)?;
        debug!(id = credential.id, "Stored credential");
        Ok(credential)
    }

    async fn list(&self) -> Result<Vec<Credential>, CredentialError> {
        let rows = sqlx::query("SELECT * FROM credentials ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CredentialError::Storage(format!("List failed: {e}")))?;
        rows.iter().map(Self::row_to_credential).collect()
    }

    async fn get(&self, id: i64) -> Result<Option<Credential>, CredentialError> {
        let row = sqlx::query("SELECT * FROM credentials WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CredentialError::Storage(format!("Get failed: {e}")))?;
        row.as_ref().map(Self::row_to_credential).transpose()
    }

    async fn remove(&self, id: i64) -> Result<(), CredentialError> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await;
        expect_row(id, result)
    }

    async fn rename(&self, id: i64, name: &str) -> Result<(), CredentialError> {
        let result = sqlx::query("UPDATE credentials SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(timestamp(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await;
        expect_row(id, result)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), CredentialError> {
        let result = sqlx::query("UPDATE credentials SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active as i64)
            .bind(timestamp(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await;
        expect_row(id, result)
    }

    async fn mark_valid(&self, id: i64, valid: bool) -> Result<(), CredentialError> {
        let result = sqlx::query("UPDATE credentials SET is_valid = ?, updated_at = ? WHERE id = ?")
            .bind(valid as i64)
            .bind(timestamp(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await;
        expect_row(id, result)
    }

    async fn mark_used(&self, id: i64) -> Result<(), CredentialError> {
        let result = sqlx::query("UPDATE credentials SET last_used = ? WHERE id = ?")
            .bind(timestamp(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await;
        expect_row(id, result)
    }

    async fn next_usable(&self) -> Result<Option<Credential>, CredentialError> {
        let row = sqlx::query(NEXT_USABLE)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CredentialError::Storage(format!("Selection failed: {e}")))?;
        row.as_ref().map(Self::row_to_credential).transpose()
    }

    /// Selection and stamping happen in one statement so two concurrent
    /// requests never draw the same least-recently-used row.
    async fn checkout(&self) -> Result<Option<Credential>, CredentialError> {
        let now = timestamp(Utc::now());
        let row = sqlx::query(
            r#"
            UPDATE credentials SET last_used = ?
            WHERE id = (
                SELECT id FROM credentials
                WHERE is_active = 1 AND is_valid = 1
                ORDER BY last_used IS NOT NULL, last_used ASC, created_at ASC, id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CredentialError::Storage(format!("Checkout failed: {e}")))?;
        row.as_ref().map(Self::row_to_credential).transpose()
    }
}
