//! Postgres-backed collaborators.

use crate::{
    keys::{models::ApiKeyRecord, rotation::StateStore, store::KeyStore},
    principal::{Principal, PrincipalDirectory},
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const SCHEMA: &str = include_str!("../../db/sql/01_sentinel.sql");

const OWNER_CONSTRAINT: &str = "api_keys_owner_unique";

const KEY_COLUMNS: &str = "id, owner_id, label, hashed_key, encrypted_payload, enabled, blocked, expires_at, created_at, updated_at";

/// Create the tables if they do not exist yet.
///
/// # Errors
/// Returns `Error::Storage` if any statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
    sqlx::raw_sql(SCHEMA).execute(pool).instrument(span).await?;
    Ok(())
}

fn query_span(operation: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation
    )
}

fn is_owner_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().is_some_and(|code| code.as_ref() == "23505")
                && db_err.constraint() == Some(OWNER_CONSTRAINT)
        }
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub struct PgKeyStore {
    pool: PgPool,
}

impl PgKeyStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `UPDATE` a single boolean flag by id. `column` is never user input.
    async fn set_flag(
        &self,
        column: &'static str,
        id: Uuid,
        value: bool,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let query = format!("UPDATE api_keys SET {column} = $2, updated_at = $3 WHERE id = $1");
        let result = sqlx::query(&query)
            .bind(id)
            .bind(value)
            .bind(at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE"))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_one(
        &self,
        column: &'static str,
        bind: KeyBind<'_>,
    ) -> Result<Option<ApiKeyRecord>> {
        let query = format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE {column} = $1");
        let q = sqlx::query_as::<_, ApiKeyRecord>(&query);
        let q = match bind {
            KeyBind::Id(id) => q.bind(id),
            KeyBind::Text(text) => q.bind(text),
        };
        Ok(q
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT"))
            .await?)
    }
}

enum KeyBind<'a> {
    Id(Uuid),
    Text(&'a str),
}

#[async_trait]
impl KeyStore for PgKeyStore {
    async fn find_by_hash(&self, hashed_key: &str) -> Result<Option<ApiKeyRecord>> {
        self.find_one("hashed_key", KeyBind::Text(hashed_key)).await
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Option<ApiKeyRecord>> {
        self.find_one("owner_id", KeyBind::Id(owner_id)).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKeyRecord>> {
        self.find_one("id", KeyBind::Id(id)).await
    }

    async fn save(&self, record: &ApiKeyRecord) -> Result<()> {
        let query = r"
            INSERT INTO api_keys
                (id, owner_id, label, hashed_key, encrypted_payload, enabled, blocked, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                label = EXCLUDED.label,
                hashed_key = EXCLUDED.hashed_key,
                encrypted_payload = EXCLUDED.encrypted_payload,
                enabled = EXCLUDED.enabled,
                blocked = EXCLUDED.blocked,
                expires_at = EXCLUDED.expires_at,
                updated_at = EXCLUDED.updated_at
        ";
        sqlx::query(query)
            .bind(record.id)
            .bind(record.owner_id)
            .bind(&record.label)
            .bind(&record.hashed_key)
            .bind(&record.encrypted_payload)
            .bind(record.enabled)
            .bind(record.blocked)
            .bind(record.expires_at)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .instrument(query_span("UPSERT"))
            .await
            .map_err(|err| {
                if is_owner_violation(&err) {
                    Error::OwnerConflict(record.owner_id)
                } else {
                    Error::from(err)
                }
            })?;
        Ok(())
    }

    async fn delete(&self, record: &ApiKeyRecord) -> Result<()> {
        sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(record.id)
            .execute(&self.pool)
            .instrument(query_span("DELETE"))
            .await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ApiKeyRecord>> {
        let query = format!("SELECT {KEY_COLUMNS} FROM api_keys ORDER BY created_at");
        Ok(sqlx::query_as::<_, ApiKeyRecord>(&query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT"))
            .await?)
    }

    async fn set_blocked(&self, id: Uuid, blocked: bool, at: DateTime<Utc>) -> Result<bool> {
        self.set_flag("blocked", id, blocked, at).await
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool, at: DateTime<Utc>) -> Result<bool> {
        self.set_flag("enabled", id, enabled, at).await
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM api_keys WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .instrument(query_span("DELETE"))
            .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}

/// Principals read from the `users` table.
#[derive(Clone, Debug)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalDirectory for PgDirectory {
    async fn load(&self, owner_id: Uuid) -> Result<Option<Principal>> {
        let row = sqlx::query("SELECT id, display_name, active, roles FROM users WHERE id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT"))
            .await?;

        let principal = row
            .map(|row| -> std::result::Result<Principal, sqlx::Error> {
                Ok(Principal {
                    id: row.try_get("id")?,
                    display_name: row.try_get("display_name")?,
                    active: row.try_get("active")?,
                    roles: row.try_get("roles")?,
                })
            })
            .transpose()?;
        Ok(principal)
    }
}

#[derive(Clone, Debug)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sentinel_state WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT"))
            .await?;
        Ok(row.map(|row| row.try_get("value")).transpose()?)
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        let query = r"
            INSERT INTO sentinel_state (name, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
        ";
        sqlx::query(query)
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .instrument(query_span("UPSERT"))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_every_table() {
        for table in ["users", "api_keys", "sentinel_state"] {
            assert!(SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
        assert!(SCHEMA.contains(OWNER_CONSTRAINT));
    }

    #[test]
    fn non_database_errors_are_not_owner_violations() {
        assert!(!is_owner_violation(&sqlx::Error::RowNotFound));
    }
}
