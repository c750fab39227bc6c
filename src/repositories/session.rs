use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{error::Result, models::session::SessionRecord};

/// Record-oriented storage for `user_sessions`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a new session record.
    async fn insert(&self, record: &SessionRecord) -> Result<()>;

    /// Finds a session by its token digest.
    async fn find(&self, token_hash: &str) -> Result<Option<SessionRecord>>;

    /// Moves `last_activity`/`expires_at` forward. Only live sessions
    /// (`expires_at > last_activity`) are refreshed; `None` otherwise.
    async fn touch(
        &self,
        token_hash: &str,
        last_activity: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>>;

    /// Deletes a session. Returns whether a record was removed.
    async fn delete(&self, token_hash: &str) -> Result<bool>;

    /// All sessions of `user_id` with `expires_at > now`, newest activity first.
    async fn list_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Vec<SessionRecord>>;

    /// Deletes every session with `expires_at <= now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

const SESSION_COLUMNS: &str =
    "user_id, token_hash, created_at, last_activity, expires_at, ip_address, user_agent";

/// Creates `user_sessions` and its indexes when missing.
pub async fn ensure_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client
        .batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS user_sessions (
                token_hash    TEXT PRIMARY KEY,
                user_id       UUID NOT NULL,
                created_at    TIMESTAMPTZ NOT NULL,
                last_activity TIMESTAMPTZ NOT NULL,
                expires_at    TIMESTAMPTZ NOT NULL,
                ip_address    TEXT,
                user_agent    TEXT
            );
            CREATE INDEX IF NOT EXISTS user_sessions_user_id_idx ON user_sessions (user_id);
            CREATE INDEX IF NOT EXISTS user_sessions_expires_at_idx ON user_sessions (expires_at);
            "#,
        )
        .await?;
    tracing::info!("✅ user_sessions schema verified");
    Ok(())
}

/// Postgres-backed session store.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: Pool,
}

impl PgSessionStore {
    /// Creates a new `PgSessionStore`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, record: &SessionRecord) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(
                r#"
                INSERT INTO user_sessions
                    (user_id, token_hash, created_at, last_activity, expires_at, ip_address, user_agent)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (token_hash) DO UPDATE SET
                    user_id = EXCLUDED.user_id,
                    last_activity = EXCLUDED.last_activity,
                    expires_at = EXCLUDED.expires_at,
                    ip_address = EXCLUDED.ip_address,
                    user_agent = EXCLUDED.user_agent
                "#,
            )
            .await?;
        client
            .execute(
                &statement,
                &[
                    &record.user_id,
                    &record.token_hash,
                    &record.created_at,
                    &record.last_activity,
                    &record.expires_at,
                    &record.ip_address,
                    &record.user_agent,
                ],
            )
            .await?;
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<SessionRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM user_sessions WHERE token_hash = $1",
            SESSION_COLUMNS
        );
        let statement = client.prepare_cached(&query).await?;
        let row = client.query_opt(&statement, &[&token_hash]).await?;
        Ok(row.as_ref().map(SessionRecord::from))
    }

    async fn touch(
        &self,
        token_hash: &str,
        last_activity: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            UPDATE user_sessions
            SET last_activity = $2, expires_at = $3
            WHERE token_hash = $1 AND expires_at > $2
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );
        let statement = client.prepare_cached(&query).await?;
        let row = client
            .query_opt(&statement, &[&token_hash, &last_activity, &expires_at])
            .await?;
        Ok(row.as_ref().map(SessionRecord::from))
    }

    async fn delete(&self, token_hash: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached("DELETE FROM user_sessions WHERE token_hash = $1")
            .await?;
        let deleted = client.execute(&statement, &[&token_hash]).await?;
        Ok(deleted > 0)
    }

    async fn list_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {}
            FROM user_sessions
            WHERE user_id = $1 AND expires_at > $2
            ORDER BY last_activity DESC
            "#,
            SESSION_COLUMNS
        );
        let statement = client.prepare_cached(&query).await?;
        let rows = client.query(&statement, &[&user_id, &now]).await?;
        Ok(rows.iter().map(SessionRecord::from).collect())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached("DELETE FROM user_sessions WHERE expires_at <= $1")
            .await?;
        Ok(client.execute(&statement, &[&now]).await?)
    }
}
