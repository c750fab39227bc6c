use std::collections::BTreeSet;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::Result;

/// Derives the news keywords of a user from their business records.
#[async_trait]
pub trait KeywordSource: Send + Sync {
    /// Counterparty codes, countries and names plus the instruments of the
    /// `trade_limit` most recent trades.
    async fn collect(&self, user_id: Uuid, trade_limit: i64) -> Result<BTreeSet<String>>;
}

/// Adds a keyword to the set, ignoring blank values.
pub fn insert_keyword(keywords: &mut BTreeSet<String>, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        keywords.insert(value.to_string());
    }
}

/// Reads `clients` and `trades` from Postgres.
#[derive(Clone)]
pub struct PgKeywordSource {
    pool: Pool,
}

impl PgKeywordSource {
    /// Creates a new `PgKeywordSource`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeywordSource for PgKeywordSource {
    async fn collect(&self, user_id: Uuid, trade_limit: i64) -> Result<BTreeSet<String>> {
        let client = self.pool.get().await?;
        let mut keywords = BTreeSet::new();

        let clients = client
            .prepare_cached(
                r#"
                SELECT short_code, country, first_name, last_name
                FROM clients
                WHERE user_id = $1
                "#,
            )
            .await?;
        for row in client.query(&clients, &[&user_id]).await? {
            for column in ["short_code", "country", "first_name", "last_name"] {
                let value: Option<String> = row.try_get(column)?;
                insert_keyword(&mut keywords, value.as_deref());
            }
        }

        let trades = client
            .prepare_cached(
                r#"
                SELECT instrument
                FROM trades
                WHERE user_id = $1
                ORDER BY trade_date DESC
                LIMIT $2
                "#,
            )
            .await?;
        for row in client.query(&trades, &[&user_id, &trade_limit]).await? {
            let instrument: Option<String> = row.try_get("instrument")?;
            insert_keyword(&mut keywords, instrument.as_deref());
        }

        tracing::debug!("🔎 Collected {} keywords for user {}", keywords.len(), user_id);
        Ok(keywords)
    }
}
