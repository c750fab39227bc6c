//! In-memory session storage.
//!
//! Useful for tests and single-process development runs. Data is lost on
//! restart.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::SessionRecord,
    repositories::session::SessionStore,
};

/// In-memory `SessionStore`.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> AppError {
    AppError::Internal(format!("session store lock poisoned: {}", e))
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, record: &SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .map_err(poisoned)?
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().map_err(poisoned)?.get(token_hash).cloned())
    }

    async fn touch(
        &self,
        token_hash: &str,
        last_activity: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(sessions
            .get_mut(token_hash)
            .filter(|record| record.expires_at > last_activity)
            .map(|record| {
                record.last_activity = last_activity;
                record.expires_at = expires_at;
                record.clone()
            }))
    }

    async fn delete(&self, token_hash: &str) -> Result<bool> {
        Ok(self
            .sessions
            .write()
            .map_err(poisoned)?
            .remove(token_hash)
            .is_some())
    }

    async fn list_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        let mut result: Vec<SessionRecord> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.expires_at > now)
            .cloned()
            .collect();

        result.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(result)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}
