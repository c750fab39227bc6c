use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

/// Represents one authenticated client session.
///
/// The bearer token itself is never stored: `token_hash` holds its SHA-256
/// digest (see [`crate::crypto::token::hash_token`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// Hex SHA-256 digest of the bearer token.
    #[serde(skip_serializing)]
    pub token_hash: String,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp of the last explicit activity.
    pub last_activity: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
    /// Network origin of the client, when known.
    pub ip_address: Option<String>,
    /// The client's user agent, when known.
    pub user_agent: Option<String>,
}

impl From<&Row> for SessionRecord {
    fn from(row: &Row) -> Self {
        Self {
            user_id: row.get("user_id"),
            token_hash: row.get("token_hash"),
            created_at: row.get("created_at"),
            last_activity: row.get("last_activity"),
            expires_at: row.get("expires_at"),
            ip_address: row.get("ip_address"),
            user_agent: row.get("user_agent"),
        }
    }
}

impl SessionRecord {
    /// Remaining lifetime at `now`, clamped to zero.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the session is inside its warning window (or already past it).
    pub fn is_expiring(&self, now: DateTime<Utc>, warning_lead: Duration) -> bool {
        match chrono::Duration::from_std(warning_lead) {
            Ok(lead) => self.expires_at - now <= lead,
            Err(_) => true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Best-effort annotations captured when a session is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Fixed-duration, activity-refreshed session window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// How long a session lives after its last activity.
    pub duration: Duration,
    /// How long before expiry the warning is raised.
    pub warning_lead: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10 * 60),
            warning_lead: Duration::from_secs(2 * 60),
        }
    }
}

impl SessionPolicy {
    /// Expiry for activity observed at `at`.
    pub fn expiry_from(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.duration)
            .ok()
            .and_then(|d| at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Delay from `now` until the warning for a session expiring at `expires_at`.
    pub fn warning_delay(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let until_expiry = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
        until_expiry.saturating_sub(self.warning_lead)
    }
}

/// Notification emitted by the session manager towards the UI bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session entered its warning window.
    Warning {
        user_id: Uuid,
        #[serde(skip_serializing)]
        token_hash: String,
        time_remaining_ms: u64,
    },
    /// The session ran out and was logged out.
    Expired {
        user_id: Uuid,
        #[serde(skip_serializing)]
        token_hash: String,
    },
    /// The session was ended explicitly (logout).
    Ended {
        user_id: Uuid,
        #[serde(skip_serializing)]
        token_hash: String,
    },
}

impl SessionEvent {
    pub fn token_hash(&self) -> &str {
        match self {
            SessionEvent::Warning { token_hash, .. }
            | SessionEvent::Expired { token_hash, .. }
            | SessionEvent::Ended { token_hash, .. } => token_hash,
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Warning { .. } => "warning",
            SessionEvent::Expired { .. } => "expired",
            SessionEvent::Ended { .. } => "ended",
        }
    }

    /// Whether no further events follow for this session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Warning { .. })
    }
}

/// Session status as reported to the front end.
#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub time_remaining_ms: u64,
    pub expiring: bool,
}
