//! Session lifecycle: a fixed, activity-refreshed window per bearer token,
//! a warning before the window closes, and logout once it has.
//!
//! Every live token owns one timer task. Re-arming a token aborts its previous
//! timer under the same lock that installs the new one, and each timer carries
//! a generation number so a superseded timer can never expire a refreshed
//! session.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};
use uuid::Uuid;

use crate::{
    crypto::token::hash_token,
    error::Result,
    models::session::{SessionEvent, SessionOrigin, SessionPolicy, SessionRecord, SessionStatus},
    repositories::session::SessionStore,
};

/// Capacity of the event channel; slow subscribers lose the oldest events.
const EVENT_CAPACITY: usize = 256;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock time derived from tokio's clock, so it pauses and advances
/// together with `tokio::time::pause`/`advance`.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin_wall: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin_wall: Utc::now(),
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_wall + elapsed
    }
}

struct ArmedTimer {
    user_id: Uuid,
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
    events: broadcast::Sender<SessionEvent>,
    timers: Mutex<HashMap<String, ArmedTimer>>,
    generation: AtomicU64,
}

/// Enforces the session window on top of the identity provider's tokens.
///
/// Store failures are logged and swallowed: the timers keep running from
/// in-memory state, and only a fully expired session escalates (the record
/// is deleted and [`SessionEvent::Expired`] is published).
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Creates a new `SessionManager`.
    ///
    /// # Arguments
    ///
    /// * `store` - Where session records live.
    /// * `clock` - Source of "now" for expiry arithmetic.
    /// * `policy` - Session duration and warning lead.
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                policy,
                events,
                timers: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.inner.policy
    }

    /// Subscribes to warning, expiry and logout notifications of every session.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Number of sessions with an armed timer.
    pub fn armed_timers(&self) -> usize {
        self.inner.lock_timers().len()
    }

    /// Starts a session for `user_id` and arms its warning timer.
    ///
    /// The record is returned even when it could not be persisted.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        token: &str,
        origin: SessionOrigin,
    ) -> SessionRecord {
        let now = self.inner.clock.now();
        let record = SessionRecord {
            user_id,
            token_hash: hash_token(token),
            created_at: now,
            last_activity: now,
            expires_at: self.inner.policy.expiry_from(now),
            ip_address: origin.ip_address,
            user_agent: origin.user_agent,
        };

        match self.inner.store.insert(&record).await {
            Ok(()) => tracing::info!("✅ Session created for user {}", user_id),
            Err(e) => tracing::error!("❌ Failed to persist session for user {}: {}", user_id, e),
        }

        self.inner
            .arm(record.token_hash.clone(), user_id, record.expires_at);
        record
    }

    /// Pushes the session's expiry to `now + duration` and re-arms its timer.
    ///
    /// Returns the new expiry, or `None` when the token is unknown or already
    /// expired. If the store is unreachable the in-memory timer is still
    /// refreshed.
    pub async fn record_activity(&self, token: &str) -> Option<DateTime<Utc>> {
        let token_hash = hash_token(token);
        let now = self.inner.clock.now();
        let expires_at = self.inner.policy.expiry_from(now);

        let user_id = match self.inner.store.touch(&token_hash, now, expires_at).await {
            Ok(Some(record)) => record.user_id,
            Ok(None) => {
                tracing::debug!("Activity for unknown or expired session ignored");
                return None;
            }
            Err(e) => {
                tracing::error!("❌ Failed to persist session activity: {}", e);
                self.inner.armed_user(&token_hash)?
            }
        };

        self.inner.arm(token_hash, user_id, expires_at);
        tracing::debug!("🔄 Session extended for user {} until {}", user_id, expires_at);
        Some(expires_at)
    }

    /// Deletes the session, disarms its timer and publishes
    /// [`SessionEvent::Ended`]. Absent tokens are a no-op.
    pub async fn invalidate_session(&self, token: &str) {
        let token_hash = hash_token(token);
        let user_id = match self.inner.disarm(&token_hash) {
            Some(user_id) => Some(user_id),
            None => match self.inner.store.find(&token_hash).await {
                Ok(record) => record.map(|r| r.user_id),
                Err(e) => {
                    tracing::error!("❌ Failed to load session before invalidation: {}", e);
                    None
                }
            },
        };

        match self.inner.store.delete(&token_hash).await {
            Ok(true) => tracing::info!("👋 Session invalidated"),
            Ok(false) => tracing::debug!("Session already gone"),
            Err(e) => tracing::error!("❌ Failed to delete session: {}", e),
        }

        if let Some(user_id) = user_id {
            self.inner.publish(SessionEvent::Ended {
                user_id,
                token_hash,
            });
        }
    }

    /// Sessions of `user_id` that have not expired yet.
    pub async fn list_active_sessions(&self, user_id: Uuid) -> Vec<SessionRecord> {
        match self
            .inner
            .store
            .list_active(user_id, self.inner.clock.now())
            .await
        {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!("❌ Failed to list sessions for user {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    /// Deletes every record whose expiry has passed. Returns how many went.
    pub async fn sweep_expired(&self) -> u64 {
        match self.inner.store.delete_expired(self.inner.clock.now()).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!("🧹 Removed {} expired sessions", removed);
                }
                removed
            }
            Err(e) => {
                tracing::error!("❌ Expired session sweep failed: {}", e);
                0
            }
        }
    }

    /// Resolves a bearer token to its live session.
    ///
    /// Expired records are invalidated on the way and reported as `None`.
    pub async fn lookup(&self, token: &str) -> Result<Option<SessionRecord>> {
        let Some(record) = self.inner.store.find(&hash_token(token)).await? else {
            return Ok(None);
        };

        if record.is_expired(self.inner.clock.now()) {
            tracing::warn!("❌ Session expired for user: {}", record.user_id);
            self.invalidate_session(token).await;
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Whether `record` is inside its warning window.
    pub fn is_expiring(&self, record: &SessionRecord) -> bool {
        record.is_expiring(self.inner.clock.now(), self.inner.policy.warning_lead)
    }

    /// Non-negative time left on `record`.
    pub fn time_remaining(&self, record: &SessionRecord) -> Duration {
        record.time_remaining(self.inner.clock.now())
    }

    pub fn status(&self, record: &SessionRecord) -> SessionStatus {
        SessionStatus {
            user_id: record.user_id,
            expires_at: record.expires_at,
            time_remaining_ms: millis(self.time_remaining(record)),
            expiring: self.is_expiring(record),
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for (_, timer) in self.inner.lock_timers().drain() {
            timer.handle.abort();
        }
    }
}

/// Runs [`SessionManager::sweep_expired`] every `period`, starting one period
/// from now.
pub fn spawn_sweeper(manager: Arc<SessionManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tracing::debug!("🧹 Running scheduled sweep of expired sessions...");
            manager.sweep_expired().await;
        }
    })
}

impl Inner {
    fn lock_timers(&self) -> MutexGuard<'_, HashMap<String, ArmedTimer>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn armed_user(&self, token_hash: &str) -> Option<Uuid> {
        self.lock_timers().get(token_hash).map(|t| t.user_id)
    }

    fn is_current(&self, token_hash: &str, generation: u64) -> bool {
        self.lock_timers()
            .get(token_hash)
            .is_some_and(|t| t.generation == generation)
    }

    fn arm(self: &Arc<Self>, token_hash: String, user_id: Uuid, expires_at: DateTime<Utc>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut timers = self.lock_timers();

        if let Some(previous) = timers.remove(&token_hash) {
            previous.handle.abort();
        }

        let handle = tokio::spawn(run_timer(
            Arc::downgrade(self),
            token_hash.clone(),
            user_id,
            expires_at,
            generation,
        ));

        timers.insert(
            token_hash,
            ArmedTimer {
                user_id,
                generation,
                handle,
            },
        );
    }

    /// Aborts the token's timer and returns the user it was armed for.
    fn disarm(&self, token_hash: &str) -> Option<Uuid> {
        let timer = self.lock_timers().remove(token_hash)?;
        timer.handle.abort();
        Some(timer.user_id)
    }

    /// Removes the timer entry if it still belongs to `generation`.
    fn retire(&self, token_hash: &str, generation: u64) -> bool {
        let mut timers = self.lock_timers();
        match timers.get(token_hash) {
            Some(timer) if timer.generation == generation => {
                timers.remove(token_hash);
                true
            }
            _ => false,
        }
    }

    fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("No subscribers for session event");
        }
    }

    async fn expire(&self, token_hash: &str, user_id: Uuid, generation: u64) {
        if !self.retire(token_hash, generation) {
            return;
        }

        if let Err(e) = self.store.delete(token_hash).await {
            tracing::error!("❌ Failed to delete expired session of user {}: {}", user_id, e);
        }

        tracing::warn!("⏰ Session expired for user {}, logging out", user_id);
        self.publish(SessionEvent::Expired {
            user_id,
            token_hash: token_hash.to_string(),
        });
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn run_timer(
    inner: Weak<Inner>,
    token_hash: String,
    user_id: Uuid,
    mut expires_at: DateTime<Utc>,
    generation: u64,
) {
    loop {
        let warn_in = match inner.upgrade() {
            Some(inner) => inner.policy.warning_delay(expires_at, inner.clock.now()),
            None => return,
        };
        tokio::time::sleep(warn_in).await;

        let expire_in = {
            let Some(inner) = inner.upgrade() else { return };
            if !inner.is_current(&token_hash, generation) {
                return;
            }
            let remaining = (expires_at - inner.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            tracing::info!(
                "⚠️  Session of user {} expires in {}s",
                user_id,
                remaining.as_secs()
            );
            inner.publish(SessionEvent::Warning {
                user_id,
                token_hash: token_hash.clone(),
                time_remaining_ms: millis(remaining),
            });
            remaining
        };
        tokio::time::sleep(expire_in).await;

        let Some(inner) = inner.upgrade() else { return };
        if !inner.is_current(&token_hash, generation) {
            return;
        }

        // Another instance may have extended the session in the meantime.
        match inner.store.find(&token_hash).await {
            Ok(Some(record)) if !record.is_expired(inner.clock.now()) => {
                tracing::debug!("🔄 Session of user {} was extended elsewhere", user_id);
                expires_at = record.expires_at;
                continue;
            }
            Ok(_) => {}
            Err(e) => tracing::error!("❌ Could not re-check session of user {}: {}", user_id, e),
        }

        inner.expire(&token_hash, user_id, generation).await;
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::repositories::memory::MemorySessionStore;
    use async_trait::async_trait;

    const TOKEN: &str = "provider-access-token-0001";
    const OTHER_TOKEN: &str = "provider-access-token-0002";

    struct Harness {
        store: Arc<MemorySessionStore>,
        clock: Arc<TokioClock>,
        manager: Arc<SessionManager>,
        start: DateTime<Utc>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(TokioClock::new());
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            clock.clone(),
            SessionPolicy::default(),
        ));
        let start = clock.now();
        Harness {
            store,
            clock,
            manager,
            start,
        }
    }

    impl Harness {
        fn elapsed(&self) -> chrono::Duration {
            self.clock.now() - self.start
        }
    }

    fn assert_near(actual: chrono::Duration, expected: chrono::Duration) {
        let drift = (actual - expected).num_milliseconds().abs();
        assert!(drift <= 1_000, "expected ~{}, got {}", expected, actual);
    }

    async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(3600), rx.recv())
            .await
            .expect("no session event within an hour")
            .expect("event channel closed")
    }

    #[tokio::test(start_paused = true)]
    async fn warns_two_minutes_before_expiry_then_logs_out() {
        let h = harness();
        let mut rx = h.manager.subscribe();
        let user_id = Uuid::new_v4();

        let record = h
            .manager
            .create_session(user_id, TOKEN, SessionOrigin::default())
            .await;
        assert_eq!(record.expires_at, h.start + chrono::Duration::minutes(10));
        assert_eq!(h.store.len(), 1);

        match next_event(&mut rx).await {
            SessionEvent::Warning {
                user_id: warned,
                time_remaining_ms,
                ..
            } => {
                assert_eq!(warned, user_id);
                assert!((119_000..=120_000).contains(&time_remaining_ms));
            }
            other => panic!("expected warning, got {:?}", other),
        }
        assert_near(h.elapsed(), chrono::Duration::minutes(8));

        assert!(matches!(next_event(&mut rx).await, SessionEvent::Expired { .. }));
        assert_near(h.elapsed(), chrono::Duration::minutes(10));
        assert!(h.store.is_empty());
        assert_eq!(h.manager.armed_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_pushes_expiry_and_rearms_the_warning() {
        let h = harness();
        let mut rx = h.manager.subscribe();
        h.manager
            .create_session(Uuid::new_v4(), TOKEN, SessionOrigin::default())
            .await;

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        let called_at = h.clock.now();
        let expires_at = h.manager.record_activity(TOKEN).await.unwrap();
        assert_eq!(expires_at, called_at + chrono::Duration::minutes(10));

        assert!(matches!(next_event(&mut rx).await, SessionEvent::Warning { .. }));
        assert_near(h.elapsed(), chrono::Duration::minutes(13));
        assert_eq!(h.manager.armed_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_activity_sets_expiry_to_call_time_plus_duration() {
        let h = harness();
        h.manager
            .create_session(Uuid::new_v4(), TOKEN, SessionOrigin::default())
            .await;

        for step in [30u64, 90, 7, 240, 1] {
            tokio::time::sleep(Duration::from_secs(step)).await;
            let called_at = h.clock.now();
            let expires_at = h.manager.record_activity(TOKEN).await.unwrap();
            assert_eq!(expires_at, called_at + chrono::Duration::minutes(10));

            let stored = h.store.find(&hash_token(TOKEN)).await.unwrap().unwrap();
            assert_eq!(stored.expires_at, expires_at);
            assert_eq!(stored.last_activity, called_at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_activity_leaves_a_single_timer() {
        let h = harness();
        h.manager
            .create_session(Uuid::new_v4(), TOKEN, SessionOrigin::default())
            .await;

        let (a, b) = tokio::join!(
            h.manager.record_activity(TOKEN),
            h.manager.record_activity(TOKEN)
        );
        assert_eq!(a, b);
        assert_eq!(h.manager.armed_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_on_unknown_token_is_a_no_op() {
        let h = harness();
        assert!(h.manager.record_activity(TOKEN).await.is_none());
        assert_eq!(h.manager.armed_timers(), 0);
        assert!(h.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_announces_the_logout_then_goes_silent() {
        let h = harness();
        let mut rx = h.manager.subscribe();
        let user_id = Uuid::new_v4();
        h.manager
            .create_session(user_id, TOKEN, SessionOrigin::default())
            .await;

        h.manager.invalidate_session(TOKEN).await;
        assert!(h.store.is_empty());
        assert_eq!(h.manager.armed_timers(), 0);

        let ended = next_event(&mut rx).await;
        assert!(ended.is_terminal());
        match ended {
            SessionEvent::Ended {
                user_id: ended_user,
                token_hash,
            } => {
                assert_eq!(ended_user, user_id);
                assert_eq!(token_hash, hash_token(TOKEN));
            }
            other => panic!("expected ended, got {:?}", other),
        }

        let silence = tokio::time::timeout(Duration::from_secs(20 * 60), rx.recv()).await;
        assert!(silence.is_err(), "no event expected after invalidation");
    }

    #[tokio::test(start_paused = true)]
    async fn invalidating_an_absent_token_leaves_the_store_alone() {
        let h = harness();
        h.manager
            .create_session(Uuid::new_v4(), OTHER_TOKEN, SessionOrigin::default())
            .await;

        let mut rx = h.manager.subscribe();

        h.manager.invalidate_session(TOKEN).await;
        h.manager.invalidate_session(TOKEN).await;

        assert_eq!(h.store.len(), 1);
        assert_eq!(h.manager.armed_timers(), 1);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidating_a_session_armed_elsewhere_still_announces_the_logout() {
        let h = harness();
        let mut rx = h.manager.subscribe();
        let now = h.clock.now();
        let user_id = Uuid::new_v4();
        h.store
            .insert(&SessionRecord {
                user_id,
                token_hash: hash_token(TOKEN),
                created_at: now,
                last_activity: now,
                expires_at: now + chrono::Duration::minutes(10),
                ip_address: None,
                user_agent: None,
            })
            .await
            .unwrap();

        h.manager.invalidate_session(TOKEN).await;

        assert!(h.store.is_empty());
        assert!(matches!(
            next_event(&mut rx).await,
            SessionEvent::Ended { user_id: ended, .. } if ended == user_id
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_exactly_the_expired_records() {
        let h = harness();
        let now = h.clock.now();
        let user_id = Uuid::new_v4();
        for (hash, offset_secs) in [("past", -60i64), ("boundary", 0), ("future", 1), ("later", 600)] {
            h.store
                .insert(&SessionRecord {
                    user_id,
                    token_hash: hash.to_string(),
                    created_at: now - chrono::Duration::minutes(10),
                    last_activity: now - chrono::Duration::minutes(10),
                    expires_at: now + chrono::Duration::seconds(offset_secs),
                    ip_address: None,
                    user_agent: None,
                })
                .await
                .unwrap();
        }

        assert_eq!(h.manager.sweep_expired().await, 2);
        assert!(h.store.find("past").await.unwrap().is_none());
        assert!(h.store.find("boundary").await.unwrap().is_none());
        assert!(h.store.find("future").await.unwrap().is_some());
        assert!(h.store.find("later").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_its_own_interval() {
        let h = harness();
        let now = h.clock.now();
        h.store
            .insert(&SessionRecord {
                user_id: Uuid::new_v4(),
                token_hash: "stale".to_string(),
                created_at: now,
                last_activity: now,
                expires_at: now + chrono::Duration::minutes(1),
                ip_address: None,
                user_agent: None,
            })
            .await
            .unwrap();

        let sweeper = spawn_sweeper(h.manager.clone(), Duration::from_secs(5 * 60));
        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert_eq!(h.store.len(), 1);

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert!(h.store.is_empty());
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn list_and_status_reflect_the_clock() {
        let h = harness();
        let user_id = Uuid::new_v4();
        h.manager
            .create_session(user_id, TOKEN, SessionOrigin::default())
            .await;
        h.manager
            .create_session(user_id, OTHER_TOKEN, SessionOrigin::default())
            .await;
        h.manager
            .create_session(Uuid::new_v4(), "someone-elses-token-123", SessionOrigin::default())
            .await;

        let sessions = h.manager.list_active_sessions(user_id).await;
        assert_eq!(sessions.len(), 2);

        let record = h.manager.lookup(TOKEN).await.unwrap().unwrap();
        let status = h.manager.status(&record);
        assert_eq!(status.time_remaining_ms, 600_000);
        assert!(!status.expiring);

        tokio::time::sleep(Duration::from_secs(8 * 60 + 30)).await;
        assert!(h.manager.is_expiring(&record));
        let remaining = h.manager.time_remaining(&record);
        assert!(remaining <= Duration::from_secs(90) && remaining > Duration::from_secs(89));
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_drops_expired_records() {
        let h = harness();
        let now = h.clock.now();
        h.store
            .insert(&SessionRecord {
                user_id: Uuid::new_v4(),
                token_hash: hash_token(TOKEN),
                created_at: now - chrono::Duration::minutes(11),
                last_activity: now - chrono::Duration::minutes(11),
                expires_at: now - chrono::Duration::minutes(1),
                ip_address: Some("10.0.0.7".to_string()),
                user_agent: None,
            })
            .await
            .unwrap();

        assert!(h.manager.lookup(TOKEN).await.unwrap().is_none());
        assert!(h.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn extension_seen_in_the_store_postpones_logout() {
        let h = harness();
        let mut rx = h.manager.subscribe();
        h.manager
            .create_session(Uuid::new_v4(), TOKEN, SessionOrigin::default())
            .await;

        assert!(matches!(next_event(&mut rx).await, SessionEvent::Warning { .. }));

        // Another instance refreshes the record directly.
        let now = h.clock.now();
        h.store
            .touch(&hash_token(TOKEN), now, now + chrono::Duration::minutes(10))
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(next_event(&mut rx).await, SessionEvent::Warning { .. }));
        assert_near(h.elapsed(), chrono::Duration::minutes(16));
        assert_eq!(h.store.len(), 1);
    }

    struct UnavailableStore;

    fn unavailable() -> AppError {
        AppError::Internal("store offline".to_string())
    }

    #[async_trait]
    impl SessionStore for UnavailableStore {
        async fn insert(&self, _record: &SessionRecord) -> Result<()> {
            Err(unavailable())
        }
        async fn find(&self, _token_hash: &str) -> Result<Option<SessionRecord>> {
            Err(unavailable())
        }
        async fn touch(
            &self,
            _token_hash: &str,
            _last_activity: DateTime<Utc>,
            _expires_at: DateTime<Utc>,
        ) -> Result<Option<SessionRecord>> {
            Err(unavailable())
        }
        async fn delete(&self, _token_hash: &str) -> Result<bool> {
            Err(unavailable())
        }
        async fn list_active(&self, _user_id: Uuid, _now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
            Err(unavailable())
        }
        async fn delete_expired(&self, _now: DateTime<Utc>) -> Result<u64> {
            Err(unavailable())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn store_outage_does_not_stop_the_warning_flow() {
        let clock = Arc::new(TokioClock::new());
        let manager = SessionManager::new(
            Arc::new(UnavailableStore),
            clock.clone(),
            SessionPolicy::default(),
        );
        let mut rx = manager.subscribe();
        let start = clock.now();
        let user_id = Uuid::new_v4();

        let record = manager
            .create_session(user_id, TOKEN, SessionOrigin::default())
            .await;
        assert_eq!(record.user_id, user_id);
        assert!(manager.list_active_sessions(user_id).await.is_empty());
        assert_eq!(manager.sweep_expired().await, 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let called_at = clock.now();
        let expires_at = manager.record_activity(TOKEN).await.unwrap();
        assert_eq!(expires_at, called_at + chrono::Duration::minutes(10));

        assert!(matches!(next_event(&mut rx).await, SessionEvent::Warning { .. }));
        assert_near(clock.now() - start, chrono::Duration::minutes(9));
        assert!(matches!(next_event(&mut rx).await, SessionEvent::Expired { .. }));
        assert_eq!(manager.armed_timers(), 0);
        assert!(manager.lookup(TOKEN).await.is_err());
    }
}
