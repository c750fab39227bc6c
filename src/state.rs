use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::repositories::keywords::PgKeywordSource;
use crate::repositories::session::PgSessionStore;
use crate::services::identity::{TokenVerifier, UserInfoVerifier};
use crate::services::news::NewsAggregator;
use crate::services::search::GNewsClient;
use crate::services::sessions::{SessionManager, SystemClock};

/// Bounds the number of in-flight requests to the search API across all
/// aggregations.
#[derive(Clone)]
pub struct SearchLimiter {
    semaphore: Arc<Semaphore>,
}

impl SearchLimiter {
    /// Creates a new `SearchLimiter`.
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Acquires a permit from the semaphore.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .map_err(|e| AppError::Internal(format!("Search limiter closed: {}", e)))
    }

    /// Returns the number of available permits.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// The production news aggregator.
pub type PgNewsAggregator = NewsAggregator<PgKeywordSource, GNewsClient>;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The Redis connection manager.
    pub redis: ConnectionManager,
    /// The application's configuration.
    pub config: Config,
    /// The session lifecycle manager.
    pub sessions: Arc<SessionManager>,
    /// The news aggregator.
    pub news: Arc<PgNewsAggregator>,
    /// Resolves bearer tokens to their owners at session start.
    pub identity: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url, config.db_pool_size)?;
        tracing::info!("✅ PostgreSQL Pool initialized (max {} connections)", config.db_pool_size);

        crate::repositories::session::ensure_schema(&db).await?;

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        let sessions = Arc::new(SessionManager::new(
            Arc::new(PgSessionStore::new(db.clone())),
            Arc::new(SystemClock),
            config.session_policy,
        ));
        tracing::info!(
            "✅ Session manager initialized ({}s window, warning {}s before expiry)",
            config.session_policy.duration.as_secs(),
            config.session_policy.warning_lead.as_secs()
        );

        let news = Arc::new(NewsAggregator::new(
            PgKeywordSource::new(db.clone()),
            GNewsClient::new(&config.news)?,
            SearchLimiter::new(config.news.max_concurrent_searches),
            config.news.trade_limit,
        ));
        tracing::info!(
            "✅ News aggregator initialized (max {} concurrent searches)",
            config.news.max_concurrent_searches
        );

        let identity: Arc<dyn TokenVerifier> = Arc::new(UserInfoVerifier::new(&config.identity)?);
        tracing::info!("✅ Token verification via {}", config.identity.userinfo_url);

        Ok(AppState {
            redis,
            config: config.clone(),
            sessions,
            news,
            identity,
        })
    }
}
