use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{error::AppError, middleware_layer::auth::AuthSession, state::AppState};

/// Length of one rate limit window in seconds.
const WINDOW_SECS: i64 = 60;

/// Builds the Redis key counting a user's news requests in the window
/// containing `now`.
pub fn news_window_key(user_id: Uuid, now: DateTime<Utc>) -> String {
    format!(
        "rate_limit:news:{}:{}",
        user_id,
        now.timestamp().div_euclid(WINDOW_SECS)
    )
}

/// Seconds until the window containing `now` closes.
pub fn seconds_until_reset(now: DateTime<Utc>) -> i64 {
    WINDOW_SECS - now.timestamp().rem_euclid(WINDOW_SECS)
}

/// Creates the window counter with its expiry and increments it, in one
/// transaction. The counter never exists without a TTL.
pub fn window_pipeline(key: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(WINDOW_SECS)
        .arg("NX")
        .ignore()
        .cmd("INCR")
        .arg(key);
    pipe
}

/// A middleware that rate limits news aggregation per user.
///
/// Every aggregation fans out to the external search API once per keyword,
/// so the per-user budget protects the API quota. Redis failures let the
/// request through.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or an error `AppError`.
pub async fn rate_limit_news(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(user_id) = req
        .extensions()
        .get::<AuthSession>()
        .map(|session| session.record.user_id)
    else {
        return AppError::Authentication("Missing session".to_string()).into_response();
    };

    let now = Utc::now();
    let key = news_window_key(user_id, now);
    let limit = state.config.news.rate_limit_per_minute;

    let count: Option<(u32,)> = window_pipeline(&key)
        .query_async(&mut state.redis.clone())
        .await
        .map_err(|e| tracing::error!("❌ Redis rate limit update failed for {}: {}", key, e))
        .ok();

    if count.is_some_and(|(attempts,)| attempts > limit) {
        return AppError::RateLimitExceeded(format!(
            "News limit exceeded. Try again in {} seconds",
            seconds_until_reset(now)
        ))
        .into_response();
    }

    next.run(req).await
}
