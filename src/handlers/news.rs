use axum::{extract::State, http::StatusCode, response::Response, Extension};

use crate::{
    error::Result,
    handlers::json::json_response,
    middleware_layer::auth::AuthSession,
    models::news::NewsFeed,
    state::AppState,
};

/// Returns the caller's deduplicated, newest-first news feed.
///
/// Upstream failures shrink the feed instead of failing the request.
#[axum::debug_handler]
pub async fn get_news(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<Response> {
    let articles = state.news.aggregate(session.record.user_id).await;
    json_response(StatusCode::OK, &NewsFeed::from(articles))
}
