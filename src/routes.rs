use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    error::{AppError, Result},
    handlers, middleware_layer,
    state::AppState,
};

/// Builds the HTTP router.
///
/// # Arguments
///
/// * `state` - The application state.
///
/// # Returns
///
/// A `Result` containing the `Router`, or a validation error when the
/// configured CORS origin is not a valid header value.
pub fn build_router(state: AppState) -> Result<Router> {
    let origin: HeaderValue = state.config.allowed_origin.parse().map_err(|_| {
        AppError::Validation(format!(
            "Invalid ALLOWED_ORIGIN: {}",
            state.config.allowed_origin
        ))
    })?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let public_routes = Router::new()
        .route("/api/sessions", post(handlers::sessions::create_session))
        .with_state(state.clone());

    let news_routes = Router::new()
        .route("/api/news", get(handlers::news::get_news))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_news,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_session,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/sessions/active", get(handlers::sessions::list_sessions))
        .route(
            "/api/sessions/current",
            get(handlers::sessions::current_session).delete(handlers::sessions::end_session),
        )
        .route(
            "/api/sessions/current/extend",
            post(handlers::sessions::extend_session),
        )
        .route("/api/sessions/events", get(handlers::sessions::session_events))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_session,
        ))
        .with_state(state);

    Ok(Router::new()
        .merge(public_routes)
        .merge(news_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(cors))
}
