use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, models::session::SessionRecord, state::AppState};

/// The caller's live session, inserted into request extensions by
/// [`require_session`].
#[derive(Clone)]
pub struct AuthSession {
    pub record: SessionRecord,
    /// The raw bearer token, kept so handlers can extend or end the session.
    pub token: String,
}

/// Extracts the bearer token from the `Authorization` header.
///
/// # Arguments
///
/// * `headers` - The request headers.
///
/// # Returns
///
/// An `Option` containing the token if a well-formed header is present.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// A middleware that requires a live session.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The downstream `Response`, or a 401 when the token is missing, unknown or
/// expired.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking session...");

    let Some(token) = extract_bearer_token(request.headers()) else {
        tracing::warn!("❌ No bearer token found");
        return AppError::Authentication("Missing bearer token".to_string()).into_response();
    };

    let record = match state.sessions.lookup(&token).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return AppError::Authentication("Session expired or unknown".to_string())
                .into_response();
        }
        Err(e) => return e.into_response(),
    };

    tracing::debug!("✅ Session valid for user: {}", record.user_id);
    request
        .extensions_mut()
        .insert(AuthSession { record, token });

    next.run(request).await
}
