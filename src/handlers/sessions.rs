use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    Extension, Json,
};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    handlers::json::json_response,
    middleware_layer::auth::{extract_bearer_token, AuthSession},
    models::session::{SessionEvent, SessionOrigin, SessionRecord, SessionStatus},
    services::identity::resolve_session_owner,
    state::AppState,
    validation::session::validate_bearer_token,
};

/// The request payload for starting a session.
#[derive(Deserialize, Debug, Default)]
pub struct CreateSessionRequest {
    /// The user the client expects the token to belong to. Checked against
    /// the identity provider, never trusted on its own.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// The response payload for session-changing requests.
#[derive(Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStatus>,
}

/// The caller's live sessions.
#[derive(Serialize)]
pub struct SessionList {
    pub sessions: Vec<SessionRecord>,
    pub count: usize,
}

/// Works out where a request came from.
///
/// The first `X-Forwarded-For` hop wins over the socket peer. The user agent
/// is truncated to 512 bytes.
pub fn client_origin(headers: &HeaderMap, peer: Option<SocketAddr>) -> SessionOrigin {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            let mut end = v.len().min(512);
            while !v.is_char_boundary(end) {
                end -= 1;
            }
            v[..end].to_string()
        });

    SessionOrigin {
        ip_address: forwarded.or_else(|| peer.map(|p| p.ip().to_string())),
        user_agent,
    }
}

/// Starts a session for the owner of the bearer token, as reported by the
/// identity provider.
#[axum::debug_handler]
pub async fn create_session(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Response> {
    let token = extract_bearer_token(&headers)
        .ok_or_else(|| AppError::Authentication("Missing bearer token".to_string()))?;
    validate_bearer_token(&token)?;

    let user_id = resolve_session_owner(state.identity.as_ref(), &token, payload.user_id).await?;

    tracing::info!("🔐 Session start for user: {}", user_id);
    let origin = client_origin(&headers, Some(peer));
    let record = state.sessions.create_session(user_id, &token, origin).await;

    json_response(
        StatusCode::CREATED,
        &SessionResponse {
            success: true,
            message: "Session started".to_string(),
            session: Some(state.sessions.status(&record)),
        },
    )
}

/// Reports the remaining lifetime of the caller's session.
#[axum::debug_handler]
pub async fn current_session(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<Response> {
    json_response(StatusCode::OK, &state.sessions.status(&session.record))
}

/// Extends the caller's session by a full window.
#[axum::debug_handler]
pub async fn extend_session(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<Response> {
    let expires_at = state
        .sessions
        .record_activity(&session.token)
        .await
        .ok_or_else(|| AppError::Authentication("Session expired or unknown".to_string()))?;

    let record = SessionRecord {
        expires_at,
        ..session.record
    };

    json_response(
        StatusCode::OK,
        &SessionResponse {
            success: true,
            message: "Session extended".to_string(),
            session: Some(state.sessions.status(&record)),
        },
    )
}

/// Ends the caller's session.
#[axum::debug_handler]
pub async fn end_session(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", session.record.user_id);
    state.sessions.invalidate_session(&session.token).await;

    json_response(
        StatusCode::OK,
        &SessionResponse {
            success: true,
            message: "Logout successful".to_string(),
            session: None,
        },
    )
}

/// Lists the caller's live sessions.
#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<Response> {
    let sessions = state
        .sessions
        .list_active_sessions(session.record.user_id)
        .await;

    json_response(
        StatusCode::OK,
        &SessionList {
            count: sessions.len(),
            sessions,
        },
    )
}

/// Follows one session's events on `receiver`, ending after its terminal
/// event (`expired` or `ended`) or when the channel closes.
pub fn session_event_stream(
    receiver: broadcast::Receiver<SessionEvent>,
    token_hash: String,
) -> impl Stream<Item = SessionEvent> {
    stream::unfold(
        (receiver, token_hash, false),
        |(mut receiver, token_hash, finished)| async move {
            if finished {
                return None;
            }
            loop {
                match receiver.recv().await {
                    Ok(event) if event.token_hash() == token_hash => {
                        let last = event.is_terminal();
                        return Some((event, (receiver, token_hash, last)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("⚠️  Session event stream lagged, {} events skipped", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    )
}

/// Streams the caller's warning, expiry and logout notifications as
/// Server-Sent Events.
pub async fn session_events(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let events = session_event_stream(state.sessions.subscribe(), session.record.token_hash)
        .map(|event| {
            let data = sonic_rs::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok::<_, Infallible>(Event::default().event(event.name()).data(data))
        });

    Sse::new(events).keep_alive(KeepAlive::default())
}
