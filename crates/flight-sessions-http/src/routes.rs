//! HTTP route handlers.
//!
//! | route | purpose |
//! |---|---|
//! | `POST /api/handshake` | issue a bearer token for a user |
//! | `GET /api/session` | get or create the caller's session |
//! | `DELETE /api/session` | close the caller's session |
//! | `GET /api/pool` | pool capacity and usage |

use axum::{
    extract::{ConnectInfo, State},
    http::{Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use flight_sessions_core::Session;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::auth::extract_bearer_token;
use crate::error::{ApiError, ApiResponse};
use crate::SharedState;

#[derive(Deserialize)]
pub struct HandshakeRequest {
    pub user: String,
}

/// Handler for POST /api/handshake
///
/// Returns 429 when the token table is full of tokens backing live sessions.
pub async fn handshake(
    State(state): State<Arc<SharedState>>,
    extensions: Extensions,
    Json(request): Json<HandshakeRequest>,
) -> Response {
    let user = request.user.trim();
    if user.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::failure("Missing required argument: user")),
        )
            .into_response();
    }

    let origin = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let details = match state.sessions.issue_token(user, &origin) {
        Ok(details) => details,
        Err(err) => return ApiError(err).into_response(),
    };
    (
        StatusCode::OK,
        Json(ApiResponse::ok(serde_json::json!({
            "token": details.token,
            "userIdentity": details.user_identity,
            "remoteOrigin": details.remote_origin,
            "expiresAt": details.expires_at,
        }))),
    )
        .into_response()
}

/// Handler for GET /api/session (behind the session middleware)
pub async fn get_session(
    Extension(session): Extension<Arc<Session>>,
) -> (StatusCode, Json<ApiResponse>) {
    let data = serde_json::to_value(session.info()).unwrap_or_default();
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

/// Handler for DELETE /api/session
///
/// Always succeeds; closing an unknown or already closed token is a no-op.
pub async fn close_session(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<ApiResponse>) {
    if let Some(token) = extract_bearer_token(&headers) {
        state.sessions.close(token);
    }
    (
        StatusCode::OK,
        Json(ApiResponse::ok(serde_json::json!({ "closed": true }))),
    )
}

/// Handler for GET /api/pool
pub async fn pool_stats(State(state): State<Arc<SharedState>>) -> (StatusCode, Json<ApiResponse>) {
    let data = serde_json::to_value(state.sessions.stats()).unwrap_or_default();
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}
