//! Bearer token authentication for session routes.
//!
//! Every authenticated call carries `Authorization: Bearer <token>`. The
//! token is both the credential and the key of the caller's session: the
//! middleware resolves it to a live session (creating it on first use) and
//! hands the session to the route through request extensions.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use flight_sessions_core::Session;
use std::sync::Arc;

use crate::error::{ApiError, ApiResponse};
use crate::SharedState;

/// Extract bearer token from the Authorization header.
///
/// Looks for header in format: `Authorization: Bearer <token>`
/// Returns None if header is missing, malformed, or uses a different auth scheme.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Resolve the caller's session or reject the request.
pub async fn session_middleware(
    State(state): State<Arc<SharedState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(req.headers()) {
        Some(token) => token.to_string(),
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::failure("Missing bearer token")),
            )
                .into_response();
        }
    };

    match state.sessions.get_or_create(&token) {
        Ok(session) => {
            req.extensions_mut().insert::<Arc<Session>>(session);
            next.run(req).await
        }
        Err(err) => ApiError(err).into_response(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
