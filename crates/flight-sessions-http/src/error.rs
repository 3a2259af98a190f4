//! Mapping of session failures onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use flight_sessions_core::{ErrorClass, SessionError};
use serde::Serialize;

/// Response envelope shared by every route.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<usize>,
}

impl ApiResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            capacity: None,
            used: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: None,
            capacity: None,
            used: None,
        }
    }
}

/// A [`SessionError`] on its way out to an HTTP client.
#[derive(Debug)]
pub struct ApiError(pub SessionError);

/// HTTP status for a failure class.
pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorClass::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(err.class());
        let mut body = ApiResponse::failure(err.to_string());
        body.code = Some(err.code());
        match err {
            SessionError::PoolCapacityExceeded { capacity, used } => {
                body.capacity = Some(capacity);
                body.used = Some(used);
            }
            SessionError::TokenCapacityExceeded { capacity } => body.capacity = Some(capacity),
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}
