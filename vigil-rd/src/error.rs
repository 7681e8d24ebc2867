//! Error types for vigil-rd
//!
//! Component errors stay typed inside the engine; this module maps them onto
//! HTTP responses with a JSON body `{"error": {"code", "message"}}`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;
use crate::ingest::IngestError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - sequence number already applied
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Conflict (409) - sequence gap, an earlier event is missing
    #[error("Out of order: {0}")]
    OutOfOrder(String),

    /// Unprocessable (422) - e.g., taxonomy reload rejected
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// vigil-common error
    #[error("Common error: {0}")]
    Common(#[from] vigil_common::Error),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Ingest(IngestError::MalformedPayload(msg)) => ApiError::BadRequest(msg),
            EngineError::Ingest(e @ IngestError::OutOfOrderEvent { .. }) => {
                ApiError::OutOfOrder(e.to_string())
            }
            EngineError::Ingest(e) => ApiError::Conflict(e.to_string()),
            EngineError::UnknownUser(user_id) => ApiError::NotFound(format!("user {}", user_id)),
            EngineError::Taxonomy(e) => ApiError::Unprocessable(e.to_string()),
            EngineError::Context(e) => ApiError::Internal(e.to_string()),
            EngineError::Alert(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::OutOfOrder(msg) => (StatusCode::CONFLICT, "OUT_OF_ORDER", msg),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE", msg)
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
