//! API error types for the webhook/admin server.
//!
//! Maps core domain errors to HTTP status codes and JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API error type for route handlers.
pub enum ApiError {
    /// Internal storage/database error.
    Storage(ops_core::error::StorageError),
    /// Internal KV/queue error.
    Queue(ops_core::error::QueueError),
    /// Approval workflow error (includes guardrail blocks and invalid-state transitions).
    Approval(ops_core::error::ApprovalError),
    /// Requested resource not found.
    NotFound(String),
    /// Bad request (invalid payload, unverifiable signature, unknown source).
    BadRequest(String),
    /// The request lacked valid authentication.
    Unauthorized,
}

impl From<ops_core::error::StorageError> for ApiError {
    fn from(err: ops_core::error::StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<ops_core::error::QueueError> for ApiError {
    fn from(err: ops_core::error::QueueError) -> Self {
        Self::Queue(err)
    }
}

impl From<ops_core::error::ApprovalError> for ApiError {
    fn from(err: ops_core::error::ApprovalError) -> Self {
        Self::Approval(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            Self::Queue(e) => {
                tracing::error!(error = %e, "queue error");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            Self::Approval(ops_core::error::ApprovalError::NotFound { what, id }) => {
                (StatusCode::NOT_FOUND, format!("{what} {id} not found"))
            }
            Self::Approval(ops_core::error::ApprovalError::InvalidState { what, id, status, action }) => (
                StatusCode::CONFLICT,
                format!("{what} {id} is {status}, cannot {action}"),
            ),
            Self::Approval(ops_core::error::ApprovalError::GuardrailBlocked { reason }) => {
                (StatusCode::FORBIDDEN, reason)
            }
            Self::Approval(e) => {
                tracing::error!(error = %e, "approval error");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
        };

        let body = axum::Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
