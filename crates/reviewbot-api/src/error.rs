use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP-facing error type for the webhook-ingress and connect/admin routes.
/// Maps onto the status codes `6. EXTERNAL INTERFACES` assigns to each
/// failure mode; everything else is collapsed to 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("database error: {0}")]
    Database(#[from] reviewbot_db::DbError),

    #[error("job error: {0}")]
    Job(#[from] reviewbot_core::JobError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type) = match &self {
            ApiError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "invalid_payload"),
            ApiError::InvalidSignature(_) => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            ApiError::Database(reviewbot_db::DbError::RepoNotFound(_, _)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            ApiError::Job(_) => (StatusCode::INTERNAL_SERVER_ERROR, "job_error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse { error: error_type.to_string(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::InvalidPayload(format!("JSON parsing error: {e}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
