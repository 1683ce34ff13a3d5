use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::access::AccessError;
use crate::engine::EngineError;

/// The HTTP error taxonomy. Every failure renders as `{"detail": ...}` with
/// a message naming the failing field or rule.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication credentials were not provided.")]
    Unauthorized,
    #[error("You do not have permission to perform this action.")]
    Forbidden,
    #[error("Not found.")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref e) = self {
            tracing::error!("internal error: {e}");
        }
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Unauthorized => ApiError::Unauthorized,
            AccessError::Forbidden => ApiError::Forbidden,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(_) => ApiError::NotFound,
            EngineError::Conflict(_) => ApiError::Validation(
                "The room is unavailable in the selected time period.".into(),
            ),
            EngineError::PastStart => {
                ApiError::Validation("start_time must not be in the past.".into())
            }
            EngineError::EndBeforeStart => {
                ApiError::Validation("end_time must not be before start_time.".into())
            }
            EngineError::DuplicateNumber(n) => {
                ApiError::Validation(format!("room with number {n} already exists."))
            }
            EngineError::DuplicateUsername(_) => {
                ApiError::Validation("A user with that username already exists.".into())
            }
            EngineError::InvalidField(msg) => ApiError::Validation(format!("{msg}.")),
            EngineError::AlreadyExists(id) => {
                ApiError::Validation(format!("identifier already exists: {id}."))
            }
            EngineError::LimitExceeded(msg) => ApiError::Validation(format!("{msg}.")),
            EngineError::WalError(e) => ApiError::Internal(e),
        }
    }
}
