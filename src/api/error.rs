//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::TokenError;
use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::storage::StorageError;
use crate::validation::{FieldErrors, NON_FIELD_ERRORS};

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    /// `{field: [messages]}` for one record, a list of those for a batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Validation failed")]
    Validation(FieldErrors),
    #[error("Batch validation failed")]
    BatchValidation(Vec<FieldErrors>),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, fields) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication credentials were not provided or are invalid".to_string(),
                None,
            ),
            ApiError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "Token expired, re-authenticate".to_string(),
                None,
            ),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "No active account found with the given credentials".to_string(),
                None,
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail, None),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail, None),
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION",
                "Invalid input".to_string(),
                serde_json::to_value(errors).ok(),
            ),
            ApiError::BatchValidation(errors) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION",
                "One or more entries are invalid".to_string(),
                serde_json::to_value(errors).ok(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                fields,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Field errors for a failed UNIQUE constraint, named the way clients send
/// the fields (`patient`, not `patient_id`).
pub fn unique_errors(columns: &[String]) -> FieldErrors {
    let fields: Vec<&str> = columns.iter().map(|c| api_field_name(c)).collect();
    let mut errors = FieldErrors::new();
    match fields.as_slice() {
        [single] => {
            errors.insert(
                single.to_string(),
                vec![format!("A record with this {single} already exists.")],
            );
        }
        many => {
            errors.insert(
                NON_FIELD_ERRORS.to_string(),
                vec![format!("The fields {} must make a unique set.", many.join(", "))],
            );
        }
    }
    errors
}

fn api_field_name(column: &str) -> &str {
    column.strip_suffix("_id").unwrap_or(column)
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        if let Some(columns) = err.unique_violation() {
            return ApiError::Validation(unique_errors(&columns));
        }
        match err {
            DatabaseError::NotFound { entity_type, .. } => {
                ApiError::NotFound(format!("No {entity_type} matches the given query."))
            }
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, Some(msg)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.starts_with("FOREIGN KEY") =>
            {
                let mut errors = FieldErrors::new();
                errors.insert(
                    NON_FIELD_ERRORS.to_string(),
                    vec!["Referenced object does not exist.".to_string()],
                );
                ApiError::Validation(errors)
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => e.into(),
            CoreError::Storage(e) => e.into(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Background task failed: {err}"))
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::TokenExpired,
            TokenError::Encoding(detail) => ApiError::Internal(detail),
            TokenError::Malformed | TokenError::BadSignature | TokenError::WrongType => {
                ApiError::Unauthorized
            }
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        DatabaseError::from(err).into()
    }
}
