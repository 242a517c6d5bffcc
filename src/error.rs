//! Error types for the library server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error codes carried in every error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    DbFailure = 3,
    NoSuchData = 4,
    BookNotAvailable = 7,
    BadValue = 18,
    AlreadyReturned = 22,
    Conflict = 23,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Books not available: {}", join_ids(.book_ids))]
    Unavailable { book_ids: Vec<i32> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Already returned: {0}")]
    AlreadyReturned(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Comma-separated ids for messages
pub(crate) fn join_ids(ids: &[i32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl AppError {
    /// Map a store error raised while writing, turning constraint and
    /// serialization failures into `Conflict`.
    pub fn from_write(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            match db.code().as_deref() {
                // unique_violation
                Some("23505") => {
                    return AppError::Conflict(format!("{} already exists", what));
                }
                // foreign_key_violation
                Some("23503") => {
                    return AppError::Conflict(format!("{} is referenced by issues", what));
                }
                // check_violation, serialization_failure, deadlock_detected, lock_not_available
                Some("23514") | Some("40001") | Some("40P01") | Some("55P03") => {
                    return AppError::Conflict(format!(
                        "Concurrent update on {}, please retry",
                        what
                    ));
                }
                _ => {}
            }
        }
        AppError::Database(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    /// Offending book ids, set for availability rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_ids: Option<Vec<i32>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut book_ids = None;
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchData, msg.clone()),
            AppError::Unavailable { book_ids: ids } => {
                book_ids = Some(ids.clone());
                (
                    StatusCode::CONFLICT,
                    ErrorCode::BookNotAvailable,
                    format!("Books not available: {}", join_ids(ids)),
                )
            }
            AppError::InvalidRequest(msg) | AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::AlreadyReturned(msg) => {
                (StatusCode::CONFLICT, ErrorCode::AlreadyReturned, msg.clone())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorCode::Conflict, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            book_ids,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
