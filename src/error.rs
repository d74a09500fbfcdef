//! Crate-wide error type
//!
//! Every component returns [`AppResult`]. The HTTP layer maps each variant to
//! a status code and a structured payload (see `api::rest::ApiError`).

use thiserror::Error;

/// Result type for store, aggregation and guard operations
pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by the core components
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad pagination, date format, or enum value. Rejected before querying.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Download-guard violation: the user already has a download in flight
    #[error("user {user_id} already has a download in progress")]
    Conflict {
        user_id: i64,
        active_session: Option<i64>,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidInput(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True for failures whose detail must not reach the caller
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Io(_)
                | AppError::Json(_)
                | AppError::Archive(_)
                | AppError::Internal(_)
        )
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("background task failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_classification() {
        assert!(AppError::Internal("boom".to_string()).is_internal());
        assert!(!AppError::invalid("page must be >= 1").is_internal());
        assert!(!AppError::Conflict { user_id: 1, active_session: Some(3) }.is_internal());
    }

    #[test]
    fn test_not_found_message() {
        let err = AppError::not_found("resource", 42);
        assert_eq!(err.to_string(), "resource 42 not found");
    }
}
