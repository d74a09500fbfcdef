//! REST API module for HTTP endpoints
//!
//! - `POST /auth/token`, `POST /auth/refresh` - JWT login and renewal
//! - `GET /api/operation-logs` - Unified activity feed (admin)
//! - `GET /api/generation-history` - Generation events
//! - `POST /api/generations` - Record a script generation
//! - `GET /api/statistics[/trend|/download]` - Usage summary and trends (admin)
//! - `POST /api/operations/export` - Zip export (admin)
//! - `GET /download/:file_name` - Simple file download
//! - `/api/resource-center/resources/...` - Guarded resource downloads
//! - `/api/system-config/configs[/:key]` - Runtime settings

pub mod auth;
pub mod configs;
pub mod downloads;
pub mod export;
pub mod extract;
pub mod generations;
pub mod logs;
pub mod resources;
pub mod statistics;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::activity::PageRequest;
use crate::api::auth::AuthError;
use crate::error::{AppError, AppResult};
use crate::types::Page;

/// Largest page a client may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// URL a client polls while another download is in flight
pub const DOWNLOAD_STATUS_URL: &str = "/api/resource-center/resources/download-status";

/// Common pagination parameters
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    /// 1-based page number (default: 1)
    #[serde(default = "default_page")]
    pub page: i64,
    /// Items per page (default: 10, max: 100)
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

pub(crate) fn default_page() -> i64 {
    1
}

pub(crate) fn default_page_size() -> i64 {
    10
}

impl PaginationParams {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// Validate into a page request
    pub fn to_request(&self) -> AppResult<PageRequest> {
        if self.page_size > MAX_PAGE_SIZE {
            return Err(AppError::invalid(format!(
                "page_size must be <= {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        PageRequest::new(self.page, self.page_size)
    }
}

/// Paginated listing with a caller-facing collection name
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    #[serde(flatten)]
    pub items: Items<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Items<T> {
    Logs(Vec<T>),
    Records(Vec<T>),
}

impl<T> Paginated<T> {
    pub fn logs(page: Page<T>) -> Self {
        Self::from_page(page, Items::Logs)
    }

    pub fn records(page: Page<T>) -> Self {
        Self::from_page(page, Items::Records)
    }

    fn from_page(page: Page<T>, wrap: fn(Vec<T>) -> Items<T>) -> Self {
        Self {
            items: wrap(page.entries),
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        }
    }
}

/// Plain `{message}` acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Where to poll after a download conflict
#[derive(Debug, Serialize)]
pub struct RetryHint {
    pub status_url: String,
    pub active_session_id: Option<i64>,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryHint>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.to_string(),
            retry: None,
            status,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidInput(msg) => ApiError::bad_request(msg),
            AppError::NotFound { .. } => ApiError::not_found(err.to_string()),
            AppError::Conflict {
                user_id,
                active_session,
            } => {
                let mut api = ApiError::new(
                    StatusCode::CONFLICT,
                    "DOWNLOAD_IN_PROGRESS",
                    format!("user {} already has a download in progress", user_id),
                );
                api.retry = Some(RetryHint {
                    status_url: DOWNLOAD_STATUS_URL.to_string(),
                    active_session_id: active_session,
                });
                api
            }
            AppError::Unauthorized(msg) => ApiError::unauthorized(msg),
            AppError::Forbidden(msg) => ApiError::forbidden(msg),
            internal => {
                tracing::error!(error = %internal, "request failed");
                ApiError::internal("internal server error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Store(inner) => inner.into(),
            AuthError::InvalidSecret(_) | AuthError::HashError(_) => {
                tracing::error!(error = %err, "authentication backend failure");
                ApiError::internal("internal server error")
            }
            other => ApiError::unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_409_with_retry() {
        let api: ApiError = AppError::Conflict {
            user_id: 7,
            active_session: Some(31),
        }
        .into();

        assert_eq!(api.status, StatusCode::CONFLICT);
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["code"], "DOWNLOAD_IN_PROGRESS");
        assert_eq!(json["retry"]["active_session_id"], 31);
        assert_eq!(json["retry"]["status_url"], DOWNLOAD_STATUS_URL);
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let api: ApiError = AppError::Internal("disk on fire at /var/db".to_string()).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.error, "internal server error");
    }

    #[test]
    fn test_pagination_bounds() {
        let params = PaginationParams { page: 1, page_size: 101 };
        assert!(params.to_request().is_err());

        let params = PaginationParams { page: 0, page_size: 10 };
        assert!(params.to_request().is_err());

        let params = PaginationParams { page: 2, page_size: 100 };
        assert_eq!(params.to_request().unwrap().offset(), 100);
    }

    #[test]
    fn test_paginated_uses_collection_name() {
        let page = Page::new(vec![1, 2], 2, 1, 10);
        let json = serde_json::to_value(Paginated::logs(page)).unwrap();
        assert_eq!(json["logs"], serde_json::json!([1, 2]));
        assert_eq!(json["total_pages"], 1);
    }
}
