//! Resource center endpoints
//!
//! Guarded downloads run through `DownloadGuard`: the session is opened
//! before the first byte is sent and settled by the completion queue once
//! the body has been fully handed to the transport.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::downloads::{attachment, file_stream};
use super::extract::{ApiJson, ApiPath};
use super::ApiResult;
use crate::api::auth::require_admin;
use crate::api::state::AppState;
use crate::error::{AppError, AppResult};
use crate::types::{DownloadStatus, NewOperation, Principal, Resource};

const MAX_RESOURCE_NAME_LEN: usize = 256;
const FORBIDDEN_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Deserialize)]
pub struct RegisterResourceRequest {
    pub resource_name: String,
    /// Blob already present in the resource directory
    pub file_name: String,
}

impl RegisterResourceRequest {
    fn validate(&self) -> AppResult<()> {
        let name = self.resource_name.trim();
        if name.is_empty() {
            return Err(AppError::invalid("resource_name must not be empty"));
        }
        if name.chars().count() > MAX_RESOURCE_NAME_LEN {
            return Err(AppError::invalid(format!(
                "resource_name must be at most {} characters",
                MAX_RESOURCE_NAME_LEN
            )));
        }
        if name.contains(FORBIDDEN_NAME_CHARS) {
            return Err(AppError::invalid(
                "resource_name must not contain any of < > : \" / \\ | ? *",
            ));
        }
        Ok(())
    }
}

/// Status projection with a display message
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: DownloadStatus,
    pub message: &'static str,
}

impl From<DownloadStatus> for StatusResponse {
    fn from(status: DownloadStatus) -> Self {
        let message = status.message();
        Self { status, message }
    }
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub message: String,
    pub affected_rows: u64,
}

/// POST /api/resource-center/resources - Register a stored blob
pub async fn register_resource(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RegisterResourceRequest>,
) -> ApiResult<(StatusCode, Json<Resource>)> {
    require_admin(&principal)?;
    body.validate()?;

    let registered = async {
        let size = state.resources.size(&body.file_name).await?;
        let size = i64::try_from(size)
            .map_err(|_| AppError::invalid(format!("file '{}' is too large", body.file_name)))?;
        state
            .store
            .register_resource(body.resource_name.trim(), &body.file_name, size, principal.user_id)
            .await
    }
    .await;

    match registered {
        Ok(resource) => {
            state
                .store
                .audit(NewOperation::succeeded(
                    principal.user_id,
                    "resource_register",
                    format!("resource {} ({})", resource.id, resource.file_name),
                ))
                .await;
            tracing::info!(resource_id = resource.id, file_name = %resource.file_name, "resource registered");
            Ok((StatusCode::CREATED, Json(resource)))
        }
        Err(e) => {
            state
                .store
                .audit(NewOperation::failed(
                    principal.user_id,
                    "resource_register",
                    body.file_name.clone(),
                    &e,
                ))
                .await;
            Err(e.into())
        }
    }
}

/// GET /api/resource-center/resources/:id/download - Guarded download
pub async fn download_resource(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiPath(resource_id): ApiPath<i64>,
) -> ApiResult<Response> {
    let resource = state
        .store
        .find_resource(resource_id)
        .await?
        .ok_or_else(|| AppError::not_found("resource", resource_id))?;

    // Open before begin so a missing blob never leaves a session behind
    let file = state.resources.open(&resource.file_name).await?;
    let size = file
        .metadata()
        .await
        .map_err(AppError::from)?
        .len();

    let session_id = match state.guard.begin(principal.user_id, resource.id).await {
        Ok(id) => id,
        Err(e) => {
            state
                .store
                .audit(NewOperation::failed(
                    principal.user_id,
                    "resource_download",
                    format!("resource {}", resource.id),
                    &e,
                ))
                .await;
            return Err(e.into());
        }
    };

    let ticket = state.completions.ticket(session_id);
    state
        .store
        .audit(NewOperation::succeeded(
            principal.user_id,
            "resource_download",
            format!("resource {} session {}", resource.id, session_id),
        ))
        .await;

    tracing::info!(
        user_id = principal.user_id,
        resource_id = resource.id,
        session_id,
        size,
        "guarded download started"
    );
    attachment(&resource.file_name, size, file_stream(file, size, Some(ticket)))
}

/// GET /api/resource-center/resources/download-status - Caller's latest session
pub async fn get_download_status(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<StatusResponse>> {
    let status = state.guard.status_for_user(principal.user_id).await?;
    Ok(Json(status.into()))
}

/// GET /api/resource-center/resources/:id/download-status - Caller's latest session on one resource
pub async fn get_resource_download_status(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiPath(resource_id): ApiPath<i64>,
) -> ApiResult<Json<StatusResponse>> {
    let status = state
        .guard
        .status_for_resource(principal.user_id, resource_id)
        .await?;
    Ok(Json(status.into()))
}

/// POST /api/resource-center/resources/reset-download-status - Fail every in-flight session
pub async fn reset_download_status(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ResetResponse>> {
    require_admin(&principal)?;

    let affected_rows = state.guard.reset_all().await?;
    state
        .store
        .audit(NewOperation::succeeded(
            principal.user_id,
            "reset_download_status",
            format!("{} session(s) reset", affected_rows),
        ))
        .await;

    Ok(Json(ResetResponse {
        message: format!("reset {} download session(s)", affected_rows),
        affected_rows,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> RegisterResourceRequest {
        RegisterResourceRequest {
            resource_name: name.to_string(),
            file_name: "bundle.zip".to_string(),
        }
    }

    #[test]
    fn test_resource_name_rules() {
        assert!(request("Quarterly device bundle").validate().is_ok());
        assert!(request("   ").validate().is_err());
        assert!(request("a/b").validate().is_err());
        assert!(request("what?").validate().is_err());
        assert!(request(&"x".repeat(257)).validate().is_err());
    }

    #[test]
    fn test_status_response_flattens() {
        let response: StatusResponse = DownloadStatus::NoRecord.into();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "no_record");
        assert_eq!(json["message"], "no download record");
    }
}
