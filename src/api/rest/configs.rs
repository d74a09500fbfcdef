//! Runtime settings endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::extract::{ApiJson, ApiPath};
use super::ApiResult;
use crate::api::auth::require_admin;
use crate::api::state::AppState;
use crate::error::{AppError, AppResult};
use crate::store::{Setting, DOWNLOAD_LIMIT_KEY};
use crate::types::{NewOperation, Principal};

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub config_value: String,
}

/// Reject values a known key cannot hold
fn validate_value(key: &str, value: &str) -> AppResult<()> {
    if key == DOWNLOAD_LIMIT_KEY && !matches!(value, "true" | "false") {
        return Err(AppError::invalid(format!(
            "{} must be 'true' or 'false', got '{}'",
            DOWNLOAD_LIMIT_KEY, value
        )));
    }
    Ok(())
}

/// GET /api/system-config/configs - List all settings
pub async fn list_settings(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Setting>>> {
    require_admin(&principal)?;
    Ok(Json(state.store.list_settings().await?))
}

/// GET /api/system-config/configs/:key - Read one setting
pub async fn get_setting(
    _principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiPath(key): ApiPath<String>,
) -> ApiResult<Json<Setting>> {
    let setting = state
        .store
        .get_setting(&key)
        .await?
        .ok_or_else(|| AppError::not_found("setting", &key))?;
    Ok(Json(setting))
}

/// PUT /api/system-config/configs/:key - Update a setting
pub async fn update_setting(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiPath(key): ApiPath<String>,
    ApiJson(body): ApiJson<UpdateSettingRequest>,
) -> ApiResult<Json<Setting>> {
    require_admin(&principal)?;

    let value = body.config_value.trim();
    let updated = async {
        validate_value(&key, value)?;
        state.store.update_setting(&key, value).await?;
        state
            .store
            .get_setting(&key)
            .await?
            .ok_or_else(|| AppError::not_found("setting", &key))
    }
    .await;

    match updated {
        Ok(setting) => {
            state
                .store
                .audit(NewOperation::succeeded(
                    principal.user_id,
                    "update_system_config",
                    format!("{} = {}", key, value),
                ))
                .await;
            tracing::info!(key = %key, value, user_id = principal.user_id, "setting updated");
            Ok(Json(setting))
        }
        Err(e) => {
            state
                .store
                .audit(NewOperation::failed(
                    principal.user_id,
                    "update_system_config",
                    format!("{} = {}", key, value),
                    &e,
                ))
                .await;
            Err(e.into())
        }
    }
}
