//! Script generation record endpoint
//!
//! Template substitution happens elsewhere; this endpoint records that a
//! generation took place and which parameters it used.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::extract::ApiJson;
use super::ApiResult;
use crate::api::auth::require_generator;
use crate::api::state::AppState;
use crate::error::{AppError, AppResult};
use crate::types::{NewGeneration, NewOperation, ParameterRanges, Principal, GENERATION_OPERATION};

#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    pub branch: String,
    pub parameter_ranges: ParameterRanges,
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct GenerationRecorded {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub download_url: String,
}

impl GenerationRequest {
    fn validate(&self, state: &AppState) -> AppResult<()> {
        if self.branch.trim().is_empty() {
            return Err(AppError::invalid("branch must not be empty"));
        }
        state.outputs.resolve(&self.file_name)?;

        let r = &self.parameter_ranges;
        let all = [
            r.user_start_index,
            r.user_max_index,
            r.department_index,
            r.users_per_department,
            r.device_start_index,
            r.device_max_index,
        ];
        if all.iter().any(|v| *v < 0) {
            return Err(AppError::invalid("parameter ranges must be non-negative"));
        }
        if r.user_start_index > r.user_max_index {
            return Err(AppError::invalid("user_start_index exceeds user_max_index"));
        }
        if r.device_start_index > r.device_max_index {
            return Err(AppError::invalid("device_start_index exceeds device_max_index"));
        }
        Ok(())
    }
}

/// POST /api/generations - Record a script generation
pub async fn record_generation(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<GenerationRequest>,
) -> ApiResult<(StatusCode, Json<GenerationRecorded>)> {
    require_generator(&principal)?;
    body.validate(&state)?;

    let occurred_at = Utc::now();
    let event = NewGeneration {
        user_id: principal.user_id,
        branch: body.branch.trim().to_string(),
        parameter_ranges: body.parameter_ranges,
        file_name: body.file_name.clone(),
        occurred_at,
    };
    let id = state.store.record_generation(&event).await?;

    // Mirrored as a generic entry; the feed shows the generation record instead
    state
        .store
        .audit(
            NewOperation::succeeded(
                principal.user_id,
                GENERATION_OPERATION,
                format!("branch {} -> {}", event.branch, event.file_name),
            )
            .at(occurred_at),
        )
        .await;

    tracing::info!(
        user_id = principal.user_id,
        generation_id = id,
        branch = %event.branch,
        "generation recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(GenerationRecorded {
            id,
            occurred_at,
            download_url: format!("/download/{}", urlencoding::encode(&body.file_name)),
        }),
    ))
}
