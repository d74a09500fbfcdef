//! Activity feed and generation history endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::extract::ApiQuery;
use super::{default_page, default_page_size, ApiResult, Paginated, PaginationParams};
use crate::activity::LogFilter;
use crate::api::auth::require_admin;
use crate::api::state::AppState;
use crate::types::{GenerationEvent, LogRecord, Principal};
use crate::utils::time::DateWindow;

/// Query parameters for the unified feed
#[derive(Debug, Deserialize)]
pub struct FeedParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Inclusive start date, `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// Inclusive end date, `YYYY-MM-DD`
    pub end_date: Option<String>,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub operation_type: Option<String>,
}

/// GET /api/operation-logs - Merged operation, generation and download logs
pub async fn list_operation_logs(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<FeedParams>,
) -> ApiResult<Json<Paginated<LogRecord>>> {
    require_admin(&principal)?;

    let page = PaginationParams::new(params.page, params.page_size).to_request()?;
    let window = DateWindow::from_dates(
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        state.aggregator.offset(),
        Utc::now(),
    )?;

    let filter = LogFilter {
        window,
        user_id: params.user_id,
        username: params.username,
        operation_type: params.operation_type,
    };

    let result = state.unifier.query(&filter, &page).await?;
    Ok(Json(Paginated::logs(result)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    pub branch: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// GET /api/generation-history - Generation events, newest first
pub async fn list_generation_history(
    _principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> ApiResult<Json<Paginated<GenerationEvent>>> {
    let page = PaginationParams::new(params.page, params.page_size).to_request()?;
    let window = DateWindow::from_dates(
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        state.aggregator.offset(),
        Utc::now(),
    )?;

    let result = state
        .unifier
        .generation_history(params.branch.as_deref(), &window, &page)
        .await?;
    Ok(Json(Paginated::records(result)))
}
