//! Statistics endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::extract::ApiQuery;
use super::ApiResult;
use crate::api::auth::require_admin;
use crate::api::state::AppState;
use crate::error::AppError;
use crate::types::{Bucket, DailyCount, Granularity, MonthlyCount, Principal, UsageStatistics};
use crate::utils::time::DateWindow;

/// Monthly trends return at most this many buckets
const MONTHLY_BUCKET_LIMIT: i64 = 12;

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrendParams {
    /// `7`, `30`, `90` or `monthly`
    pub time_range: String,
}

/// Parsed `time_range`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    LastDays(i64),
    Monthly,
}

impl std::str::FromStr for TimeRange {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7" => Ok(TimeRange::LastDays(7)),
            "30" => Ok(TimeRange::LastDays(30)),
            "90" => Ok(TimeRange::LastDays(90)),
            "monthly" => Ok(TimeRange::Monthly),
            other => Err(AppError::invalid(format!(
                "time_range must be one of 7, 30, 90, monthly; got '{}'",
                other
            ))),
        }
    }
}

/// `{"daily": [...]}` or `{"monthly": [...]}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendResponse {
    Daily(Vec<DailyCount>),
    Monthly(Vec<MonthlyCount>),
}

impl TimeRange {
    fn query_shape(&self, state: &AppState) -> (Granularity, DateWindow, Option<i64>) {
        let now = Utc::now();
        match self {
            TimeRange::LastDays(days) => (
                Granularity::Daily,
                DateWindow::last_days(*days, state.aggregator.offset(), now),
                None,
            ),
            TimeRange::Monthly => (
                Granularity::Monthly,
                DateWindow::all_time(now),
                Some(MONTHLY_BUCKET_LIMIT),
            ),
        }
    }

    fn respond(&self, buckets: Vec<Bucket>) -> TrendResponse {
        match self {
            TimeRange::LastDays(_) => TrendResponse::Daily(buckets.into_iter().map(Into::into).collect()),
            TimeRange::Monthly => TrendResponse::Monthly(buckets.into_iter().map(Into::into).collect()),
        }
    }
}

/// GET /api/statistics - Usage summary over an optional date window
pub async fn get_summary(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<SummaryParams>,
) -> ApiResult<Json<UsageStatistics>> {
    require_admin(&principal)?;

    let window = DateWindow::from_dates(
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        state.aggregator.offset(),
        Utc::now(),
    )?;
    let summary = state.aggregator.summary(&window).await?;
    Ok(Json(summary))
}

/// GET /api/statistics/trend - Generation counts per day or month
pub async fn get_generation_trend(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<TrendParams>,
) -> ApiResult<Json<TrendResponse>> {
    require_admin(&principal)?;

    let range: TimeRange = params.time_range.parse()?;
    let (granularity, window, limit) = range.query_shape(&state);
    let buckets = state
        .aggregator
        .generation_trend(granularity, &window, limit)
        .await?;
    Ok(Json(range.respond(buckets)))
}

/// GET /api/statistics/download - Download counts per day or month
pub async fn get_download_trend(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<TrendParams>,
) -> ApiResult<Json<TrendResponse>> {
    require_admin(&principal)?;

    let range: TimeRange = params.time_range.parse()?;
    let (granularity, window, limit) = range.query_shape(&state);
    let buckets = state
        .aggregator
        .download_trend(granularity, &window, limit)
        .await?;
    Ok(Json(range.respond(buckets)))
}
