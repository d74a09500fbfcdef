//! Zip export endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::extract::ApiJson;
use super::ApiResult;
use crate::api::auth::require_admin;
use crate::api::state::AppState;
use crate::error::{AppError, AppResult};
use crate::export::{
    ExportArtifact, ExportKind, ExportRequest, DEFAULT_COMPRESSION_LEVEL, DEFAULT_EXPORT_PAGE_SIZE,
};
use crate::types::{NewOperation, Principal};
use crate::utils::time::DateWindow;

#[derive(Debug, Deserialize)]
pub struct ExportBody {
    pub export_type: ExportKind,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default = "default_export_page_size")]
    pub page_size: i64,
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,
    /// Volume size in MB, 1..=1000; absent for a single archive
    pub split_size: Option<u64>,
}

const MAX_SPLIT_SIZE_MB: u64 = 1000;

fn default_export_page_size() -> i64 {
    DEFAULT_EXPORT_PAGE_SIZE
}

fn default_compression_level() -> u8 {
    DEFAULT_COMPRESSION_LEVEL
}

impl ExportBody {
    fn to_request(&self, state: &AppState) -> AppResult<ExportRequest> {
        let now = Utc::now();
        let window = DateWindow::from_dates(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            state.aggregator.offset(),
            now,
        )?;
        let mut request = ExportRequest::new(self.export_type, window);
        request.page_size = self.page_size;
        request.compression_level = self.compression_level;
        if let Some(mb) = self.split_size {
            if !(1..=MAX_SPLIT_SIZE_MB).contains(&mb) {
                return Err(AppError::invalid(format!(
                    "split_size must be between 1 and {} MB, got {}",
                    MAX_SPLIT_SIZE_MB, mb
                )));
            }
            request.split_bytes = Some(mb * 1024 * 1024);
        }
        Ok(request)
    }
}

/// POST /api/operations/export - Export a feed or the statistics summary as zip
pub async fn export_data(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<ExportBody>,
) -> ApiResult<Json<ExportArtifact>> {
    require_admin(&principal)?;

    let exported = async {
        let request = body.to_request(&state)?;
        state.exporter.export(&request, Utc::now()).await
    }
    .await;

    match exported {
        Ok(artifact) => {
            state
                .store
                .audit(NewOperation::succeeded(
                    principal.user_id,
                    "export",
                    format!(
                        "{} -> {} ({} records, {} volumes)",
                        body.export_type.as_str(),
                        artifact.file_name,
                        artifact.record_count,
                        artifact.volumes.len()
                    ),
                ))
                .await;
            tracing::info!(
                kind = body.export_type.as_str(),
                file_name = %artifact.file_name,
                records = artifact.record_count,
                volumes = artifact.volumes.len(),
                "export request served"
            );
            Ok(Json(artifact))
        }
        Err(e) => {
            state
                .store
                .audit(NewOperation::failed(
                    principal.user_id,
                    "export",
                    body.export_type.as_str(),
                    &e,
                ))
                .await;
            Err(e.into())
        }
    }
}
