//! HTTP server setup with Axum

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::rest::{auth, configs, downloads, export, generations, logs, resources, statistics};
use super::state::AppState;

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Authentication
        .route("/auth/token", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        // Activity log
        .route("/api/operation-logs", get(logs::list_operation_logs))
        .route("/api/generation-history", get(logs::list_generation_history))
        .route("/api/generations", post(generations::record_generation))
        // Statistics
        .route("/api/statistics", get(statistics::get_summary))
        .route("/api/statistics/trend", get(statistics::get_generation_trend))
        .route("/api/statistics/download", get(statistics::get_download_trend))
        // Export and plain downloads
        .route("/api/operations/export", post(export::export_data))
        .route("/download/:file_name", get(downloads::download_file))
        // Resource center
        .route("/api/resource-center/resources", post(resources::register_resource))
        .route(
            "/api/resource-center/resources/download-status",
            get(resources::get_download_status),
        )
        .route(
            "/api/resource-center/resources/reset-download-status",
            post(resources::reset_download_status),
        )
        .route(
            "/api/resource-center/resources/:id/download",
            get(resources::download_resource),
        )
        .route(
            "/api/resource-center/resources/:id/download-status",
            get(resources::get_resource_download_status),
        )
        // System settings
        .route("/api/system-config/configs", get(configs::list_settings))
        .route(
            "/api/system-config/configs/:key",
            get(configs::get_setting).put(configs::update_setting),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
        }
    }
}
