//! Login and token refresh endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::extract::ApiJson;
use super::ApiResult;
use crate::api::auth::TokenPair;
use crate::api::state::AppState;
use crate::types::NewOperation;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /auth/token - Exchange credentials for a token pair
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    let user = match state
        .auth
        .authenticate(&state.store, &body.username, &body.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::info!(username = %body.username, error = %e, "login rejected");
            return Err(e.into());
        }
    };

    let tokens = state.auth.generate_tokens(&user)?;
    state.store.touch_last_login(user.id).await?;
    state
        .store
        .audit(NewOperation::succeeded(user.id, "login", format!("user {} logged in", user.username)))
        .await;

    tracing::info!(user_id = user.id, role = %user.role, "login succeeded");
    Ok(Json(tokens))
}

/// POST /auth/refresh - Renew a token pair
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let tokens = state.auth.refresh(&state.store, &body.refresh_token).await?;
    Ok(Json(tokens))
}
