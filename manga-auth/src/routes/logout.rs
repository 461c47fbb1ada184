use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use manga_shared::errors::AppResult;
use manga_shared::types::auth::AuthenticatedPrincipal;
use manga_shared::types::ApiResponse;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LogoutDevicesResponse {
    pub revoked: usize,
}

pub async fn logout(
    principal: AuthenticatedPrincipal,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    state.auth.self_logout(&principal).await?;
    Ok(Json(ApiResponse::ok("logged out")))
}

pub async fn logout_devices(
    principal: AuthenticatedPrincipal,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<LogoutDevicesResponse>>> {
    let revoked = state.auth.logout_devices(principal.user_id).await?;
    Ok(Json(ApiResponse::ok(LogoutDevicesResponse { revoked })))
}
