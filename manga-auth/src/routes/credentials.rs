use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use manga_shared::errors::{AppError, AppResult};
use manga_shared::types::auth::AuthenticatedPrincipal;
use manga_shared::types::ApiResponse;

use crate::services::authentication::SessionView;
use crate::AppState;

pub async fn list_credentials(
    principal: AuthenticatedPrincipal,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<SessionView>>>> {
    let sessions = state
        .auth
        .get_credentials(principal.user_id, Some(principal.credential_id))
        .await?;
    Ok(Json(ApiResponse::ok(sessions)))
}

pub async fn revoke_credential(
    principal: AuthenticatedPrincipal,
    State(state): State<Arc<AppState>>,
    credential_id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    let Path(credential_id) = credential_id
        .map_err(|e| AppError::bad_request(format!("invalid credential id: {}", e.body_text())))?;
    state.auth.logout(principal.user_id, credential_id).await?;
    Ok(Json(ApiResponse::ok("session revoked")))
}
