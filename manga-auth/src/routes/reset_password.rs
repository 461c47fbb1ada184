use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use manga_shared::errors::{AppError, AppResult, ErrorCode};
use manga_shared::types::ApiResponse;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
    pub new_password: String,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    state
        .verification
        .reset_password(req.token.trim(), &req.new_password, &state.auth)
        .await?;

    Ok(Json(ApiResponse::ok("password reset successful")))
}
