use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use manga_shared::errors::{AppError, AppResult, ErrorCode};
use manga_shared::types::ApiResponse;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyEmailRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    state.verification.verify_email(req.token.trim()).await?;

    Ok(Json(ApiResponse::ok("email verified")))
}
