use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use manga_shared::errors::{AppError, AppResult, ErrorCode};
use manga_shared::types::ApiResponse;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    state.verification.request_password_reset(&req.email).await?;

    // Same answer whether or not the account exists.
    Ok(Json(ApiResponse::ok("if the email exists, a reset link has been sent")))
}
