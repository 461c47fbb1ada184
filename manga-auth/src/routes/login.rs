use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use manga_shared::errors::{AppError, AppResult, ErrorCode};
use manga_shared::types::auth::TokenResponse;
use manga_shared::types::ApiResponse;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
    pub device_name: Option<String>,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    // Without an explicit name the session is labelled by its user agent.
    let device_name = req.device_name.as_deref().or_else(|| {
        headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
    });

    let tokens = state
        .auth
        .authenticate(&req.email, &req.password, device_name)
        .await?;

    Ok(Json(ApiResponse::ok(tokens)))
}
