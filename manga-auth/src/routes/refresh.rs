use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use manga_shared::errors::AppResult;
use manga_shared::middleware::extract_bearer_token;
use manga_shared::types::auth::TokenResponse;
use manga_shared::types::ApiResponse;

use crate::AppState;

/// The old token rides in the Authorization header and may already be expired.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let old_token = extract_bearer_token(&headers)?;
    let tokens = state.auth.refresh_token(&old_token).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}
