use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use manga_shared::errors::AppResult;
use manga_shared::types::auth::AuthenticatedPrincipal;
use manga_shared::types::ApiResponse;

use crate::services::verification::EmailVerificationRequest;
use crate::AppState;

pub async fn resend_code(
    principal: AuthenticatedPrincipal,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    let outcome = state
        .verification
        .request_email_verification(principal.user_id)
        .await?;

    let message = match outcome {
        EmailVerificationRequest::Sent => "verification email sent",
        EmailVerificationRequest::AlreadyVerified => "email already verified",
    };
    Ok(Json(ApiResponse::ok(message)))
}
