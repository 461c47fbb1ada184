use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use manga_shared::middleware::metrics_middleware;

use crate::AppState;

pub mod credentials;
pub mod forgot_password;
pub mod health;
pub mod login;
pub mod logout;
pub mod refresh;
pub mod resend_code;
pub mod reset_password;
pub mod verify_email;

pub fn router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/login", post(login::login))
        .route("/refresh", post(refresh::refresh_token))
        .route("/logout", post(logout::logout))
        .route("/logout/devices", post(logout::logout_devices))
        .route("/credentials", get(credentials::list_credentials))
        .route("/credentials/:id", delete(credentials::revoke_credential))
        .route("/verify-email", post(verify_email::verify_email))
        .route("/verify-email/resend", post(resend_code::resend_code))
        .route("/forgot-password", post(forgot_password::forgot_password))
        .route("/reset-password", post(reset_password::reset_password))
        .route_layer(axum::middleware::from_fn(metrics_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
