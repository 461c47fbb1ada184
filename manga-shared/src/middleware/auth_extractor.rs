use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

use crate::errors::{AppError, ErrorCode};
use crate::token::TokenCodec;
use crate::types::auth::AuthenticatedPrincipal;

/// Router state that can verify bearer tokens.
pub trait TokenCodecState {
    fn token_codec(&self) -> &TokenCodec;

    /// The instant access-token expiry is judged against.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<T: TokenCodecState> TokenCodecState for Arc<T> {
    fn token_codec(&self) -> &TokenCodec {
        (**self).token_codec()
    }

    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: TokenCodecState + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = state
            .token_codec()
            .decode(&token, state.now())?
            .into_active()?;

        Ok(AuthenticatedPrincipal::from(&claims))
    }
}

/// Pull the raw token out of `Authorization: Bearer <token>`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::unauthorized("missing authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("authorization header must use Bearer scheme"))?
        .trim();

    if token.is_empty() {
        return Err(AppError::new(ErrorCode::MalformedToken, "empty bearer token"));
    }

    Ok(token.to_string())
}
