use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Authentication and session errors
/// - E2xxx: Verification token errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,

    // Auth (E1xxx)
    AuthenticationFailed,
    MalformedToken,
    ExpiredToken,
    InvalidSignature,
    CredentialNotFound,
    PasswordTooWeak,

    // Verification (E2xxx)
    VerificationTokenNotFound,
    VerificationTokenExpired,
    VerificationTokenMisused,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::BadRequest => "E0006",

            // Auth
            Self::AuthenticationFailed => "E1001",
            Self::MalformedToken => "E1002",
            Self::ExpiredToken => "E1003",
            Self::InvalidSignature => "E1004",
            Self::CredentialNotFound => "E1005",
            Self::PasswordTooWeak => "E1006",

            // Verification
            Self::VerificationTokenNotFound => "E2001",
            Self::VerificationTokenExpired => "E2002",
            Self::VerificationTokenMisused => "E2003",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError | Self::BadRequest | Self::PasswordTooWeak
            | Self::VerificationTokenMisused => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::CredentialNotFound | Self::VerificationTokenNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::Unauthorized | Self::AuthenticationFailed | Self::MalformedToken
            | Self::ExpiredToken | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::VerificationTokenExpired => StatusCode::GONE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Unknown email and wrong password share this exact error.
    pub fn authentication_failed() -> Self {
        Self::new(ErrorCode::AuthenticationFailed, "invalid email or password")
    }

    /// The code callers branch on. Infrastructure failures all map to `InternalError`.
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Known { code, .. } => *code,
            AppError::Validation(_) => ErrorCode::ValidationError,
            AppError::Internal(_) | AppError::Database(_) => ErrorCode::InternalError,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                if status.is_server_error() {
                    tracing::error!(code = code.code(), error = %message, "internal server error");
                    return (status, Json(ApiErrorResponse::new(code.code(), "internal server error")))
                        .into_response();
                }
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
