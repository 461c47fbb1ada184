//! Single-use, expiring tokens for email verification and password reset.
//!
//! A token is Active while its row exists and `now < expires_at`. Successful
//! validation deletes the row, so every token is honoured at most once.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use manga_shared::errors::{AppError, AppResult, ErrorCode};

use crate::clock::Clock;
use crate::models::{TokenUsage, VerificationToken};
use crate::services::authentication::AuthenticationService;
use crate::services::mailer::{MailDispatcher, OutgoingMail};
use crate::services::password::{hash_blocking, validate_password, PasswordHasher};
use crate::services::token_service::{generate_verification_token, hash_token};
use crate::stores::{UserDirectory, VerificationTokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailVerificationRequest {
    Sent,
    AlreadyVerified,
}

pub struct VerificationService {
    tokens: Arc<dyn VerificationTokenStore>,
    users: Arc<dyn UserDirectory>,
    hasher: Arc<dyn PasswordHasher>,
    mailer: MailDispatcher,
    clock: Arc<dyn Clock>,
    token_ttl: Duration,
    app_url: String,
}

impl VerificationService {
    pub fn new(
        tokens: Arc<dyn VerificationTokenStore>,
        users: Arc<dyn UserDirectory>,
        hasher: Arc<dyn PasswordHasher>,
        mailer: MailDispatcher,
        clock: Arc<dyn Clock>,
        token_ttl: Duration,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            users,
            hasher,
            mailer,
            clock,
            token_ttl,
            app_url: app_url.into(),
        }
    }

    /// Mint a token for `(user_id, usage)`, replacing any outstanding one.
    /// Returns the raw token; only its hash is stored.
    pub async fn request(&self, user_id: Uuid, usage: TokenUsage) -> AppResult<String> {
        let token = generate_verification_token();
        let now = self.clock.now();

        self.tokens
            .replace(VerificationToken {
                token_hash: hash_token(&token),
                user_id,
                usage,
                expires_at: now + self.token_ttl,
                created_at: now,
            })
            .await?;

        tracing::debug!(user_id = %user_id, usage = %usage, "verification token issued");
        Ok(token)
    }

    pub async fn find(&self, token: &str) -> AppResult<VerificationToken> {
        self.tokens
            .find(&hash_token(token))
            .await?
            .ok_or_else(token_not_found)
    }

    pub fn validate(record: &VerificationToken, expected_usage: TokenUsage, now: DateTime<Utc>) -> AppResult<()> {
        if record.is_expired_at(now) {
            return Err(AppError::new(ErrorCode::VerificationTokenExpired, "verification token has expired"));
        }
        if record.usage != expected_usage {
            return Err(AppError::new(
                ErrorCode::VerificationTokenMisused,
                format!("token was issued for {}, not {expected_usage}", record.usage),
            ));
        }
        Ok(())
    }

    pub async fn remove(&self, token: &str) -> AppResult<()> {
        self.tokens.remove(&hash_token(token)).await?;
        Ok(())
    }

    /// Find, validate, and burn `token`. Returns the user it was issued to.
    /// Only the caller whose delete hits the row wins; a concurrent consumer
    /// of the same token gets `VerificationTokenNotFound`.
    pub async fn validate_and_consume(&self, token: &str, expected_usage: TokenUsage) -> AppResult<Uuid> {
        let record = self.find(token).await?;
        Self::validate(&record, expected_usage, self.clock.now())?;
        if !self.tokens.remove(&record.token_hash).await? {
            return Err(token_not_found());
        }
        Ok(record.user_id)
    }

    /// Send (or re-send) the verification link for a user's email address.
    pub async fn request_email_verification(&self, user_id: Uuid) -> AppResult<EmailVerificationRequest> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;

        if user.email_verified {
            return Ok(EmailVerificationRequest::AlreadyVerified);
        }

        let token = self.request(user.id, TokenUsage::VerifyEmail).await?;
        self.send_token_mail(&user.email, TokenUsage::VerifyEmail, &token);

        Ok(EmailVerificationRequest::Sent)
    }

    /// Start a password reset. Unknown addresses succeed silently so the
    /// endpoint does not reveal which emails have accounts.
    pub async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        let Some(user) = self.users.find_by_email(&email.trim().to_lowercase()).await? else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let token = self.request(user.id, TokenUsage::ResetPassword).await?;
        self.send_token_mail(&user.email, TokenUsage::ResetPassword, &token);

        tracing::info!(user_id = %user.id, "password reset requested");
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> AppResult<Uuid> {
        let user_id = self.validate_and_consume(token, TokenUsage::VerifyEmail).await?;
        self.users.mark_email_verified(user_id).await?;

        tracing::info!(user_id = %user_id, "email verified");
        Ok(user_id)
    }

    /// Burn the reset token, store the new password, then revoke every
    /// session. The token is consumed before the password is written.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        sessions: &AuthenticationService,
    ) -> AppResult<Uuid> {
        validate_password(new_password)?;

        let user_id = self.validate_and_consume(token, TokenUsage::ResetPassword).await?;
        let password_hash = hash_blocking(self.hasher.clone(), new_password).await?;
        self.users.update_password(user_id, &password_hash).await?;
        sessions.logout_devices(user_id).await?;

        tracing::info!(user_id = %user_id, "password reset");
        Ok(user_id)
    }

    pub async fn purge_expired(&self) -> AppResult<usize> {
        let purged = self.tokens.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            tracing::info!(purged, "expired verification tokens purged");
        }
        Ok(purged)
    }

    fn send_token_mail(&self, to: &str, usage: TokenUsage, token: &str) {
        self.mailer.dispatch(OutgoingMail::for_token(
            to,
            usage,
            &self.app_url,
            token,
            self.token_ttl.num_minutes(),
        ));
    }
}

fn token_not_found() -> AppError {
    AppError::new(ErrorCode::VerificationTokenNotFound, "verification token not found")
}
