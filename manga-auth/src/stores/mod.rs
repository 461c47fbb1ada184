//! Persistence seams for sessions, verification tokens, and the user directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use manga_shared::errors::AppResult;

use crate::models::{Credential, User, VerificationToken};

pub mod postgres;

pub use postgres::{PgCredentialStore, PgUserDirectory, PgVerificationTokenStore};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create(&self, user_id: Uuid, device_name: &str, issued_at: DateTime<Utc>) -> AppResult<Credential>;

    async fn exists(&self, credential_id: Uuid) -> AppResult<bool>;

    /// Sessions of one user, newest first.
    async fn list(&self, user_id: Uuid) -> AppResult<Vec<Credential>>;

    /// Fails `CredentialNotFound` for an unknown id and `Unauthorized` when
    /// the id belongs to someone else.
    async fn delete(&self, user_id: Uuid, credential_id: Uuid) -> AppResult<()>;

    async fn delete_all(&self, user_id: Uuid) -> AppResult<usize>;
}

#[async_trait]
pub trait VerificationTokenStore: Send + Sync {
    /// Store `token`, dropping any outstanding token with the same user and usage.
    async fn replace(&self, token: VerificationToken) -> AppResult<()>;

    async fn find(&self, token_hash: &str) -> AppResult<Option<VerificationToken>>;

    /// Idempotent. Returns whether this call deleted the row, so of two
    /// racing consumers exactly one sees `true`.
    async fn remove(&self, token_hash: &str) -> AppResult<bool>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_by_id(&self, user_id: Uuid) -> AppResult<Option<User>>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> AppResult<()>;

    async fn mark_email_verified(&self, user_id: Uuid) -> AppResult<()>;
}
