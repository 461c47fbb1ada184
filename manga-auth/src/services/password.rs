use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};

use manga_shared::errors::{AppError, AppResult, ErrorCode};

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> AppResult<String>;

    fn verify(&self, plain: &str, hash: &str) -> AppResult<bool>;
}

#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
    }

    fn verify(&self, plain: &str, hash: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::internal(format!("invalid password hash: {e}")))?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < 8 {
        return Err(AppError::new(ErrorCode::PasswordTooWeak, "password must be at least 8 characters"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::new(ErrorCode::PasswordTooWeak, "password must contain at least one number"));
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(AppError::new(ErrorCode::PasswordTooWeak, "password must contain at least one letter"));
    }
    Ok(())
}

/// Hash on the blocking pool so a slow KDF never stalls a runtime worker.
pub async fn hash_blocking(hasher: Arc<dyn PasswordHasher>, plain: &str) -> AppResult<String> {
    let plain = plain.to_string();
    tokio::task::spawn_blocking(move || hasher.hash(&plain))
        .await
        .map_err(|e| AppError::internal(format!("password hashing task failed: {e}")))?
}

/// Verify on the blocking pool.
pub async fn verify_blocking(hasher: Arc<dyn PasswordHasher>, plain: &str, hash: &str) -> AppResult<bool> {
    let (plain, hash) = (plain.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
        .await
        .map_err(|e| AppError::internal(format!("password verification task failed: {e}")))?
}
