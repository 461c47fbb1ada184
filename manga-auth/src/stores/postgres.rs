use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use manga_shared::clients::db::DbPool;
use manga_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Credential, User, VerificationToken};
use crate::schema::{credentials, users, verification_tokens};

use super::{CredentialStore, UserDirectory, VerificationTokenStore};

/// Run one Diesel round-trip off the async runtime.
async fn with_conn<T, F>(pool: &DbPool, f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| AppError::internal(e.to_string()))?;
        f(&mut *conn)
    })
    .await
    .map_err(|e| AppError::internal(format!("database task failed: {e}")))?
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(&self, user_id: Uuid, device_name: &str, issued_at: DateTime<Utc>) -> AppResult<Credential> {
        let credential = Credential {
            id: Uuid::now_v7(),
            user_id,
            device_name: device_name.to_string(),
            issued_at,
        };
        with_conn(&self.pool, move |conn| {
            diesel::insert_into(credentials::table)
                .values(&credential)
                .execute(conn)?;
            Ok(credential)
        })
        .await
    }

    async fn exists(&self, credential_id: Uuid) -> AppResult<bool> {
        with_conn(&self.pool, move |conn| {
            let found = diesel::select(diesel::dsl::exists(credentials::table.find(credential_id)))
                .get_result::<bool>(conn)?;
            Ok(found)
        })
        .await
    }

    async fn list(&self, user_id: Uuid) -> AppResult<Vec<Credential>> {
        with_conn(&self.pool, move |conn| {
            let rows = credentials::table
                .filter(credentials::user_id.eq(user_id))
                .order(credentials::issued_at.desc())
                .select(Credential::as_select())
                .load(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn delete(&self, user_id: Uuid, credential_id: Uuid) -> AppResult<()> {
        with_conn(&self.pool, move |conn| {
            let deleted = diesel::delete(
                credentials::table
                    .filter(credentials::id.eq(credential_id))
                    .filter(credentials::user_id.eq(user_id)),
            )
            .execute(conn)?;
            if deleted > 0 {
                return Ok(());
            }

            let owner = credentials::table
                .find(credential_id)
                .select(credentials::user_id)
                .first::<Uuid>(conn)
                .optional()?;
            match owner {
                None => Err(AppError::new(ErrorCode::CredentialNotFound, "credential not found")),
                Some(_) => Err(AppError::new(ErrorCode::Unauthorized, "credential belongs to another user")),
            }
        })
        .await
    }

    async fn delete_all(&self, user_id: Uuid) -> AppResult<usize> {
        with_conn(&self.pool, move |conn| {
            let deleted = diesel::delete(credentials::table.filter(credentials::user_id.eq(user_id)))
                .execute(conn)?;
            Ok(deleted)
        })
        .await
    }
}

#[derive(Clone)]
pub struct PgVerificationTokenStore {
    pool: DbPool,
}

impl PgVerificationTokenStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationTokenStore for PgVerificationTokenStore {
    async fn replace(&self, token: VerificationToken) -> AppResult<()> {
        with_conn(&self.pool, move |conn| {
            conn.transaction::<_, AppError, _>(|conn| {
                diesel::delete(
                    verification_tokens::table
                        .filter(verification_tokens::user_id.eq(token.user_id))
                        .filter(verification_tokens::usage.eq(token.usage)),
                )
                .execute(conn)?;
                diesel::insert_into(verification_tokens::table)
                    .values(&token)
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn find(&self, token_hash: &str) -> AppResult<Option<VerificationToken>> {
        let token_hash = token_hash.to_string();
        with_conn(&self.pool, move |conn| {
            let row = verification_tokens::table
                .find(token_hash)
                .select(VerificationToken::as_select())
                .first(conn)
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn remove(&self, token_hash: &str) -> AppResult<bool> {
        let token_hash = token_hash.to_string();
        with_conn(&self.pool, move |conn| {
            let deleted = diesel::delete(verification_tokens::table.find(token_hash)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        with_conn(&self.pool, move |conn| {
            let purged = diesel::delete(verification_tokens::table.filter(verification_tokens::expires_at.le(now)))
                .execute(conn)?;
            Ok(purged)
        })
        .await
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.to_lowercase();
        with_conn(&self.pool, move |conn| {
            let user = users::table
                .filter(users::email.eq(email))
                .select(User::as_select())
                .first(conn)
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn find_by_id(&self, user_id: Uuid) -> AppResult<Option<User>> {
        with_conn(&self.pool, move |conn| {
            let user = users::table
                .find(user_id)
                .select(User::as_select())
                .first(conn)
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> AppResult<()> {
        let password_hash = password_hash.to_string();
        with_conn(&self.pool, move |conn| {
            let updated = diesel::update(users::table.find(user_id))
                .set((
                    users::password_hash.eq(password_hash),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(AppError::not_found("user not found"));
            }
            Ok(())
        })
        .await
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> AppResult<()> {
        with_conn(&self.pool, move |conn| {
            let updated = diesel::update(users::table.find(user_id))
                .set((users::email_verified.eq(true), users::updated_at.eq(Utc::now())))
                .execute(conn)?;
            if updated == 0 {
                return Err(AppError::not_found("user not found"));
            }
            Ok(())
        })
        .await
    }
}
