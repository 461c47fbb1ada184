use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use manga_shared::errors::{AppError, AppResult};
use manga_shared::types::auth::Role;

use crate::schema::{credentials, users, verification_tokens};

// --- Users ---

/// Directory record for an account. Owned by the user service; auth only
/// reads it and performs the narrow password/verification mutations.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> AppResult<Role> {
        self.role
            .parse::<Role>()
            .map_err(|e| AppError::internal(format!("user {} has {e}", self.id)))
    }
}

// --- Credentials (sessions) ---

/// One logged-in device. The row existing is what keeps the session alive.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Insertable, Serialize)]
#[diesel(table_name = credentials)]
pub struct Credential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_name: String,
    pub issued_at: DateTime<Utc>,
}

// --- Verification tokens ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TokenUsage {
    VerifyEmail,
    ResetPassword,
}

impl TokenUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenUsage::VerifyEmail => "verify_email",
            TokenUsage::ResetPassword => "reset_password",
        }
    }
}

impl std::fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenUsage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verify_email" => Ok(TokenUsage::VerifyEmail),
            "reset_password" => Ok(TokenUsage::ResetPassword),
            _ => Err(format!("unknown token usage: {s}")),
        }
    }
}

impl ToSql<Text, Pg> for TokenUsage {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for TokenUsage {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        raw.parse().map_err(Into::into)
    }
}

/// A stored single-use token. Only the SHA-256 of the raw token is kept.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = verification_tokens)]
pub struct VerificationToken {
    pub token_hash: String,
    pub user_id: Uuid,
    pub usage: TokenUsage,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl VerificationToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
