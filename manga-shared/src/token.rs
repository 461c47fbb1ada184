//! Signed access tokens.
//!
//! Issuing and verifying live together so every service decodes exactly what
//! the auth service encodes. Expiry is checked here rather than inside
//! `jsonwebtoken` so that an expired token still yields its claims.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::types::auth::{AccessTokenClaims, Role};

/// HMAC signing methods accepted for access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningAlgorithm {
    #[default]
    Hs256,
    Hs384,
    Hs512,
}

impl SigningAlgorithm {
    fn jwt_algorithm(self) -> Algorithm {
        match self {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Hs384 => Algorithm::HS384,
            SigningAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

impl std::str::FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(SigningAlgorithm::Hs256),
            "HS384" => Ok(SigningAlgorithm::Hs384),
            "HS512" => Ok(SigningAlgorithm::Hs512),
            _ => Err(format!("unsupported signing algorithm: {s}")),
        }
    }
}

/// Claims as they appear on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: String,
    cid: String,
    role: String,
    name: String,
    iat: i64,
    exp: i64,
}

impl WireClaims {
    fn into_claims(self) -> AppResult<AccessTokenClaims> {
        let user_id = Uuid::parse_str(&self.sub).map_err(|_| malformed("subject is not a valid id"))?;
        let credential_id =
            Uuid::parse_str(&self.cid).map_err(|_| malformed("credential id is not a valid id"))?;
        let role = self.role.parse::<Role>().map_err(malformed)?;
        let issued_at = DateTime::from_timestamp(self.iat, 0).ok_or_else(|| malformed("iat out of range"))?;
        let expires_at = DateTime::from_timestamp(self.exp, 0).ok_or_else(|| malformed("exp out of range"))?;

        Ok(AccessTokenClaims {
            credential_id,
            user_id,
            role,
            display_name: self.name,
            issued_at,
            expires_at,
        })
    }
}

fn malformed(reason: impl std::fmt::Display) -> AppError {
    AppError::new(ErrorCode::MalformedToken, format!("malformed token: {reason}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    Expired,
}

/// A token whose signature checked out. It may still be past its expiry.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub claims: AccessTokenClaims,
    pub status: TokenStatus,
}

impl DecodedToken {
    pub fn is_expired(&self) -> bool {
        self.status == TokenStatus::Expired
    }

    /// Claims of a token that is also unexpired.
    pub fn into_active(self) -> AppResult<AccessTokenClaims> {
        match self.status {
            TokenStatus::Active => Ok(self.claims),
            TokenStatus::Expired => Err(AppError::new(ErrorCode::ExpiredToken, "token has expired")),
        }
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("access_token_ttl", &self.access_token_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &str, algorithm: SigningAlgorithm, access_token_ttl: Duration) -> Self {
        let mut validation = Validation::new(algorithm.jwt_algorithm());
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "iat", "exp"]);

        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_token_ttl,
        }
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    pub fn issue(
        &self,
        credential_id: Uuid,
        user_id: Uuid,
        role: Role,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        let claims = WireClaims {
            sub: user_id.to_string(),
            cid: credential_id.to_string(),
            role: role.to_string(),
            name: display_name.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_token_ttl).timestamp(),
        };

        jsonwebtoken::encode(
            &Header::new(self.algorithm.jwt_algorithm()),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| AppError::internal(format!("JWT encoding failed: {e}")))
    }

    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> AppResult<DecodedToken> {
        let data = jsonwebtoken::decode::<WireClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AppError::new(ErrorCode::InvalidSignature, "token signature is invalid")
                }
                _ => malformed(e),
            })?;

        let claims = data.claims.into_claims()?;
        let status = if claims.is_expired_at(now) {
            TokenStatus::Expired
        } else {
            TokenStatus::Active
        };

        Ok(DecodedToken { claims, status })
    }
}
