//! Login, refresh, and per-device session management.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::OnceCell;
use uuid::Uuid;

use manga_shared::errors::{AppError, AppResult, ErrorCode};
use manga_shared::token::TokenCodec;
use manga_shared::types::auth::{AuthenticatedPrincipal, TokenResponse};

use crate::clock::Clock;
use crate::services::password::{hash_blocking, verify_blocking, PasswordHasher};
use crate::stores::{CredentialStore, UserDirectory};

const DEFAULT_DEVICE_NAME: &str = "unknown device";
const MAX_DEVICE_NAME_LEN: usize = 255;
const DECOY_PASSWORD: &str = "decoy-password-for-unknown-accounts";

/// One row of the "manage my devices" view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub device_name: String,
    pub issued_at: DateTime<Utc>,
    pub current: bool,
}

pub struct AuthenticationService {
    users: Arc<dyn UserDirectory>,
    credentials: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    /// Verified against when the email is unknown, so both failure paths pay
    /// for one hash verification.
    decoy_hash: OnceCell<String>,
}

impl AuthenticationService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        credentials: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        codec: TokenCodec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            credentials,
            hasher,
            codec,
            clock,
            decoy_hash: OnceCell::new(),
        }
    }

    pub fn token_codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Compute the decoy hash ahead of the first failed login.
    pub async fn warm_up(&self) -> AppResult<()> {
        self.decoy_hash().await?;
        Ok(())
    }

    async fn decoy_hash(&self) -> AppResult<&str> {
        let hash = self
            .decoy_hash
            .get_or_try_init(|| hash_blocking(self.hasher.clone(), DECOY_PASSWORD))
            .await?;
        Ok(hash.as_str())
    }

    /// Check email + password and open a new session for `device_name`.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        device_name: Option<&str>,
    ) -> AppResult<TokenResponse> {
        let email = email.trim().to_lowercase();

        let user = self.users.find_by_email(&email).await?;
        let stored_hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.decoy_hash().await?.to_string(),
        };
        let matches = verify_blocking(self.hasher.clone(), password, &stored_hash).await?;

        let user = match user {
            Some(user) if matches => user,
            Some(user) => {
                tracing::debug!(user_id = %user.id, "login rejected: wrong password");
                return Err(AppError::authentication_failed());
            }
            None => {
                tracing::debug!("login rejected: unknown email");
                return Err(AppError::authentication_failed());
            }
        };

        let role = user.role()?;
        let now = self.clock.now();
        let credential = self
            .credentials
            .create(user.id, &normalize_device_name(device_name), now)
            .await?;
        let access_token = self
            .codec
            .issue(credential.id, user.id, role, &user.display_name, now)?;

        tracing::info!(user_id = %user.id, credential_id = %credential.id, "user logged in");

        Ok(self.bearer(access_token))
    }

    /// Swap a possibly expired token for a fresh one, as long as its session
    /// has not been logged out.
    pub async fn refresh_token(&self, old_token: &str) -> AppResult<TokenResponse> {
        let now = self.clock.now();
        let decoded = self.codec.decode(old_token, now)?;
        let claims = decoded.claims;

        if !self.credentials.exists(claims.credential_id).await? {
            return Err(AppError::new(ErrorCode::CredentialNotFound, "session has been logged out"));
        }

        let access_token = self.codec.issue(
            claims.credential_id,
            claims.user_id,
            claims.role,
            &claims.display_name,
            now,
        )?;

        tracing::debug!(user_id = %claims.user_id, credential_id = %claims.credential_id, "access token refreshed");

        Ok(self.bearer(access_token))
    }

    /// End the session the caller is currently using.
    pub async fn self_logout(&self, principal: &AuthenticatedPrincipal) -> AppResult<()> {
        self.credentials
            .delete(principal.user_id, principal.credential_id)
            .await?;
        tracing::info!(user_id = %principal.user_id, credential_id = %principal.credential_id, "user logged out");
        Ok(())
    }

    /// End one of the caller's sessions by id. The id comes from the client,
    /// so the store enforces ownership.
    pub async fn logout(&self, user_id: Uuid, credential_id: Uuid) -> AppResult<()> {
        self.credentials.delete(user_id, credential_id).await.map_err(|e| {
            if e.code() == ErrorCode::Unauthorized {
                tracing::warn!(user_id = %user_id, credential_id = %credential_id, "attempt to revoke a foreign session");
            }
            e
        })?;
        tracing::info!(user_id = %user_id, credential_id = %credential_id, "session revoked");
        Ok(())
    }

    /// End every session of the user.
    pub async fn logout_devices(&self, user_id: Uuid) -> AppResult<usize> {
        let revoked = self.credentials.delete_all(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    pub async fn get_credentials(&self, user_id: Uuid, current: Option<Uuid>) -> AppResult<Vec<SessionView>> {
        let sessions = self.credentials.list(user_id).await?;
        Ok(sessions
            .into_iter()
            .map(|c| SessionView {
                current: Some(c.id) == current,
                id: c.id,
                device_name: c.device_name,
                issued_at: c.issued_at,
            })
            .collect())
    }

    fn bearer(&self, access_token: String) -> TokenResponse {
        TokenResponse::bearer(access_token, self.codec.access_token_ttl().num_seconds())
    }
}

fn normalize_device_name(device_name: Option<&str>) -> String {
    match device_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.chars().take(MAX_DEVICE_NAME_LEN).collect(),
        _ => DEFAULT_DEVICE_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, PlainHasher};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use manga_shared::types::auth::Role;

    #[tokio::test]
    async fn login_issues_bearer_token_for_new_session() {
        let fx = Fixture::new();
        let user = fx.add_user("nami@grandline.io", "Nami", Role::User, "tangerine42");

        let resp = fx.auth.authenticate("Nami@GrandLine.io ", "tangerine42", Some("Pixel 8")).await.unwrap();
        assert_eq!(resp.token_type, "Bearer");
        assert_eq!(resp.expires_in, 3600);

        let claims = fx.codec().decode(&resp.access_token, fx.clock.now()).unwrap().into_active().unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.display_name, "Nami");

        let sessions = fx.auth.get_credentials(user.id, Some(claims.credential_id)).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, claims.credential_id);
        assert_eq!(sessions[0].device_name, "Pixel 8");
        assert!(sessions[0].current);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let fx = Fixture::new();
        fx.add_user("usopp@grandline.io", "Usopp", Role::User, "sniper8000");

        let unknown = fx.auth.authenticate("nobody@grandline.io", "sniper8000", None).await.unwrap_err();
        let wrong = fx.auth.authenticate("usopp@grandline.io", "sniper8001", None).await.unwrap_err();

        assert_eq!(unknown.code(), ErrorCode::AuthenticationFailed);
        assert_eq!(wrong.code(), ErrorCode::AuthenticationFailed);
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(fx.credentials.len(), 0);
    }

    #[derive(Default)]
    struct CountingHasher {
        verifies: AtomicUsize,
    }

    impl PasswordHasher for CountingHasher {
        fn hash(&self, plain: &str) -> AppResult<String> {
            PlainHasher.hash(plain)
        }

        fn verify(&self, plain: &str, hash: &str) -> AppResult<bool> {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            PlainHasher.verify(plain, hash)
        }
    }

    #[tokio::test]
    async fn unknown_email_costs_the_same_verification_as_wrong_password() {
        let fx = Fixture::new();
        fx.add_user("kaku@grandline.io", "Kaku", Role::User, "giraffe2024");
        let hasher = Arc::new(CountingHasher::default());
        let auth = AuthenticationService::new(
            fx.users.clone(),
            fx.credentials.clone(),
            hasher.clone(),
            fx.codec(),
            fx.clock.clone(),
        );
        auth.warm_up().await.unwrap();

        auth.authenticate("nobody@grandline.io", "giraffe2024", None).await.unwrap_err();
        let unknown_email = hasher.verifies.swap(0, Ordering::SeqCst);
        auth.authenticate("kaku@grandline.io", "giraffe2025", None).await.unwrap_err();
        let wrong_password = hasher.verifies.swap(0, Ordering::SeqCst);

        assert_eq!(unknown_email, 1);
        assert_eq!(unknown_email, wrong_password);
    }

    #[tokio::test]
    async fn decoy_password_never_logs_in() {
        let fx = Fixture::new();
        let err = fx.auth.authenticate("ghost@grandline.io", DECOY_PASSWORD, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
        assert_eq!(fx.credentials.len(), 0);
    }

    #[tokio::test]
    async fn each_login_is_a_separate_session() {
        let fx = Fixture::new();
        let user = fx.add_user("sanji@grandline.io", "Sanji", Role::User, "allblue123");

        fx.auth.authenticate("sanji@grandline.io", "allblue123", Some("laptop")).await.unwrap();
        fx.auth.authenticate("sanji@grandline.io", "allblue123", None).await.unwrap();

        let sessions = fx.auth.get_credentials(user.id, None).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().any(|s| s.device_name == DEFAULT_DEVICE_NAME));
        assert!(sessions.iter().all(|s| !s.current));
    }

    #[tokio::test]
    async fn refresh_accepts_expired_token_and_keeps_identity() {
        let fx = Fixture::new();
        let user = fx.add_user("robin@ohara.org", "Robin", Role::Admin, "poneglyph9");
        let old = fx.auth.authenticate("robin@ohara.org", "poneglyph9", None).await.unwrap();

        fx.clock.advance(Duration::hours(5));
        let decoded = fx.codec().decode(&old.access_token, fx.clock.now()).unwrap();
        assert!(decoded.is_expired());

        let fresh = fx.auth.refresh_token(&old.access_token).await.unwrap();
        let claims = fx.codec().decode(&fresh.access_token, fx.clock.now()).unwrap().into_active().unwrap();

        assert_eq!(claims.credential_id, decoded.claims.credential_id);
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.display_name, "Robin");
        assert_eq!(claims.expires_at, fx.clock.now() + Duration::seconds(3600));
    }

    #[tokio::test]
    async fn refresh_fails_once_session_is_deleted() {
        let fx = Fixture::new();
        fx.add_user("franky@grandline.io", "Franky", Role::User, "cola4ever");
        let token = fx.auth.authenticate("franky@grandline.io", "cola4ever", None).await.unwrap().access_token;
        let principal = fx.principal(&token);

        fx.auth.self_logout(&principal).await.unwrap();

        let err = fx.auth.refresh_token(&token).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CredentialNotFound);
    }

    #[tokio::test]
    async fn logout_devices_kills_every_refresh() {
        let fx = Fixture::new();
        let user = fx.add_user("brook@grandline.io", "Brook", Role::User, "yohoho99");
        let phone = fx.auth.authenticate("brook@grandline.io", "yohoho99", Some("phone")).await.unwrap();
        let tablet = fx.auth.authenticate("brook@grandline.io", "yohoho99", Some("tablet")).await.unwrap();

        assert_eq!(fx.auth.logout_devices(user.id).await.unwrap(), 2);
        assert_eq!(fx.auth.logout_devices(user.id).await.unwrap(), 0);

        for token in [phone.access_token, tablet.access_token] {
            let err = fx.auth.refresh_token(&token).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::CredentialNotFound);
        }
    }

    #[tokio::test]
    async fn refresh_rejects_forged_and_garbage_tokens() {
        let fx = Fixture::new();
        let user = fx.add_user("jinbe@grandline.io", "Jinbe", Role::User, "fishman77");
        let token = fx.auth.authenticate("jinbe@grandline.io", "fishman77", None).await.unwrap().access_token;
        let session = fx.principal(&token).credential_id;

        let attacker = TokenCodec::new("attacker-secret", Default::default(), Duration::days(365));
        let forged = attacker.issue(session, user.id, Role::Admin, "Jinbe", fx.clock.now()).unwrap();

        assert_eq!(fx.auth.refresh_token(&forged).await.unwrap_err().code(), ErrorCode::InvalidSignature);
        assert_eq!(fx.auth.refresh_token("garbage").await.unwrap_err().code(), ErrorCode::MalformedToken);
    }

    #[tokio::test]
    async fn logout_of_foreign_session_is_unauthorized() {
        let fx = Fixture::new();
        let alice = fx.add_user("alice@manga.io", "Alice", Role::User, "wonderland1");
        let bob = fx.add_user("bob@manga.io", "Bob", Role::User, "builder123");
        fx.auth.authenticate("alice@manga.io", "wonderland1", None).await.unwrap();
        let bob_token = fx.auth.authenticate("bob@manga.io", "builder123", None).await.unwrap().access_token;
        let bob_session = fx.principal(&bob_token).credential_id;

        let err = fx.auth.logout(alice.id, bob_session).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);

        let bobs = fx.auth.get_credentials(bob.id, None).await.unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].id, bob_session);
    }

    #[tokio::test]
    async fn logout_of_unknown_session_is_not_found() {
        let fx = Fixture::new();
        let user = fx.add_user("chopper@drum.io", "Chopper", Role::User, "rumble100");

        let err = fx.auth.logout(user.id, Uuid::now_v7()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CredentialNotFound);
    }

    #[tokio::test]
    async fn logout_removes_only_the_named_session() {
        let fx = Fixture::new();
        let user = fx.add_user("vivi@alabasta.io", "Vivi", Role::User, "karoo2024");
        let first = fx.auth.authenticate("vivi@alabasta.io", "karoo2024", Some("first")).await.unwrap().access_token;
        let second = fx.auth.authenticate("vivi@alabasta.io", "karoo2024", Some("second")).await.unwrap().access_token;

        fx.auth.logout(user.id, fx.principal(&first).credential_id).await.unwrap();

        assert!(fx.auth.refresh_token(&second).await.is_ok());
        let left = fx.auth.get_credentials(user.id, None).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].device_name, "second");
    }

    #[test]
    fn device_name_is_defaulted_and_truncated() {
        assert_eq!(normalize_device_name(None), DEFAULT_DEVICE_NAME);
        assert_eq!(normalize_device_name(Some("   ")), DEFAULT_DEVICE_NAME);
        assert_eq!(normalize_device_name(Some("x".repeat(300).as_str())).len(), MAX_DEVICE_NAME_LEN);
    }
}
