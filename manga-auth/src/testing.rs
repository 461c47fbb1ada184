//! In-memory collaborators for service and route tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::mpsc;
use uuid::Uuid;

use manga_shared::errors::{AppError, AppResult, ErrorCode};
use manga_shared::token::{SigningAlgorithm, TokenCodec};
use manga_shared::types::auth::{AuthenticatedPrincipal, Role};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::models::{Credential, User, VerificationToken};
use crate::services::authentication::AuthenticationService;
use crate::services::mailer::{MailDispatcher, MailSender, OutgoingMail};
use crate::services::password::PasswordHasher;
use crate::services::verification::VerificationService;
use crate::stores::{CredentialStore, UserDirectory, VerificationTokenStore};
use crate::AppState;

pub const TEST_SECRET: &str = "test-secret";
pub const APP_URL: &str = "https://manga.test";

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Reversible stand-in for Argon2 so tests stay fast.
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, plain: &str) -> AppResult<String> {
        Ok(format!("plain${plain}"))
    }

    fn verify(&self, plain: &str, hash: &str) -> AppResult<bool> {
        Ok(hash.strip_prefix("plain$") == Some(plain))
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore(Mutex<HashMap<Uuid, Credential>>);

impl MemoryCredentialStore {
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create(&self, user_id: Uuid, device_name: &str, issued_at: DateTime<Utc>) -> AppResult<Credential> {
        let credential = Credential {
            id: Uuid::now_v7(),
            user_id,
            device_name: device_name.to_string(),
            issued_at,
        };
        self.0.lock().unwrap().insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn exists(&self, credential_id: Uuid) -> AppResult<bool> {
        Ok(self.0.lock().unwrap().contains_key(&credential_id))
    }

    async fn list(&self, user_id: Uuid) -> AppResult<Vec<Credential>> {
        let mut rows: Vec<Credential> = self
            .0
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn delete(&self, user_id: Uuid, credential_id: Uuid) -> AppResult<()> {
        let mut rows = self.0.lock().unwrap();
        match rows.get(&credential_id) {
            None => Err(AppError::new(ErrorCode::CredentialNotFound, "credential not found")),
            Some(c) if c.user_id != user_id => {
                Err(AppError::new(ErrorCode::Unauthorized, "credential belongs to another user"))
            }
            Some(_) => {
                rows.remove(&credential_id);
                Ok(())
            }
        }
    }

    async fn delete_all(&self, user_id: Uuid) -> AppResult<usize> {
        let mut rows = self.0.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, c| c.user_id != user_id);
        Ok(before - rows.len())
    }
}

#[derive(Default)]
pub struct MemoryVerificationTokenStore(Mutex<HashMap<String, VerificationToken>>);

impl MemoryVerificationTokenStore {
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[async_trait]
impl VerificationTokenStore for MemoryVerificationTokenStore {
    async fn replace(&self, token: VerificationToken) -> AppResult<()> {
        let mut rows = self.0.lock().unwrap();
        rows.retain(|_, t| !(t.user_id == token.user_id && t.usage == token.usage));
        rows.insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> AppResult<Option<VerificationToken>> {
        Ok(self.0.lock().unwrap().get(token_hash).cloned())
    }

    async fn remove(&self, token_hash: &str) -> AppResult<bool> {
        Ok(self.0.lock().unwrap().remove(token_hash).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut rows = self.0.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, t| !t.is_expired_at(now));
        Ok(before - rows.len())
    }
}

/// Suspends before every call, the way a real database round-trip does, so
/// concurrent callers interleave between lookup and delete.
pub struct YieldingTokenStore(pub Arc<MemoryVerificationTokenStore>);

#[async_trait]
impl VerificationTokenStore for YieldingTokenStore {
    async fn replace(&self, token: VerificationToken) -> AppResult<()> {
        tokio::task::yield_now().await;
        self.0.replace(token).await
    }

    async fn find(&self, token_hash: &str) -> AppResult<Option<VerificationToken>> {
        tokio::task::yield_now().await;
        self.0.find(token_hash).await
    }

    async fn remove(&self, token_hash: &str) -> AppResult<bool> {
        tokio::task::yield_now().await;
        self.0.remove(token_hash).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        tokio::task::yield_now().await;
        self.0.purge_expired(now).await
    }
}

#[derive(Default)]
pub struct MemoryUserDirectory(Mutex<HashMap<Uuid, User>>);

impl MemoryUserDirectory {
    pub fn insert(&self, user: User) {
        self.0.lock().unwrap().insert(user.id, user);
    }

    pub fn get(&self, user_id: Uuid) -> User {
        self.0.lock().unwrap()[&user_id].clone()
    }

    pub fn remove(&self, user_id: Uuid) {
        self.0.lock().unwrap().remove(&user_id);
    }

    fn update(&self, user_id: Uuid, f: impl FnOnce(&mut User)) -> AppResult<()> {
        let mut users = self.0.lock().unwrap();
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found("user not found"))?;
        f(user);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self.0.lock().unwrap().values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.0.lock().unwrap().get(&user_id).cloned())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> AppResult<()> {
        self.update(user_id, |u| u.password_hash = password_hash.to_string())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> AppResult<()> {
        self.update(user_id, |u| u.email_verified = true)
    }
}

pub struct RecordingMailer(mpsc::UnboundedSender<OutgoingMail>);

impl RecordingMailer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutgoingMail>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.0.send(OutgoingMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })?;
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl MailSender for FailingMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
        anyhow::bail!("provider unavailable")
    }
}

/// The raw token embedded in a verification link.
pub fn token_from_mail(mail: &OutgoingMail) -> String {
    let (_, rest) = mail.body.split_once("token=").expect("mail has no token link");
    rest.chars().take_while(|c| c.is_ascii_hexdigit()).collect()
}

/// Both services wired to in-memory stores and a clock stopped at a fixed instant.
pub struct Fixture {
    pub auth: AuthenticationService,
    pub verification: VerificationService,
    pub users: Arc<MemoryUserDirectory>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub tokens: Arc<MemoryVerificationTokenStore>,
    pub clock: Arc<ManualClock>,
    pub outbox: Outbox,
    mailer: MailDispatcher,
}

impl Fixture {
    /// Must be called inside a tokio runtime: the mail worker is spawned here.
    pub fn new() -> Self {
        let users = Arc::new(MemoryUserDirectory::default());
        let credentials = Arc::new(MemoryCredentialStore::default());
        let tokens = Arc::new(MemoryVerificationTokenStore::default());
        // Whole seconds so expiry arithmetic round-trips through JWT claims.
        let start = DateTime::from_timestamp(Utc::now().timestamp(), 0).expect("valid timestamp");
        let clock = Arc::new(ManualClock::new(start));
        let (mailer, outbox) = RecordingMailer::new();
        let (dispatcher, _worker) = MailDispatcher::spawn(Arc::new(mailer));

        let auth = AuthenticationService::new(
            users.clone(),
            credentials.clone(),
            Arc::new(PlainHasher),
            test_codec(),
            clock.clone(),
        );
        let verification = VerificationService::new(
            tokens.clone(),
            users.clone(),
            Arc::new(PlainHasher),
            dispatcher.clone(),
            clock.clone(),
            Duration::minutes(15),
            APP_URL,
        );

        Self {
            auth,
            verification,
            users,
            credentials,
            tokens,
            clock,
            outbox: Outbox(tokio::sync::Mutex::new(outbox)),
            mailer: dispatcher,
        }
    }

    /// A second verification service over the fixture's users and tokens,
    /// with every token-store call suspending first.
    pub fn racing_verification(&self) -> VerificationService {
        VerificationService::new(
            Arc::new(YieldingTokenStore(self.tokens.clone())),
            self.users.clone(),
            Arc::new(PlainHasher),
            self.mailer.clone(),
            self.clock.clone(),
            Duration::minutes(15),
            APP_URL,
        )
    }

    pub fn codec(&self) -> TokenCodec {
        test_codec()
    }

    pub fn add_user(&self, email: &str, display_name: &str, role: Role, password: &str) -> User {
        let now = self.clock.now();
        let user = User {
            id: Uuid::now_v7(),
            email: email.to_lowercase(),
            display_name: display_name.to_string(),
            role: role.to_string(),
            password_hash: format!("plain${password}"),
            email_verified: false,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.clone());
        user
    }

    /// Principal behind `token`, ignoring expiry.
    pub fn principal(&self, token: &str) -> AuthenticatedPrincipal {
        let decoded = self.codec().decode(token, self.clock.now()).expect("token decodes");
        AuthenticatedPrincipal::from(&decoded.claims)
    }

    pub async fn next_mail(&self) -> OutgoingMail {
        self.outbox.next().await
    }

    pub async fn try_next_mail(&self) -> Option<OutgoingMail> {
        self.outbox.try_next().await
    }

    /// Move both services into router state. The database pool never connects.
    pub fn into_state(self) -> (Arc<AppState>, Outbox) {
        let config: AppConfig = serde_json::from_str("{}").expect("config defaults");
        let db = Pool::builder()
            .max_size(1)
            .min_idle(Some(0))
            .build_unchecked(ConnectionManager::<PgConnection>::new("postgres://localhost/unused"));
        let state = AppState {
            config,
            db,
            auth: self.auth,
            verification: self.verification,
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        };
        (Arc::new(state), self.outbox)
    }
}

pub struct Outbox(tokio::sync::Mutex<mpsc::UnboundedReceiver<OutgoingMail>>);

impl Outbox {
    pub async fn next(&self) -> OutgoingMail {
        self.try_next().await.expect("no mail was sent")
    }

    pub async fn try_next(&self) -> Option<OutgoingMail> {
        let mut rx = self.0.lock().await;
        tokio::time::timeout(StdDuration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }
}

pub fn test_codec() -> TokenCodec {
    TokenCodec::new(TEST_SECRET, SigningAlgorithm::Hs256, Duration::seconds(3600))
}
