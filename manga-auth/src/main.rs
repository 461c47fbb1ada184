use std::sync::Arc;
use std::time::Duration;

use manga_auth::clock::SystemClock;
use manga_auth::config::AppConfig;
use manga_auth::routes;
use manga_auth::services::authentication::AuthenticationService;
use manga_auth::services::mailer::MailDispatcher;
use manga_auth::services::password::Argon2Hasher;
use manga_auth::services::verification::VerificationService;
use manga_auth::stores::{PgCredentialStore, PgUserDirectory, PgVerificationTokenStore};
use manga_auth::AppState;
use manga_shared::clients::db::create_pool;
use manga_shared::clients::email::EmailClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    manga_shared::middleware::init_tracing("manga-auth");

    let config = AppConfig::load()?;
    let auth_config = config.auth()?;
    let port = config.port;
    anyhow::ensure!(config.purge_interval_secs > 0, "purge_interval_secs must be positive");
    anyhow::ensure!(config.email_timeout_secs > 0, "email_timeout_secs must be positive");

    let metrics = manga_shared::middleware::init_metrics()?;
    let db = create_pool(
        &config.database_url,
        config.db_pool_size,
        Duration::from_secs(config.db_timeout_secs),
    )?;

    let email = EmailClient::new(
        &config.resend_api_key,
        &config.from_email,
        "Manga",
        Duration::from_secs(config.email_timeout_secs),
    )?;
    let (mailer, _mail_worker) = MailDispatcher::spawn(Arc::new(email));

    let users = Arc::new(PgUserDirectory::new(db.clone()));
    let hasher = Arc::new(Argon2Hasher::default());
    let clock = Arc::new(SystemClock);

    let auth = AuthenticationService::new(
        users.clone(),
        Arc::new(PgCredentialStore::new(db.clone())),
        hasher.clone(),
        auth_config.token_codec(),
        clock.clone(),
    );
    auth.warm_up().await?;

    let verification = VerificationService::new(
        Arc::new(PgVerificationTokenStore::new(db.clone())),
        users,
        hasher,
        mailer,
        clock,
        auth_config.verification_token_ttl,
        config.app_url.clone(),
    );

    let purge_every = Duration::from_secs(config.purge_interval_secs);
    let state = Arc::new(AppState { config, db, auth, verification, metrics });

    // Expired verification tokens are useless but would otherwise pile up.
    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        loop {
            ticker.tick().await;
            if let Err(e) = purge_state.verification.purge_expired().await {
                tracing::error!(error = %e, "verification token purge failed");
            }
        }
    });

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "manga-auth starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
