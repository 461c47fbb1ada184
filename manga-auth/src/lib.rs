pub mod clock;
pub mod config;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod stores;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use manga_shared::clients::db::DbPool;
use manga_shared::middleware::TokenCodecState;
use manga_shared::token::TokenCodec;

use config::AppConfig;
use services::authentication::AuthenticationService;
use services::verification::VerificationService;

pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub auth: AuthenticationService,
    pub verification: VerificationService,
    pub metrics: PrometheusHandle,
}

impl TokenCodecState for AppState {
    fn token_codec(&self) -> &TokenCodec {
        self.auth.token_codec()
    }

    fn now(&self) -> DateTime<Utc> {
        self.auth.now()
    }
}
