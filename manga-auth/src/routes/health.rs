use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use diesel::prelude::*;

use manga_shared::types::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pool = state.db.clone();
    let database = tokio::task::spawn_blocking(move || -> Result<(), String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        diesel::sql_query("SELECT 1")
            .execute(&mut *conn)
            .map_err(|e| e.to_string())?;
        Ok(())
    })
    .await
    .unwrap_or_else(|e| Err(e.to_string()));

    let check = match database {
        Ok(()) => HealthCheck { name: "database".into(), status: HealthStatus::Healthy, message: None },
        Err(e) => {
            tracing::warn!(error = %e, "database health check failed");
            HealthCheck { name: "database".into(), status: HealthStatus::Unhealthy, message: Some(e) }
        }
    };

    Json(HealthResponse::new("manga-auth", env!("CARGO_PKG_VERSION"), vec![check]))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}
