use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySettings {
    pub max_retries: i32,
    pub timeout_secs: u64,
    pub retry_sweep_secs: u64,
    /// Whether the background retry sweep is scheduled.
    pub sweeper_enabled: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the ledger cannot be reached.
    pub status: &'static str,
    pub version: &'static str,
    pub ledger_healthy: bool,
    pub delivery: DeliverySettings,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ledger_healthy = match state.ledger().health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Delivery ledger health check failed");
            false
        }
    };

    let config = state.pipeline.engine().config();

    Json(HealthResponse {
        status: if ledger_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        ledger_healthy,
        delivery: DeliverySettings {
            max_retries: config.max_retries,
            timeout_secs: config.request_timeout.as_secs(),
            retry_sweep_secs: config.sweep_interval.as_secs(),
            sweeper_enabled: !config.sweep_interval.is_zero(),
        },
    })
}

/// Root-level routes, outside `/api`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
