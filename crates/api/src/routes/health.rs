use axum::extract::State;
use axum::{routing::get, Json, Router};
use galilee_db::CacheStore;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the local cache is reachable.
    pub cache_healthy: bool,
}

/// GET /health -- returns service and cache health.
///
/// Directory and hypervisor reachability are not probed here; each
/// operation reports its own connectivity faults.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache_healthy = state.service.cache().health_check().await.is_ok();

    let status = if cache_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        cache_healthy,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
