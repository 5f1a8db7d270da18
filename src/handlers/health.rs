use axum::{extract::State, response::Json};
use serde::Serialize;
use std::time::Instant;
use tracing::warn;
use utoipa::ToSchema;

use crate::{db, handlers::AppState};

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub database: ComponentStatus,
    pub database_latency_ms: u128,
}

/// Liveness plus a database round trip. Always answers 200 so load
/// balancers can tell a degraded instance from a dead one.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    summary = "Health check",
    responses((status = 200, description = "Service status", body = HealthResponse)),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let start = Instant::now();
    let database = match db::check_connection(&state.db).await {
        Ok(()) => ComponentStatus::Up,
        Err(e) => {
            warn!("database health check failed: {}", e);
            ComponentStatus::Down
        }
    };

    Json(HealthResponse {
        status: database,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database,
        database_latency_ms: start.elapsed().as_millis(),
    })
}
