//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (ready to serve traffic)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Returns 200 once the database answers.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.db.stats() {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /health
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.db.stats();

    let (status, storage, readings) = match &stats {
        Ok(stats) => ("healthy", "ok".to_string(), stats.readings),
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            ("unhealthy", "error".to_string(), 0)
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        storage,
        uptime_seconds: state.uptime_seconds(),
        connections: state.ws_connection_count().await,
        readings,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }
}
