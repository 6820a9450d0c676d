//! MK2 Monitor HTTP API
//!
//! HTTP layer of the dashboard server, built with Axum.
//!
//! # Endpoints
//!
//! All `/api/v1` routes require `Authorization: Bearer <token>`; the
//! token's subject selects the user's readings.
//!
//! ## Readings
//! - `POST /api/v1/readings` - Push one reading
//! - `GET /api/v1/readings` - List readings (`last`, `end_at`)
//! - `GET /api/v1/readings/latest` - Newest reading
//! - `DELETE /api/v1/readings` - Delete all readings
//!
//! ## Chart range
//! - `GET /api/v1/range` - Stored and effective range
//! - `PUT /api/v1/range` - Store a new range
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Dashboard page connection
//!
//! # Example
//!
//! ```rust,ignore
//! use mk2_monitor::api::{serve, AppState};
//! use mk2_monitor::config::Config;
//! use mk2_monitor::storage::RealtimeDatabase;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(RealtimeDatabase::in_memory());
//!
//!     serve(AppState::new(db, &config), &config.api).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::HeaderValue,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/readings",
            get(routes::readings::list_readings)
                .post(routes::readings::push_reading)
                .delete(routes::readings::delete_readings),
        )
        .route("/readings/latest", get(routes::readings::latest_reading))
        .route(
            "/range",
            get(routes::range::get_range).put(routes::range::set_range),
        );

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config.cors_origins);
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Permissive when no origins are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::permissive().allow_origin(AllowOrigin::list(allowed))
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("MK2 monitor listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("MK2 monitor shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenVerifier;
    use crate::config::DashboardConfig;
    use crate::storage::{Reading, RealtimeDatabase};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use tower::util::ServiceExt;

    const SECRET: &str = "api-test-secret";

    fn create_test_app() -> (Router, Arc<RealtimeDatabase>) {
        let db = Arc::new(RealtimeDatabase::in_memory());
        let state = AppState::with_parts(
            Arc::clone(&db),
            TokenVerifier::new(SECRET),
            ApiConfig::default(),
            DashboardConfig::default(),
        );
        (build_router(state), db)
    }

    fn bearer(uid: &str) -> String {
        let token = TokenVerifier::new(SECRET).issue(uid, None, 1).unwrap();
        format!("Bearer {}", token)
    }

    fn request(method: &str, uri: &str, uid: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, bearer(uid));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (app, _db) = create_test_app();

        for uri in ["/health/live", "/health/ready", "/health"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_requires_token() {
        let (app, _db) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/readings")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_push_reading() {
        let (app, db) = create_test_app();

        let response = app
            .oneshot(request(
                "POST",
                "/api/v1/readings",
                "u1",
                Some(r#"{"timestamp": 1641317355, "power": 120.5, "diverted": 30.2, "temperature": 22.1}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            db.last("UsersData/u1/readings").unwrap(),
            Some(Reading::new(1641317355, 120.5, 30.2, 22.1))
        );
    }

    #[tokio::test]
    async fn test_push_invalid_json() {
        let (app, _db) = create_test_app();

        let response = app
            .oneshot(request("POST", "/api/v1/readings", "u1", Some("not json")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_readings_is_scoped_and_ascending() {
        let (app, db) = create_test_app();
        for ts in 1..=10 {
            db.push("UsersData/u1/readings", Reading::new(ts, 1.0, 1.0, 1.0))
                .unwrap();
        }
        db.push("UsersData/u2/readings", Reading::new(99, 1.0, 1.0, 1.0))
            .unwrap();

        let response = app
            .oneshot(request("GET", "/api/v1/readings?last=3&end_at=8", "u1", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["count"], 3);
        let stamps: Vec<i64> = body["readings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["timestamp"].as_i64().unwrap())
            .collect();
        assert_eq!(stamps, vec![6, 7, 8]);
    }

    #[tokio::test]
    async fn test_latest_reading_not_found() {
        let (app, _db) = create_test_app();

        let response = app
            .oneshot(request("GET", "/api/v1/readings/latest", "u1", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_readings() {
        let (app, db) = create_test_app();
        db.push("UsersData/u1/readings", Reading::new(1, 1.0, 1.0, 1.0))
            .unwrap();

        let response = app
            .oneshot(request("DELETE", "/api/v1/readings", "u1", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(db.last("UsersData/u1/readings").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_roundtrip() {
        let (app, db) = create_test_app();

        let response = app
            .clone()
            .oneshot(request("GET", "/api/v1/range", "u1", None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert!(body["range"].is_null());
        assert_eq!(body["effective"], 40);

        let response = app
            .clone()
            .oneshot(request("PUT", "/api/v1/range", "u1", Some(r#"{"range": 15}"#)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(db.get_value("UsersData/u1/charts/range").unwrap(), Some(15));

        let response = app
            .oneshot(request("PUT", "/api/v1/range", "u1", Some(r#"{"range": 0}"#)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
