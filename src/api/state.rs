//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;
use std::time::Instant;

use crate::api::error::ApiResult;
use crate::auth::TokenVerifier;
use crate::config::{ApiConfig, Config, DashboardConfig};
use crate::dashboard::Session;
use crate::storage::{RangeRef, ReadingsRef, RealtimeDatabase, UserPaths};
use crate::websocket::{ConnectionHub, HubConfig};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Realtime database holding every user's readings and chart range
    pub db: Arc<RealtimeDatabase>,
    pub verifier: TokenVerifier,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Settings handed to every dashboard session
    pub dashboard: DashboardConfig,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// Open dashboard pages
    pub ws_hub: Arc<ConnectionHub>,
}

impl AppState {
    pub fn new(db: Arc<RealtimeDatabase>, config: &Config) -> Self {
        Self::with_parts(
            db,
            TokenVerifier::new(&config.auth.jwt_secret),
            config.api.clone(),
            config.dashboard.clone(),
        )
    }

    pub fn with_parts(
        db: Arc<RealtimeDatabase>,
        verifier: TokenVerifier,
        api: ApiConfig,
        dashboard: DashboardConfig,
    ) -> Self {
        let hub_config = HubConfig {
            max_connections: api.max_connections,
        };
        Self {
            db,
            verifier,
            config: Arc::new(api),
            dashboard,
            start_time: Instant::now(),
            ws_hub: Arc::new(ConnectionHub::new(hub_config)),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn ws_connection_count(&self) -> usize {
        self.ws_hub.connection_count().await
    }

    /// Resolve the caller from the `Authorization` header
    pub fn authenticate(&self, headers: &HeaderMap) -> ApiResult<Session> {
        let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        Ok(self.verifier.verify_bearer(header)?)
    }

    pub fn readings_for(&self, session: &Session) -> ReadingsRef {
        ReadingsRef::for_user(Arc::clone(&self.db), &UserPaths::for_uid(&session.uid))
    }

    pub fn range_for(&self, session: &Session) -> RangeRef {
        RangeRef::for_user(Arc::clone(&self.db), &UserPaths::for_uid(&session.uid))
    }
}
