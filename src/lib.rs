//! # MK2 Monitor
//!
//! Live dashboard server for the MK2 PV energy diverter. The device pushes
//! timestamped readings; every open dashboard page sees them immediately as
//! chart points, summary cards and history table rows.
//!
//! ## Modules
//!
//! - [`storage`]: Realtime database of per-user readings logs and chart range
//! - [`dashboard`]: Charts, live feeds, range controller, history table, session gate
//! - [`auth`]: Bearer token verification
//! - [`websocket`]: Dashboard page protocol
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mk2_monitor::dashboard::{Session, SessionGate};
//! use mk2_monitor::config::DashboardConfig;
//! use mk2_monitor::storage::{Reading, RealtimeDatabase};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Arc::new(RealtimeDatabase::in_memory());
//!     db.push("UsersData/u1/readings", Reading::new(1641317355, 120.5, 30.2, 22.1))?;
//!
//!     // Everything the page should render arrives on `events`
//!     let (ui, mut events) = mpsc::unbounded_channel();
//!     let mut gate = SessionGate::new(Arc::clone(&db), DashboardConfig::default(), ui);
//!     gate.on_session_change(Some(Session::new("u1")))?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod storage;
pub mod websocket;

// Re-export top-level types for convenience
pub use storage::{
    DatabaseConfig, LogQuery, RangeRef, Reading, ReadingsRef, RealtimeDatabase, StorageError,
    StorageResult, UserPaths,
};

pub use dashboard::{
    ChartConfig, ChartSet, ChartView, DashboardSession, FeedSubscription, HistoryPaginator,
    HistoryTable, LiveFeed, RangeController, Session, SessionGate, SummaryCard, TableRow, UiSink,
    ViewState,
};

pub use auth::{AuthError, TokenVerifier};

pub use api::{build_router, serve, ApiError, AppState};

pub use websocket::{ClientMessage, ConnectionHub, HubConfig, HubError, ServerMessage};

pub use config::{Config, ConfigError, DashboardConfig, LoggingConfig};
