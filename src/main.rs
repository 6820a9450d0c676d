//! MK2 Monitor Server
//!
//! Run with: cargo run --bin mk2-monitor -- --config config.toml
//!
//! Serves the dashboard WebSocket, the readings API and health probes on top
//! of one realtime database. See `mk2ctl config` for every setting.

use clap::Parser;
use mk2_monitor::api::{serve, AppState};
use mk2_monitor::config::{Config, LoggingConfig};
use mk2_monitor::storage::RealtimeDatabase;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Journal flush cadence
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "mk2-monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live dashboard server for the MK2 energy diverter")]
struct Args {
    /// Config file (default: standard locations, then environment)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_tracing(&config.logging);

    tracing::info!("Starting MK2 monitor v{}", env!("CARGO_PKG_VERSION"));

    let db_config = config.storage.database_config()?;
    match &db_config.data_dir {
        Some(dir) => tracing::info!("Data directory: {:?}", dir),
        None => tracing::info!("Persistence disabled, readings are kept in memory"),
    }

    let db = Arc::new(RealtimeDatabase::open(db_config)?);
    tracing::info!("Database ready: {}", db.stats()?);

    let flusher = Arc::clone(&db);
    let flush_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = flusher.flush() {
                tracing::warn!(error = %e, "Journal flush failed");
            }
        }
    });

    if config.auth.jwt_secret == "change-me" {
        tracing::warn!("Using the default JWT secret; set MK2_JWT_SECRET in production");
    }

    let state = AppState::new(Arc::clone(&db), &config);
    serve(state, &config.api).await?;

    tracing::info!("Shutting down...");
    flush_handle.abort();
    db.shutdown()?;

    tracing::info!("MK2 monitor shutdown complete");
    Ok(())
}

/// Install the global subscriber described by `[logging]`; `RUST_LOG` wins
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("mk2_monitor={},tower_http={}", logging.level, logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
