//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::storage::{DatabaseConfig, WalSyncMode};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Realtime database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Journal mutations to `data_dir`; in-memory only when false
    #[serde(default = "default_persist")]
    pub persist: bool,

    #[serde(default = "default_wal_sync")]
    pub wal_sync: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("mk2-monitor").to_string_lossy().to_string())
        .unwrap_or_else(|| "./mk2_data".to_string())
}

fn default_persist() -> bool {
    true
}

fn default_wal_sync() -> String {
    "batched".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist: default_persist(),
            wal_sync: default_wal_sync(),
        }
    }
}

impl StorageConfig {
    /// Database settings described by this section
    pub fn database_config(&self) -> Result<DatabaseConfig, ConfigError> {
        if !self.persist {
            return Ok(DatabaseConfig::in_memory());
        }
        let wal_sync: WalSyncMode = self.wal_sync.parse().map_err(|e| ConfigError::Invalid {
            field: "storage.wal_sync".to_string(),
            error: format!("{}", e),
        })?;
        Ok(DatabaseConfig {
            data_dir: Some(PathBuf::from(&self.data_dir)),
            wal_sync,
        })
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_max_connections() -> usize {
    1000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl ApiConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: u64,
}

fn default_jwt_secret() -> String {
    "change-me".to_string()
}

fn default_token_ttl() -> u64 {
    24
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_hours: default_token_ttl(),
        }
    }
}

/// Dashboard behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Chart range used while the user has none stored
    #[serde(default = "default_chart_range")]
    pub default_chart_range: u32,

    /// Points a chart keeps before shifting
    #[serde(default = "default_chart_window")]
    pub chart_window: usize,

    #[serde(default = "default_table_page_size")]
    pub table_page_size: usize,
}

fn default_chart_range() -> u32 {
    40
}

fn default_chart_window() -> usize {
    crate::dashboard::DEFAULT_WINDOW
}

fn default_table_page_size() -> usize {
    crate::dashboard::DEFAULT_PAGE_SIZE
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_chart_range: default_chart_range(),
            chart_window: default_chart_window(),
            table_page_size: default_table_page_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config = Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the dashboard cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dashboard.table_page_size < crate::dashboard::MIN_PAGE_SIZE {
            return Err(ConfigError::Invalid {
                field: "dashboard.table_page_size".to_string(),
                error: format!(
                    "must be at least {}, got {}",
                    crate::dashboard::MIN_PAGE_SIZE,
                    self.dashboard.table_page_size
                ),
            });
        }
        if self.dashboard.default_chart_range == 0 {
            return Err(ConfigError::Invalid {
                field: "dashboard.default_chart_range".to_string(),
                error: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        for path in Self::default_paths() {
            if path.exists() {
                match Self::load_with_env(&path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Candidate config files, most specific first
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("mk2-monitor").join("config.toml")),
            Some(PathBuf::from("/etc/mk2-monitor/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `MK2_*` overrides from a variable lookup
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(data_dir) = var("MK2_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        if let Some(host) = var("MK2_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("MK2_API_PORT") {
            match port.parse() {
                Ok(p) => self.api.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid MK2_API_PORT"),
            }
        }

        if let Some(secret) = var("MK2_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        if let Some(level) = var("MK2_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("MK2_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {field}: {error}")]
    Invalid { field: String, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# MK2 Monitor Configuration
#
# Environment variables override these settings:
# - MK2_DATA_DIR
# - MK2_API_HOST
# - MK2_API_PORT
# - MK2_JWT_SECRET
# - MK2_LOG_LEVEL
# - MK2_LOG_FORMAT

[storage]
# Directory for the readings journal
data_dir = "~/.local/share/mk2-monitor"

# Keep readings across restarts
persist = true

# Journal fsync strategy: every_write, batched or none
wal_sync = "batched"

[api]
host = "0.0.0.0"
port = 8086

# Allowed CORS origins (empty allows any)
cors_origins = []

# Maximum concurrent dashboard pages
max_connections = 1000

[auth]
# Shared secret for HS256 session tokens
jwt_secret = "change-me"
token_ttl_hours = 24

[dashboard]
# Readings shown per chart until the user picks a range
default_chart_range = 40

# Points a chart keeps before shifting
chart_window = 40

# Rows per history table page
table_page_size = 100

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
