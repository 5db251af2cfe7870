//! Application configuration
//!
//! Layered loading: built-in defaults, then `config/default`,
//! `config/local` and `config` files, then `ZAPPIES_*` environment
//! variables. Values are validated after deserialization.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ZappiesError};

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote backend settings
    pub backend: BackendConfig,
    /// Dashboard aggregation settings
    pub dashboard: DashboardConfig,
    /// Local storage settings
    pub storage: StorageConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Remote backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the Supabase project
    pub url: String,
    /// Anonymous API key
    pub anon_key: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Interval of the realtime polling fallback in seconds
    pub realtime_poll_interval_secs: u64,
}

/// Dashboard aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Window selection: "week_to_date" or "trailing"
    pub window_mode: String,
    /// Analytics window length in days, used in "trailing" mode
    pub window_days: u32,
    /// Bound on concurrently fetched businesses
    pub max_concurrent_businesses: usize,
}

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the sled database holding local flags
    pub flag_db_path: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level: trace, debug, info, warn or error
    pub level: String,
    /// Output format: "text" or "json"
    pub format: String,
    /// Optional log file; rotated daily when set
    pub file_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                url: "http://127.0.0.1:54321".to_string(),
                anon_key: String::new(),
                request_timeout_secs: 30,
                realtime_poll_interval_secs: 5,
            },
            dashboard: DashboardConfig {
                window_mode: "week_to_date".to_string(),
                window_days: 7,
                max_concurrent_businesses: 8,
            },
            storage: StorageConfig { flag_db_path: ".zappies/flags".to_string() },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
                file_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let config = Config::builder()
            .set_default("backend.url", defaults.backend.url)?
            .set_default("backend.anon_key", defaults.backend.anon_key)?
            .set_default("backend.request_timeout_secs", defaults.backend.request_timeout_secs)?
            .set_default(
                "backend.realtime_poll_interval_secs",
                defaults.backend.realtime_poll_interval_secs,
            )?
            .set_default("dashboard.window_mode", defaults.dashboard.window_mode)?
            .set_default("dashboard.window_days", defaults.dashboard.window_days)?
            .set_default(
                "dashboard.max_concurrent_businesses",
                defaults.dashboard.max_concurrent_businesses as u64,
            )?
            .set_default("storage.flag_db_path", defaults.storage.flag_db_path)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("ZAPPIES").separator("_"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            return Err(ZappiesError::InvalidConfig("backend.url must not be empty".to_string()));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(ZappiesError::InvalidConfig(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.backend.realtime_poll_interval_secs == 0 {
            return Err(ZappiesError::InvalidConfig(
                "realtime_poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        let valid_modes = ["week_to_date", "trailing"];
        if !valid_modes.contains(&self.dashboard.window_mode.as_str()) {
            return Err(ZappiesError::InvalidConfig(format!(
                "Invalid window mode: {}. Must be one of: {valid_modes:?}",
                self.dashboard.window_mode
            )));
        }
        if self.dashboard.window_days == 0 {
            return Err(ZappiesError::InvalidConfig(
                "window_days must be greater than 0".to_string(),
            ));
        }
        if self.dashboard.max_concurrent_businesses == 0 {
            return Err(ZappiesError::InvalidConfig(
                "max_concurrent_businesses must be greater than 0".to_string(),
            ));
        }

        if self.storage.flag_db_path.trim().is_empty() {
            return Err(ZappiesError::InvalidConfig(
                "flag_db_path must not be empty".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ZappiesError::InvalidConfig(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                self.logging.level
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ZappiesError::InvalidConfig(format!(
                "Invalid log format: {}. Must be one of: {valid_formats:?}",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Get log level from environment or config
    #[must_use]
    pub fn log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}
