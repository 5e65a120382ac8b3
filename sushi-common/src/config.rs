//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `SUSHI_HARVEST_CONFIG`
//! 3. Platform config directory (`<config>/sushi-harvest/config.toml`)
//! 4. Compiled defaults (no file)
//!
//! A missing config file is never fatal: a warning is logged and defaults
//! are used.

use crate::models::FieldLimits;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SUSHI_HARVEST_CONFIG";

/// Directory name used under platform config/data directories
const APP_DIR_NAME: &str = "sushi-harvest";

/// Browser-like agent; several SUSHI providers reject default client signatures
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 Firefox/73.0 Chrome/80.0.3987.132 Safari/605.1.15";

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level (overridden by `RUST_LOG`)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// SUSHI client section of the TOML config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SushiConfig {
    /// Timeout of the first attempt
    pub primary_timeout_secs: u64,
    /// Timeout of the single retry made after the first attempt times out
    pub retry_timeout_secs: u64,
    /// Minimum spacing between calls to the same provider
    pub min_request_interval_ms: u64,
    pub user_agent: String,
    /// Call the `status` endpoint before harvesting
    pub check_service_status: bool,
}

impl Default for SushiConfig {
    fn default() -> Self {
        Self {
            primary_timeout_secs: 90,
            retry_timeout_secs: 299,
            min_request_interval_ms: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            check_service_status: true,
        }
    }
}

impl SushiConfig {
    pub fn primary_timeout(&self) -> Duration {
        Duration::from_secs(self.primary_timeout_secs)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

/// Complete TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub sushi: SushiConfig,
    pub field_limits: FieldLimits,
    /// SQLite database holding harvested usage records
    pub database_path: Option<PathBuf>,
    /// Directory of previously downloaded SUSHI responses
    pub fallback_dir: Option<PathBuf>,
    /// TOML file of statistics sources and their SUSHI credentials
    pub credentials_file: Option<PathBuf>,
}

impl TomlConfig {
    /// Database path, falling back to the platform data directory
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("usage.db"))
    }
}

/// Resolve the config file path following the documented priority order
///
/// Returns `None` when no candidate exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME).join("config.toml"))
        .filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration with graceful degradation
///
/// A resolved path that does not exist logs a warning and yields defaults;
/// a file that exists but does not parse is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            info!("Configuration loaded from {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        None => {
            info!("No config file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Get OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./sushi_harvest_data"))
}
