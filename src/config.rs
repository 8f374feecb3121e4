use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tracker connection settings. Credentials never live here; they come
/// from the `TKT_TRACKER_TOKEN` / `TKT_TRACKER_EMAIL` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackerConfig {
    /// Base URL of the tracker, e.g. "https://example.atlassian.net"
    #[serde(default)]
    pub url: String,
    /// Default project key for new issues (e.g. "OPS")
    #[serde(default)]
    pub project: String,
    /// Account email for Basic auth; omit to send the token as a Bearer header
    #[serde(default)]
    pub email: Option<String>,
}

/// Field discovery cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsConfig {
    /// Days before the cached field mapping is considered stale
    #[serde(default = "default_cache_max_age_days")]
    pub cache_max_age_days: u64,
    /// Hours before staleness; takes precedence over days when set
    #[serde(default)]
    pub cache_max_age_hours: Option<u64>,
}

fn default_cache_max_age_days() -> u64 {
    crate::fields::cache::DEFAULT_MAX_AGE_DAYS
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            cache_max_age_days: default_cache_max_age_days(),
            cache_max_age_hours: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for cached mappings, defaults, and session links
    #[serde(default = "default_data_dir")]
    pub data: String,
}

fn default_data_dir() -> String {
    ".tkt".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data: default_data_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Path to the project-local config file within the data directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".tkt/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so tkt works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Project config in .tkt/ (primary config location)
        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/tkt/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tkt").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with TKT_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("TKT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Get absolute path to the data directory
    pub fn data_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.data);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Browse URL for an issue key on the configured tracker
    pub fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.tracker.url.trim_end_matches('/'), key)
    }
}
