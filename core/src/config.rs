/// Configuration management for Trellis.
/// Handles loading, parsing and validation of .trellis/config.toml
use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Top-level configuration structure for Trellis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrellisConfig {
    /// Configuration file version
    #[serde(default = "default_version")]
    pub version: String,

    /// Storage and persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Workflow layout geometry
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage: StorageConfig::default(),
            layout: LayoutConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all persisted data
    #[serde(default = "default_storage_path")]
    pub base_path: String,

    /// SQLite database file (relative to base_path unless absolute)
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Apply pending schema migrations on connect
    #[serde(default = "default_true")]
    pub auto_migrate: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
            sqlite_path: default_sqlite_path(),
            pool_size: default_pool_size(),
            auto_migrate: true,
        }
    }
}

impl StorageConfig {
    /// Resolved path of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.sqlite_path);
        if path.is_absolute() {
            path
        } else {
            PathBuf::from(&self.base_path).join(path)
        }
    }
}

fn default_storage_path() -> String {
    dirs::home_dir()
        .map(|home| home.join(".trellis"))
        .unwrap_or_else(|| PathBuf::from(".trellis"))
        .to_string_lossy()
        .to_string()
}

fn default_sqlite_path() -> String {
    "data/trellis.db".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

/// Grid geometry used by the layout engine.
///
/// Depth levels run left to right `level_spacing` apart; nodes sharing a level
/// stack top to bottom `node_spacing` apart, starting at (`base_x`, `base_y`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_level_spacing")]
    pub level_spacing: f64,

    #[serde(default = "default_node_spacing")]
    pub node_spacing: f64,

    #[serde(default = "default_base_offset")]
    pub base_x: f64,

    #[serde(default = "default_base_offset")]
    pub base_y: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            level_spacing: default_level_spacing(),
            node_spacing: default_node_spacing(),
            base_x: default_base_offset(),
            base_y: default_base_offset(),
        }
    }
}

fn default_level_spacing() -> f64 {
    280.0
}

fn default_node_spacing() -> f64 {
    160.0
}

fn default_base_offset() -> f64 {
    100.0
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Configuration loader and manager
pub struct ConfigManager {
    config: TrellisConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Default config location: ~/.trellis/config.toml, else ./.trellis/config.toml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".trellis/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".trellis/config.toml"))
    }

    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            warn!("Config file not found at {:?}, using defaults", path);
            TrellisConfig::default()
        };

        debug!("Configuration loaded successfully");
        Ok(ConfigManager {
            config,
            config_path: path,
        })
    }

    /// Wrap an in-memory configuration
    pub fn from_config(config: TrellisConfig, config_path: PathBuf) -> Self {
        ConfigManager {
            config,
            config_path,
        }
    }

    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TrellisConfig {
        &mut self.config
    }

    /// Save configuration to file
    pub fn save(&self) -> ConfigResult<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::WriteError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        info!("Configuration saved to {:?}", self.config_path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.config.storage.pool_size == 0 {
            return Err(ConfigError::Invalid(
                "Database pool size must be greater than 0".to_string(),
            ));
        }

        let layout = &self.config.layout;
        if !(layout.level_spacing > 0.0) || !(layout.node_spacing > 0.0) {
            return Err(ConfigError::Invalid(
                "Layout spacing must be positive".to_string(),
            ));
        }
        if !layout.base_x.is_finite() || !layout.base_y.is_finite() {
            return Err(ConfigError::Invalid(
                "Layout offsets must be finite".to_string(),
            ));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Apply overrides from environment variables
    pub fn load_from_env(&mut self) -> ConfigResult<()> {
        if let Ok(path) = std::env::var("TRELLIS_DB_PATH") {
            self.config.storage.sqlite_path = path;
        }

        if let Ok(level) = std::env::var("TRELLIS_LOG_LEVEL") {
            self.config.logging.level = level;
        }

        debug!("Configuration overrides loaded from environment");
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
