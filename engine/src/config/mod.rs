//! Configuration management
//!
//! This module handles loading, validation, and management of the Convodesk
//! configuration. Configuration is stored in TOML format at
//! ~/.convodesk/config.toml and is created with defaults on first run.
//!
//! # Configuration Sections
//!
//! - **core**: log level, data directory
//! - **completion**: which completion backend answers chat turns
//! - **chat**: optional conversation seed template
//!
//! # Path Expansion
//!
//! `~` in `data_dir` and `template_path` is expanded to the user's home
//! directory. The data directory is created if it doesn't exist.
//!
//! # Examples
//!
//! ```no_run
//! use convodesk_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Database: {:?}", config.database_path());
//! # Ok(())
//! # }
//! ```

use sdk::errors::ConvoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Completion backend settings
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Chat session settings
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Which backend answers chat turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// Remote completion endpoint over HTTP
    Http,
    /// Canned local replies, no network
    Offline,
}

impl fmt::Display for CompletionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

/// Completion backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: CompletionProvider,

    /// Base URL of the completion endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Chat configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Seed template used for new conversations (supports ~ expansion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.convodesk/data")
}

fn default_provider() -> CompletionProvider {
    CompletionProvider::Http
}

fn default_base_url() -> String {
    "https://api.convo-lang.ai".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.convodesk/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, ConvoError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Same as [`load_or_create`](Self::load_or_create) for an explicit path
    pub fn load_or_create_at(path: &Path) -> Result<Self, ConvoError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConvoError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConvoError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConvoError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| ConvoError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;
        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, ConvoError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConvoError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Written before processing so the file keeps the portable `~` paths
        let mut config = Self::default_config();
        let toml_string = config.to_toml()?;
        fs::write(path, toml_string)
            .map_err(|e| ConvoError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.convodesk/config.toml)
    pub fn default_config_path() -> Result<PathBuf, ConvoError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConvoError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".convodesk").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            completion: CompletionConfig::default(),
            chat: ChatConfig::default(),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConvoError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConvoError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// SQLite database holding sessions and todos
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("convodesk.db")
    }

    /// Read the configured seed template, if one is set
    pub fn load_template(&self) -> Result<Option<String>, ConvoError> {
        let Some(path) = &self.chat.template_path else {
            return Ok(None);
        };
        let template = fs::read_to_string(path).map_err(|e| {
            ConvoError::Config(format!("Failed to read template {:?}: {}", path, e))
        })?;
        Ok(Some(template))
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level and completion settings
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), ConvoError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ConvoError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.completion.timeout_secs == 0 {
            return Err(ConvoError::Config(
                "completion.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.completion.provider == CompletionProvider::Http
            && !(self.completion.base_url.starts_with("http://")
                || self.completion.base_url.starts_with("https://"))
        {
            return Err(ConvoError::Config(format!(
                "completion.base_url must be an http(s) URL, got '{}'",
                self.completion.base_url
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if let Some(template) = &self.chat.template_path {
            self.chat.template_path = Some(expand_path(template)?);
        }

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                ConvoError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf, ConvoError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ConvoError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ConvoError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| ConvoError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
