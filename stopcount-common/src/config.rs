//! Configuration loading and data folder resolution
//!
//! Resolution follows a fixed priority order for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or malformed TOML file is never fatal: the compiled defaults are
//! used instead and the load error is handed back for the caller to report.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data folder
pub const ENV_DATA_FOLDER: &str = "STOPCOUNT_DATA_FOLDER";

/// Environment variable overriding the config file location
pub const ENV_CONFIG_PATH: &str = "STOPCOUNT_CONFIG";

/// Config file name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "stopcount.toml";

/// Compiled default data folder (relative to the working directory)
pub const DEFAULT_DATA_FOLDER: &str = "data";

/// Compiled default API key file (JSON object with an `X-Access-Token` field)
pub const DEFAULT_API_KEY_PATH: &str = "golemio_api_key.json";

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
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

/// Remote API and scheduling parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GolemioConfig {
    /// API root, must end with `/`
    pub base_url: String,
    /// Items requested per page
    pub page_size: u32,
    /// Page requests in flight per wave
    pub concurrency: usize,
    /// Parent stations per batch
    pub batch_size: usize,
    /// Pause between batches
    pub cooldown_secs: u64,
    /// Total timeout of a single HTTP request
    pub request_timeout_secs: u64,
}

impl Default for GolemioConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.golemio.cz/v1/".to_string(),
            page_size: 1000,
            concurrency: 5,
            batch_size: 4000,
            cooldown_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

impl GolemioConfig {
    /// Reject values that would stall or break the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("golemio.page_size must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("golemio.concurrency must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("golemio.batch_size must be at least 1".to_string()));
        }
        if !self.base_url.ends_with('/') {
            return Err(Error::Config(format!(
                "golemio.base_url must end with '/': {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

/// Contents of `stopcount.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding every persisted stage output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_folder: Option<PathBuf>,

    /// JSON file holding the API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_path: Option<PathBuf>,

    /// API token (lowest priority source)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub golemio: GolemioConfig,
}

/// Locate the config file
///
/// Priority: explicit path → `STOPCOUNT_CONFIG` → `<config dir>/stopcount/stopcount.toml`
/// (when it exists) → `./stopcount.toml`.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("stopcount").join(CONFIG_FILE_NAME)) {
        if user_config.exists() {
            return user_config;
        }
    }

    PathBuf::from(CONFIG_FILE_NAME)
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the config file, falling back to defaults when missing or invalid
///
/// The load error, if any, is returned next to the defaults so the caller
/// can report it once logging is up.
pub fn load_toml_config_or_default(path: &Path) -> (TomlConfig, Option<Error>) {
    if !path.exists() {
        return (TomlConfig::default(), None);
    }

    match load_toml_config(path) {
        Ok(config) => (config, None),
        Err(e) => (TomlConfig::default(), Some(e)),
    }
}

/// Write the config file atomically (temp + rename)
///
/// On Unix the file is restricted to the owner (0600) since it may carry an
/// API token.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    crate::fs::write_atomic(path, content.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Resolve the data folder
///
/// Priority: CLI argument → `STOPCOUNT_DATA_FOLDER` → TOML `data_folder` → `data`.
pub fn resolve_data_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ENV_DATA_FOLDER) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.data_folder {
        return path.clone();
    }

    PathBuf::from(DEFAULT_DATA_FOLDER)
}

/// Standard User-Agent for outgoing HTTP requests
pub fn get_user_agent() -> String {
    format!("stopcount/{}", env!("CARGO_PKG_VERSION"))
}
