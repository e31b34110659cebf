//! API token resolution and config scaffolding
//!
//! Token priority: ENV → JSON key file → TOML

use serde::Deserialize;
use std::path::{Path, PathBuf};
use stopcount_common::config::{write_toml_config, TomlConfig, DEFAULT_API_KEY_PATH};
use stopcount_common::{Error, Result};
use tracing::{info, warn};

/// Environment variable holding the Golemio API token
pub const ENV_API_TOKEN: &str = "GOLEMIO_API_TOKEN";

/// Shape of the JSON key file
#[derive(Debug, Deserialize)]
struct ApiKeyFile {
    #[serde(rename = "X-Access-Token")]
    access_token: String,
}

/// Key file location: TOML `api_key_path`, else `golemio_api_key.json`
pub fn api_key_path(toml_config: &TomlConfig) -> PathBuf {
    toml_config
        .api_key_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_API_KEY_PATH))
}

/// Read the token from a key file
///
/// A missing file is `None`. An unreadable or malformed file is logged and
/// treated as `None` so that a lower priority source can still be used.
pub fn read_api_key_file(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }

    let parsed = std::fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice::<ApiKeyFile>(&bytes).map_err(|e| e.to_string()));

    match parsed {
        Ok(file) => Some(file.access_token),
        Err(e) => {
            warn!("Ignoring API key file {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the Golemio API token
pub fn resolve_api_token(toml_config: &TomlConfig) -> Result<String> {
    let key_path = api_key_path(toml_config);

    let candidates = [
        ("environment", std::env::var(ENV_API_TOKEN).ok()),
        ("key file", read_api_key_file(&key_path)),
        ("TOML", toml_config.api_token.clone()),
    ];

    let mut valid = candidates
        .into_iter()
        .filter_map(|(source, token)| token.filter(|t| is_valid_token(t)).map(|t| (source, t)));

    let Some((source, token)) = valid.next() else {
        return Err(Error::Config(format!(
            "Golemio API token not configured. Provide it with one of:\n\
             1. Environment: {}=your-token\n\
             2. Key file: {} containing {{\"X-Access-Token\": \"your-token\"}}\n\
             3. TOML config: api_token = \"your-token\"\n\
             \n\
             Obtain a token at: https://api.golemio.cz/api-keys",
            ENV_API_TOKEN,
            key_path.display()
        )));
    };

    let ignored: Vec<&str> = valid.map(|(source, _)| source).collect();
    if !ignored.is_empty() {
        warn!(
            "API token found in multiple sources; using {} and ignoring {}",
            source,
            ignored.join(", ")
        );
    }

    info!("API token loaded from {}", source);
    Ok(token.trim().to_string())
}

/// Non-empty, non-whitespace
pub fn is_valid_token(token: &str) -> bool {
    !token.trim().is_empty()
}

/// Write a default config file; an existing file is left alone
pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::Config(format!(
            "{} already exists, not overwriting",
            path.display()
        )));
    }

    write_toml_config(&TomlConfig::default(), path)?;
    info!("Default config written to {}", path.display());
    Ok(())
}
