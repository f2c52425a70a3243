use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::store::StoreOptions;
use crate::sync::SyncProtocol;
use crate::token::TokenSource;

/// Environment variable that overrides the configured token.
pub const TOKEN_ENV: &str = "CLOUDY_READER_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval_secs: u64,

    #[serde(default = "default_sync_protocol")]
    pub sync_protocol: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    pub token: Option<String>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cloudy-reader");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("cloudyrss.db").to_string_lossy().to_string()
}

fn default_api_url() -> String {
    "http://localhost:8787".to_string()
}

fn default_auto_sync_interval() -> u64 {
    60
}

fn default_sync_protocol() -> String {
    SyncProtocol::Watermelon.name().to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            api_url: default_api_url(),
            auto_sync_interval_secs: default_auto_sync_interval(),
            sync_protocol: default_sync_protocol(),
            request_timeout_secs: default_request_timeout(),
            token: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                config.token = Some(token);
            }
        }
        Ok(config)
    }

    /// Reads the file at `path`, writing defaults there first if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cloudy-reader")
            .join("config.toml")
    }

    pub fn store_options(&self, token: TokenSource) -> Result<StoreOptions> {
        let protocol = SyncProtocol::from_name(&self.sync_protocol).ok_or_else(|| {
            AppError::Config(format!("unknown sync protocol: {}", self.sync_protocol))
        })?;

        Ok(StoreOptions::new(self.api_url.clone(), token)
            .with_protocol(protocol)
            .with_db_path(self.db_path.clone())
            .with_auto_sync_interval(Duration::from_secs(self.auto_sync_interval_secs.max(1)))
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs.max(1))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::token_channel;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.auto_sync_interval_secs, 60);
        assert_eq!(config.api_url, "http://localhost:8787");
        assert!(config.token.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_url = \"https://api.example.com\"\ntoken = \"abc\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.auto_sync_interval_secs, 60);

        let (_tx, rx) = token_channel(None);
        let options = config.store_options(rx).unwrap();
        assert_eq!(options.protocol, SyncProtocol::Watermelon);
        assert_eq!(options.auto_sync_interval, Some(Duration::from_secs(60)));
        assert_eq!(options.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.db_path.as_deref(), Some(config.db_path.as_str()));
    }

    #[test]
    fn unknown_sync_protocol_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sync_protocol = \"dexie\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        let (_tx, rx) = token_channel(None);
        assert!(matches!(config.store_options(rx), Err(AppError::Config(_))));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "auto_sync_interval_secs = \"soon\"").unwrap();
        assert!(matches!(Config::load_from(&path), Err(AppError::Toml(_))));
    }
}
