use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

/// Direct host:port of the backend, used when neither the environment nor the
/// config file overrides it.
pub const DEFAULT_API_URL: &str = "http://localhost:33000";

/// Environment variable that overrides the backend base URL.
pub const API_URL_ENV: &str = "MOSHENG_API_URL";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub access_token: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn save_access_token(token: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.access_token = Some(token.to_string());
        config.save()
    }

    pub fn clear_access_token() -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.access_token = None;
        config.save()
    }

    /// Base URL of the backend: environment override first, then the config
    /// file, then the compiled-in default.
    pub fn resolved_api_url(&self) -> String {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                return url.trim_end_matches('/').to_string();
            }
        }

        self.api_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("mosheng").join("config.json"))
    }
}
