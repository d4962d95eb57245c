//! Runtime configuration.
//!
//! Values come from `config.json` in the config directory, then from
//! environment variables, which win.

use anyhow::{bail, Context};
use music_mcp_auth::{
    default_config_dir, OAuthEndpoints, DEFAULT_ACCOUNTS_URL, DEFAULT_REDIRECT_URI,
    DEFAULT_REFRESH_MARGIN, DEFAULT_AUTH_TIMEOUT,
};
use music_mcp_spotify::DEFAULT_API_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name inside the config directory.
pub const CONFIG_FILE: &str = "config.json";

/// Credentials file name inside the config directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

pub const ENV_CONFIG_DIR: &str = "MUSIC_MCP_CONFIG_DIR";
pub const ENV_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "SPOTIFY_REDIRECT_URI";
pub const ENV_ACCOUNTS_URL: &str = "MUSIC_MCP_ACCOUNTS_URL";
pub const ENV_API_URL: &str = "MUSIC_MCP_API_URL";
pub const ENV_REFRESH_MARGIN: &str = "MUSIC_MCP_REFRESH_MARGIN_SECS";
pub const ENV_AUTH_TIMEOUT: &str = "MUSIC_MCP_AUTH_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Accounts service base URL (`/authorize`, `/api/token`).
    pub accounts_url: String,
    /// Web API base URL.
    pub api_url: String,
    /// Redirect URI offered by `setup`.
    pub redirect_uri: String,
    /// Refresh tokens this many seconds before they expire.
    pub refresh_margin_secs: u64,
    /// Seconds to wait for the browser redirect during `setup`.
    pub auth_timeout_secs: u64,
    /// Client id used by `setup` instead of prompting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Client secret used by `setup` instead of prompting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accounts_url: DEFAULT_ACCOUNTS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN.as_secs(),
            auth_timeout_secs: DEFAULT_AUTH_TIMEOUT.as_secs(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl Config {
    /// Load `config.json` from `dir` and apply the process environment.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        Self::load_file(dir)?.with_env(|key| std::env::var(key).ok())
    }

    /// Load `config.json` from `dir`, or defaults if there is none.
    pub fn load_file(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply overrides from `lookup`, normally the process environment.
    ///
    /// Empty values are ignored.
    pub fn with_env<F>(mut self, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_CLIENT_ID) {
            self.client_id = Some(v);
        }
        if let Some(v) = get(ENV_CLIENT_SECRET) {
            self.client_secret = Some(v);
        }
        if let Some(v) = get(ENV_REDIRECT_URI) {
            self.redirect_uri = v;
        }
        if let Some(v) = get(ENV_ACCOUNTS_URL) {
            self.accounts_url = v;
        }
        if let Some(v) = get(ENV_API_URL) {
            self.api_url = v;
        }
        if let Some(v) = get(ENV_REFRESH_MARGIN) {
            self.refresh_margin_secs = parse_secs(ENV_REFRESH_MARGIN, &v)?;
        }
        if let Some(v) = get(ENV_AUTH_TIMEOUT) {
            let secs = parse_secs(ENV_AUTH_TIMEOUT, &v)?;
            if secs == 0 {
                bail!("{ENV_AUTH_TIMEOUT} must be greater than zero");
            }
            self.auth_timeout_secs = secs;
        }
        Ok(self)
    }

    pub fn endpoints(&self) -> anyhow::Result<OAuthEndpoints> {
        Ok(OAuthEndpoints::from_base(&self.accounts_url)?)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

fn parse_secs(key: &str, value: &str) -> anyhow::Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of seconds, got '{value}'"))
}

/// Pick the config directory: `--config-dir`, then `MUSIC_MCP_CONFIG_DIR`,
/// then the platform default.
pub fn resolve_config_dir<F>(flag: Option<PathBuf>, lookup: F) -> anyhow::Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(dir) = lookup(ENV_CONFIG_DIR).filter(|v| !v.trim().is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    default_config_dir().context("Could not determine a config directory; pass --config-dir")
}
