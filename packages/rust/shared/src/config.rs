//! Application configuration for the marketplace tooling.
//!
//! User config lives at `~/.hybridci/hybridci.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HybridCiError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "hybridci.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".hybridci";

// ---------------------------------------------------------------------------
// Config structs (matching hybridci.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Marketplace cache and batch settings.
    #[serde(default)]
    pub marketplace: MarketplaceConfig,

    /// GitHub discovery settings.
    #[serde(default)]
    pub github: GitHubConfig,
}

/// `[marketplace]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Seconds a cached record stays fresh.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum pipeline runs in flight during a batch or import.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}
fn default_batch_concurrency() -> usize {
    8
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API root.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Root serving raw file contents.
    #[serde(default = "default_raw_base")]
    pub raw_base: String,

    /// Repository topic that marks a config contribution.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Manifest path inside each contributing repository.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on repositories taken from search.
    #[serde(default = "default_max_repos")]
    pub max_repos: usize,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            topic: default_topic(),
            manifest_path: default_manifest_path(),
            token_env: default_token_env(),
            timeout_secs: default_timeout(),
            max_repos: default_max_repos(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".into()
}
fn default_topic() -> String {
    "hybrid-cicd-config".into()
}
fn default_manifest_path() -> String {
    "hybrid-config.yaml".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_max_repos() -> usize {
    50
}

impl GitHubConfig {
    /// Parse `api_base` into a URL.
    pub fn api_url(&self) -> Result<Url> {
        parse_base_url("github.api_base", &self.api_base)
    }

    /// Parse `raw_base` into a URL.
    pub fn raw_url(&self) -> Result<Url> {
        parse_base_url("github.raw_base", &self.raw_base)
    }
}

fn parse_base_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| HybridCiError::config(format!("{field} '{value}': {e}")))
}

// ---------------------------------------------------------------------------
// Marketplace settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime marketplace settings.
#[derive(Debug, Clone)]
pub struct MarketplaceSettings {
    /// How long a cached record stays fresh.
    pub cache_ttl: Duration,
    /// Bound on concurrent pipeline runs.
    pub batch_concurrency: usize,
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for MarketplaceSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            cache_ttl: Duration::from_secs(config.marketplace.cache_ttl_secs),
            batch_concurrency: config.marketplace.batch_concurrency.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.hybridci/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HybridCiError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.hybridci/hybridci.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HybridCiError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HybridCiError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HybridCiError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HybridCiError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HybridCiError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the GitHub token from the env var named in the config.
///
/// Anonymous access works against the public API, so an unset or empty
/// variable yields `None` rather than an error.
pub fn github_token(config: &AppConfig) -> Option<String> {
    match std::env::var(&config.github.token_env) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}
