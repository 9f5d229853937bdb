//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag) or explicit path
//! 2. `~/.atelier/config.toml` (user)
//! 3. `/etc/atelier/config.toml` (system)
//!
//! When no file exists, [`Config::load_or_default`] falls back to built-in
//! defaults. `ATELIER_API_URL` overrides `api.base_url` in either case.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::FreshnessConfig;
use crate::client::RetryConfig;
use crate::{MarketError, Result};

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "ATELIER_API_URL";

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Client configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Marketplace API endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL all resource paths are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Retry policy for idempotent reads.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Attempts including the first (default: 3). 1 disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 500).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds (default: 10000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter() -> bool {
    true
}

impl From<RetrySettings> for RetryConfig {
    fn from(s: RetrySettings) -> Self {
        RetryConfig::new()
            .max_attempts(s.max_attempts)
            .initial_delay(Duration::from_millis(s.initial_delay_ms))
            .max_delay(Duration::from_millis(s.max_delay_ms))
            .jitter(s.jitter)
    }
}

/// Request cache sizing and freshness.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Maximum values held per resource cache (default: 1000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default)]
    pub freshness: FreshnessConfig,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            freshness: FreshnessConfig::default(),
        }
    }
}

fn default_max_entries() -> u64 {
    1_000
}

/// Where the session is persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSettings {
    /// Session file (default: `~/.atelier/session.json`).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.atelier/config.toml`
    /// 3. `/etc/atelier/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let mut config = Self::from_file(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Like [`load`](Self::load), but falls back to defaults when no config
    /// file exists in the standard locations. An explicit path that does not
    /// exist is still an error.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path) {
            Ok(path) => {
                let mut config = Self::from_file(&path)?;
                config.apply_env();
                Ok(config)
            }
            Err(_) if explicit_path.is_none() => {
                let mut config = Self::default();
                config.apply_env();
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MarketError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| match e {
            MarketError::Configuration(msg) => {
                MarketError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse config from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| MarketError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(MarketError::Configuration("api.base_url is empty".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(MarketError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(MarketError::Configuration(
                "cache.max_entries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
    }

    /// Session file path, falling back to the default location.
    pub fn session_path(&self) -> PathBuf {
        self.session
            .path
            .clone()
            .unwrap_or_else(crate::session::FileSessionStore::default_path)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MarketError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".atelier").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/atelier/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(MarketError::Configuration(
            "No config file found. Create ~/.atelier/config.toml or /etc/atelier/config.toml"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Resource;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.api.base_url, DEFAULT_API_URL);
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.cache.max_entries, 1_000);
        assert!(config.session.path.is_none());
    }

    #[test]
    fn parse_minimal_config() {
        let config = Config::parse(
            r#"
            [api]
            base_url = "https://market.example.com/api"
        "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://market.example.com/api");
        // Defaults preserved
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(
            config.cache.freshness.window(Resource::Categories),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn parse_full_config() {
        let config = Config::parse(
            r#"
            [api]
            base_url = "https://market.example.com/api"
            timeout_secs = 10

            [retry]
            max_attempts = 5
            initial_delay_ms = 100
            max_delay_ms = 2000
            jitter = false

            [cache]
            max_entries = 250

            [cache.freshness]
            job_listings_secs = 30
            negotiations_secs = 5

            [session]
            path = "/tmp/atelier-session.json"
        "#,
        )
        .unwrap();
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.cache.max_entries, 250);
        assert_eq!(
            config.cache.freshness.window(Resource::JobListings),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.session_path(),
            PathBuf::from("/tmp/atelier-session.json")
        );

        let retry: RetryConfig = config.retry.into();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert!(!retry.jitter);
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = Config::parse("[retry]\nmax_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn malformed_toml_is_configuration_error() {
        let err = Config::parse("[api\nbase_url = 1").unwrap_err();
        assert!(matches!(err, MarketError::Configuration(_)));
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn explicit_missing_path_is_error_even_with_default_fallback() {
        let result = Config::load_or_default(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
    }
}
