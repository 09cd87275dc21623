//! Client configuration.
//!
//! Loaded once at startup from `config.toml` and passed by value into the
//! cache stores, retry policy and API client. Every field has a default, and
//! out-of-range values are replaced with that default (with a warning) rather
//! than failing the load.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL, including the `/api` prefix.
    pub api_base_url: String,
    /// Per-attempt deadline. Exceeding it classifies as a timeout.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Where the cache database lives.
    pub data_dir: PathBuf,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entry lifetime in seconds. Default: 300 (5 minutes).
    pub max_age_secs: u64,
    /// Entry count bound per cache domain.
    pub max_items: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|d| d.join("fliplens"))
            .unwrap_or_else(|| PathBuf::from(".fliplens"));

        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            data_dir,
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: 300,
            max_items: 50,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Config {
    /// Directory holding `config.toml` and the persisted session.
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("fliplens"))
            .unwrap_or_else(|| PathBuf::from(".fliplens"))
    }

    /// Path to the `SQLite` cache database.
    #[must_use]
    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir.join("cache.db")
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load from the default location, apply environment overrides and sanitize.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        config.sanitize();
        Ok(config)
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `FLIPLENS_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("FLIPLENS_API_URL") {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup("FLIPLENS_CACHE_ENABLED") {
            match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.cache.enabled = true,
                "0" | "false" | "no" | "off" => self.cache.enabled = false,
                other => warn!("Ignoring FLIPLENS_CACHE_ENABLED={other:?}: expected a boolean"),
            }
        }
        if let Some(raw) = lookup("FLIPLENS_REQUEST_TIMEOUT") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(_) => warn!("Ignoring FLIPLENS_REQUEST_TIMEOUT={raw:?}: expected seconds"),
            }
        }
    }

    /// Replace out-of-range values with their defaults.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        let trimmed = self.api_base_url.trim().trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            warn!("api_base_url is empty, falling back to {DEFAULT_API_BASE_URL}");
            self.api_base_url = defaults.api_base_url;
        } else {
            self.api_base_url = trimmed;
        }

        if self.request_timeout_secs == 0 {
            warn!("request_timeout_secs must be positive, using {DEFAULT_REQUEST_TIMEOUT_SECS}");
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        if self.connect_timeout_secs == 0 {
            warn!("connect_timeout_secs must be positive, using {DEFAULT_CONNECT_TIMEOUT_SECS}");
            self.connect_timeout_secs = DEFAULT_CONNECT_TIMEOUT_SECS;
        }

        let cache = CacheConfig::default();
        if self.cache.max_age_secs == 0 {
            warn!("cache.max_age_secs must be positive, using {}", cache.max_age_secs);
            self.cache.max_age_secs = cache.max_age_secs;
        }
        if self.cache.max_items == 0 {
            warn!("cache.max_items must be positive, using {}", cache.max_items);
            self.cache.max_items = cache.max_items;
        }

        let retry = RetryConfig::default();
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            warn!(
                "retry.multiplier {} is invalid, using {}",
                self.retry.multiplier, retry.multiplier
            );
            self.retry.multiplier = retry.multiplier;
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            warn!(
                "retry.max_delay_ms {} is below base_delay_ms {}, raising it",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            );
            self.retry.max_delay_ms = self.retry.base_delay_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = Config::from_toml("api_base_url = \"https://fliplens.example/api\"").unwrap();
        assert_eq!(config.api_base_url, "https://fliplens.example/api");
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_nested_tables() {
        let config = Config::from_toml(
            r"
            [cache]
            enabled = false
            max_items = 10

            [retry]
            max_retries = 5
            ",
        )
        .unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.max_items, 10);
        assert_eq!(config.cache.max_age_secs, 300);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = Config::from_toml("cache = [").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_sanitize_replaces_invalid_values() {
        let mut config = Config {
            api_base_url: "  ".into(),
            request_timeout_secs: 0,
            cache: CacheConfig {
                enabled: true,
                max_age_secs: 0,
                max_items: 0,
            },
            retry: RetryConfig {
                max_retries: 2,
                base_delay_ms: 500,
                multiplier: f64::NAN,
                max_delay_ms: 100,
            },
            ..Config::default()
        };
        config.sanitize();

        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.cache.max_age_secs, 300);
        assert_eq!(config.cache.max_items, 50);
        assert!((config.retry.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.retry.max_delay_ms, 500);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_sanitize_trims_trailing_slash() {
        let mut config = Config {
            api_base_url: "http://localhost:5000/api/".into(),
            ..Config::default()
        };
        config.sanitize();
        assert_eq!(config.api_base_url, "http://localhost:5000/api");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "FLIPLENS_API_URL" => Some("http://10.0.0.2:5000/api".into()),
            "FLIPLENS_CACHE_ENABLED" => Some("off".into()),
            "FLIPLENS_REQUEST_TIMEOUT" => Some("not-a-number".into()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://10.0.0.2:5000/api");
        assert!(!config.cache.enabled);
        assert_eq!(config.request_timeout_secs, 15);
    }
}
