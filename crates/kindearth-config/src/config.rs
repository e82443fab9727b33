//! Configuration management for the storefront client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default backend API URL (can be overridden at compile time via KINDEARTH_API_URL env var).
pub const DEFAULT_API_URL: &str = match option_env!("KINDEARTH_API_URL") {
    Some(url) => url,
    None => "http://localhost:8080/",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default per-request timeout. The transport library has no timeout of its own.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_CSRF_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_CSRF_INITIAL_BACKOFF_MS: u64 = 1_000;

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Backend base URL all API paths are resolved against.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Timeout applied to every HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Total CSRF bootstrap attempts before giving up.
    #[serde(default = "default_csrf_max_attempts")]
    pub csrf_max_attempts: u32,
    /// Backoff before the first CSRF retry; doubles for each further retry.
    #[serde(default = "default_csrf_initial_backoff_ms")]
    pub csrf_initial_backoff_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_csrf_max_attempts() -> u32 {
    DEFAULT_CSRF_MAX_ATTEMPTS
}

fn default_csrf_initial_backoff_ms() -> u64 {
    DEFAULT_CSRF_INITIAL_BACKOFF_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_url: default_api_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            csrf_max_attempts: DEFAULT_CSRF_MAX_ATTEMPTS,
            csrf_initial_backoff_ms: DEFAULT_CSRF_INITIAL_BACKOFF_MS,
        }
    }
}

impl Config {
    /// Load configuration from the config file if it exists, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn load_from_env(&mut self) {
        if let Some(log_level) = env_value("KINDEARTH_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(api_url) = env_value("KINDEARTH_API_URL") {
            self.api_url = api_url;
        }
        if let Some(timeout) = env_value("KINDEARTH_REQUEST_TIMEOUT_SECS")
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            self.request_timeout_secs = timeout;
        }
    }

    /// Parse the API base URL.
    ///
    /// The path always ends with `/`, so relative joins such as `csrf-token`
    /// land under the configured prefix instead of replacing its last segment.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        let mut url = Url::parse(self.api_url.trim())?;
        if url.cannot_be_a_base() {
            return Err(CoreError::Config(format!(
                "API URL cannot be used as a base: {}",
                self.api_url
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Per-request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.csrf_max_attempts, 3);
        assert_eq!(config.csrf_initial_backoff_ms, 1_000);
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "api_url": "https://api.kindearth.shop" }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api_url, "https://api.kindearth.shop");
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.csrf_max_attempts, 3);
    }

    #[test]
    fn test_config_load_reads_config_file() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(
            paths.config_file(),
            r#"{ "request_timeout_secs": 5, "csrf_max_attempts": 4 }"#,
        )
        .unwrap();

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.csrf_max_attempts, 4);
        assert_eq!(config.csrf_initial_backoff_ms, 1_000);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("missing"));

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.csrf_initial_backoff_ms, 1_000);
    }

    #[test]
    fn test_api_base_url_gets_trailing_slash() {
        let config = Config {
            api_url: "https://api.kindearth.shop/v2".to_string(),
            ..Config::default()
        };
        let url = config.api_base_url().unwrap();
        assert_eq!(url.as_str(), "https://api.kindearth.shop/v2/");
        assert_eq!(
            url.join("csrf-token").unwrap().as_str(),
            "https://api.kindearth.shop/v2/csrf-token"
        );
    }

    #[test]
    fn test_api_base_url_invalid() {
        let config = Config {
            api_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(config.api_base_url().is_err());

        let config = Config {
            api_url: "mailto:shop@kindearth.shop".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.api_base_url(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(paths.config_file(), r#"{ "request_timeout_secs": 0 }"#).unwrap();

        let err = Config::load(&paths).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_request_timeout_duration() {
        let config = Config {
            request_timeout_secs: 12,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(12));
    }
}
