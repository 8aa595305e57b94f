//! Settings and configuration module
//!
//! Provides the caller-supplied bypass policy with:
//! - Builder pattern
//! - JSON loading
//! - An open parameter bag for strategy-specific knobs

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Desktop Chrome user agent used when the caller does not pick one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_FLARESOLVERR_ENDPOINT: &str = "http://localhost:8191/v1";
const DEFAULT_FLARESOLVERR_MAX_TIMEOUT_MS: u64 = 120_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Errors raised while building or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("user agent must not be empty")]
    MissingUserAgent,
    #[error("timeout must be greater than zero")]
    InvalidTimeout,
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Policy handed to the bypass manager and every strategy it runs.
///
/// `user_agent` must match a cached cookie's agent exactly for the cache to be
/// used. Everything else is advisory for strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BypassConfig {
    pub user_agent: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

impl BypassConfig {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            parameters: HashMap::new(),
        }
    }

    /// Load a configuration from its camelCase JSON form and validate it.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Per-strategy timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameter(key).and_then(Value::as_str)
    }

    pub fn parameter_u64(&self, key: &str) -> Option<u64> {
        self.parameter(key).and_then(Value::as_u64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::MissingUserAgent);
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

/// Connection settings for a FlareSolverr relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlareSolverrConfig {
    pub endpoint: String,
    /// Budget handed to FlareSolverr itself for a single solve.
    pub max_timeout_ms: u64,
}

impl FlareSolverrConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_timeout_ms: DEFAULT_FLARESOLVERR_MAX_TIMEOUT_MS,
        }
    }

    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// API URL with `localhost` pinned to IPv4 and a single `/v1` suffix.
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        let mut endpoint = self
            .endpoint
            .trim()
            .replace("localhost", "127.0.0.1")
            .trim_end_matches('/')
            .to_string();
        if !endpoint.ends_with("/v1") {
            endpoint.push_str("/v1");
        }
        Url::parse(&endpoint).map_err(|_| ConfigError::InvalidEndpoint(self.endpoint.clone()))
    }

    /// Base URL answering health checks.
    pub fn health_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.api_url()?;
        url.set_path("/");
        Ok(url)
    }
}

impl Default for FlareSolverrConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FLARESOLVERR_ENDPOINT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = BypassConfig::new("UA")
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(1)
            .with_parameter("proxy", "socks5://127.0.0.1:9050");

        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.parameter_str("proxy"), Some("socks5://127.0.0.1:9050"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_blank_user_agent_and_zero_timeout() {
        assert!(matches!(
            BypassConfig::new("  ").validate(),
            Err(ConfigError::MissingUserAgent)
        ));
        assert!(matches!(
            BypassConfig::new("UA").with_timeout(Duration::ZERO).validate(),
            Err(ConfigError::InvalidTimeout)
        ));
    }

    #[test]
    fn loads_from_json_with_defaults() {
        let config =
            BypassConfig::from_json_str(r#"{"userAgent":"UA","parameters":{"attempts":2}}"#)
                .expect("valid config");
        assert_eq!(config.user_agent, "UA");
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.parameter_u64("attempts"), Some(2));

        assert!(matches!(
            BypassConfig::from_json_str(r#"{"userAgent":""}"#),
            Err(ConfigError::MissingUserAgent)
        ));
        assert!(matches!(
            BypassConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn flaresolverr_urls_are_normalized() {
        let config = FlareSolverrConfig::default();
        assert_eq!(config.api_url().unwrap().as_str(), "http://127.0.0.1:8191/v1");
        assert_eq!(config.health_url().unwrap().as_str(), "http://127.0.0.1:8191/");

        let bare = FlareSolverrConfig::new("http://solver.internal:8191/");
        assert_eq!(bare.api_url().unwrap().as_str(), "http://solver.internal:8191/v1");

        assert!(FlareSolverrConfig::new("not a url").api_url().is_err());
    }
}
