//! FlareSolverr relay client.
//!
//! FlareSolverr runs a real browser behind a small JSON API
//! (`docker run -d -p 8191:8191 ghcr.io/flaresolverr/flaresolverr:latest`).
//! This adapter speaks that API; it does not solve anything itself.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, FlareSolverrConfig};

/// How long an availability probe result is trusted.
const AVAILABILITY_CACHE: Duration = Duration::from_secs(5);
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum FlareSolverrError {
    #[error("flaresolverr http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("flaresolverr configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to decode flaresolverr response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("flaresolverr api error: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlareSolverrRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    max_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlareSolverrResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub solution: Option<FlareSolverrSolution>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlareSolverrSolution {
    pub url: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub cookies: Vec<FlareSolverrCookie>,
    #[serde(default)]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlareSolverrCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    /// Epoch seconds; `-1` or absent for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
}

impl FlareSolverrCookie {
    /// Expiry in epoch milliseconds, `None` for session cookies.
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.expires
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| (secs * 1000.0) as i64)
    }
}

impl FlareSolverrSolution {
    pub fn cookie(&self, name: &str) -> Option<&FlareSolverrCookie> {
        self.cookies.iter().find(|cookie| cookie.name == name)
    }
}

/// Thin client over the FlareSolverr v1 API.
pub struct FlareSolverrClient {
    client: Client,
    config: FlareSolverrConfig,
    availability: Mutex<Option<(bool, Instant)>>,
}

impl FlareSolverrClient {
    pub fn new(config: FlareSolverrConfig) -> Result<Self, FlareSolverrError> {
        config.api_url()?;
        let client = Client::builder().build()?;
        Ok(Self::from_client(client, config))
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(client: Client, config: FlareSolverrConfig) -> Self {
        Self {
            client,
            config,
            availability: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &FlareSolverrConfig {
        &self.config
    }

    /// Whether the service answers its health endpoint. Results are cached
    /// briefly so a strategy chain does not probe on every call.
    pub async fn is_available(&self) -> bool {
        if let Some(cached) = self.cached_availability() {
            return cached;
        }

        let available = match self.config.health_url() {
            Ok(url) => match self
                .client
                .get(url)
                .timeout(HEALTH_CHECK_TIMEOUT)
                .send()
                .await
            {
                Ok(response) => response.status().is_success(),
                Err(err) => {
                    log::debug!("flaresolverr health check failed: {err}");
                    false
                }
            },
            Err(err) => {
                log::warn!("flaresolverr misconfigured: {err}");
                false
            }
        };

        if let Ok(mut guard) = self.availability.lock() {
            *guard = Some((available, Instant::now()));
        }
        available
    }

    /// Forget the cached availability probe.
    pub fn invalidate_availability(&self) {
        if let Ok(mut guard) = self.availability.lock() {
            *guard = None;
        }
    }

    fn cached_availability(&self) -> Option<bool> {
        let guard = self.availability.lock().ok()?;
        (*guard)
            .filter(|(_, checked_at)| checked_at.elapsed() < AVAILABILITY_CACHE)
            .map(|(available, _)| available)
    }

    /// Ask FlareSolverr to load `url` with a real browser.
    pub async fn request_get(
        &self,
        url: &str,
        max_timeout: Duration,
    ) -> Result<FlareSolverrResponse, FlareSolverrError> {
        let api_url = self.config.api_url()?;
        let max_timeout_ms = self
            .config
            .max_timeout_ms
            .min(max_timeout.as_millis().min(u64::MAX as u128) as u64);
        let payload = FlareSolverrRequest {
            cmd: "request.get",
            url,
            max_timeout: max_timeout_ms,
        };

        log::debug!("flaresolverr request.get {} via {}", url, api_url);
        let result = self.client.post(api_url).json(&payload).send().await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                self.invalidate_availability();
                return Err(err.into());
            }
        };

        let text = response.text().await?;
        parse_response(&text)
    }
}

/// Decode a FlareSolverr API body.
pub fn parse_response(text: &str) -> Result<FlareSolverrResponse, FlareSolverrError> {
    // A bare-port endpoint hits the web root, which answers 405 in a
    // different envelope.
    if text.contains("\"error\"") && text.contains("405") {
        return Err(FlareSolverrError::Api(
            "method not allowed, the endpoint must end with /v1".into(),
        ));
    }
    Ok(serde_json::from_str(text)?)
}
