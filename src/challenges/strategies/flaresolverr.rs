//! Strategy that delegates the page load to a FlareSolverr relay.
//!
//! The relay drives a real browser, so this is the expensive end of the
//! chain. Only JavaScript challenges (and preemptive probes) are attempted;
//! CAPTCHAs, IP blocks and rate limits are left alone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::challenges::core::{
    CF_BM_COOKIE, CF_CLEARANCE_COOKIE, Challenge, ClearanceCookie, normalize_domain, now_millis,
};
use crate::config::BypassConfig;
use crate::external_deps::flaresolverr::{
    FlareSolverrClient, FlareSolverrError, FlareSolverrResponse,
};

use super::{BypassResult, BypassStrategy, StrategyError};

/// Lifetime assumed for session clearance cookies.
const DEFAULT_CLEARANCE_TTL: Duration = Duration::from_secs(30 * 60);
const TIMEOUT_RETRY_AFTER: Duration = Duration::from_secs(5);

pub struct FlareSolverrStrategy {
    client: Arc<FlareSolverrClient>,
    default_ttl: Duration,
}

impl FlareSolverrStrategy {
    pub fn new(client: Arc<FlareSolverrClient>) -> Self {
        Self {
            client,
            default_ttl: DEFAULT_CLEARANCE_TTL,
        }
    }

    /// Override the lifetime given to clearance cookies without an expiry.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

#[async_trait]
impl BypassStrategy for FlareSolverrStrategy {
    fn name(&self) -> &str {
        "flaresolverr"
    }

    fn can_handle(&self, challenge: &Challenge) -> bool {
        matches!(challenge, Challenge::None | Challenge::JsChallenge { .. })
    }

    async fn bypass(
        &self,
        url: &str,
        _challenge: &Challenge,
        config: &BypassConfig,
    ) -> Result<BypassResult, StrategyError> {
        if !self.client.is_available().await {
            return Ok(BypassResult::failed(
                format!(
                    "FlareSolverr service is not reachable at {}",
                    self.client.config().endpoint
                ),
                true,
            ));
        }

        let budget = config.timeout();
        let response = match timeout(budget, self.client.request_get(url, budget)).await {
            Err(_) => {
                return Ok(BypassResult::failed(
                    format!("FlareSolverr timeout: no answer within {budget:?}"),
                    true,
                )
                .with_retry_after(TIMEOUT_RETRY_AFTER));
            }
            Ok(Err(FlareSolverrError::Http(err))) => {
                return Err(StrategyError::Transport(err.to_string()));
            }
            Ok(Err(FlareSolverrError::Api(message))) => {
                return Ok(BypassResult::failed(
                    format!("FlareSolverr API error: {message}"),
                    false,
                ));
            }
            Ok(Err(err)) => return Err(StrategyError::Protocol(err.to_string())),
            Ok(Ok(response)) => response,
        };

        Ok(interpret_response(url, response, config, self.default_ttl))
    }
}

/// Translate a FlareSolverr answer into a bypass result.
pub fn interpret_response(
    url: &str,
    response: FlareSolverrResponse,
    config: &BypassConfig,
    default_ttl: Duration,
) -> BypassResult {
    let message = response.message.to_lowercase();

    if response.status == "ok" {
        if let Some(solution) = response.solution {
            let Some(clearance) = solution.cookie(CF_CLEARANCE_COOKIE) else {
                log::debug!("flaresolverr loaded {} without a clearance cookie", url);
                return BypassResult::NotNeeded;
            };

            let now = now_millis();
            let expires_at_ms = clearance.expires_at_ms().unwrap_or_else(|| {
                now.saturating_add(default_ttl.as_millis().min(i64::MAX as u128) as i64)
            });
            let user_agent = if solution.user_agent.is_empty() {
                config.user_agent.clone()
            } else {
                solution.user_agent.clone()
            };
            let auxiliary = solution
                .cookie(CF_BM_COOKIE)
                .map(|cookie| cookie.value.clone());

            let cookie = ClearanceCookie::from_parts(
                clearance.value.clone(),
                auxiliary,
                user_agent,
                now,
                expires_at_ms,
                &normalize_domain(url),
            );
            return BypassResult::Success(cookie);
        }
    }

    if message.contains("timeout") {
        return BypassResult::failed(format!("FlareSolverr timeout: {}", response.message), true)
            .with_retry_after(TIMEOUT_RETRY_AFTER);
    }

    if message.contains("captcha") || message.contains("challenge") {
        return BypassResult::failed(
            format!("manual verification required: {}", response.message),
            false,
        );
    }

    let reason = if response.message.is_empty() {
        format!(
            "FlareSolverr returned status '{}' without a solution",
            response.status
        )
    } else {
        format!("FlareSolverr error: {}", response.message)
    };
    BypassResult::failed(reason, true)
}
