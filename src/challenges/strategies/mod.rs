//! Bypass strategy registry.
//!
//! Each submodule implements [`BypassStrategy`] for one way of obtaining a
//! clearance credential. The manager runs them in order and stops at the
//! first success.

pub mod cookie_replay;
pub mod flaresolverr;

pub use cookie_replay::CookieReplayStrategy;
pub use flaresolverr::FlareSolverrStrategy;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::challenges::core::{Challenge, ClearanceCookie};
use crate::config::BypassConfig;

/// Outcome of a bypass attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassResult {
    /// A new credential was obtained.
    Success(ClearanceCookie),
    /// A previously stored credential is still usable.
    CachedCookie(ClearanceCookie),
    Failed {
        message: String,
        can_retry: bool,
        retry_after: Option<Duration>,
    },
    /// The origin served the page without a challenge.
    NotNeeded,
}

impl BypassResult {
    pub fn failed(message: impl Into<String>, can_retry: bool) -> Self {
        BypassResult::Failed {
            message: message.into(),
            can_retry,
            retry_after: None,
        }
    }

    /// Attach a back-off hint. No-op on non-failure results.
    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        if let BypassResult::Failed { retry_after, .. } = &mut self {
            *retry_after = Some(wait);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, BypassResult::Failed { .. })
    }

    pub fn extract_cookie(&self) -> Option<&ClearanceCookie> {
        match self {
            BypassResult::Success(cookie) | BypassResult::CachedCookie(cookie) => Some(cookie),
            _ => None,
        }
    }

    pub fn into_cookie(self) -> Option<ClearanceCookie> {
        match self {
            BypassResult::Success(cookie) | BypassResult::CachedCookie(cookie) => Some(cookie),
            _ => None,
        }
    }

    pub fn extract_error_message(&self) -> Option<&str> {
        match self {
            BypassResult::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether re-invoking the bypass later is meaningful. Successes report `false`.
    pub fn can_retry(&self) -> bool {
        matches!(self, BypassResult::Failed { can_retry: true, .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BypassResult::Failed { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BypassResult::Success(_) => "success",
            BypassResult::CachedCookie(_) => "cached_cookie",
            BypassResult::Failed { .. } => "failed",
            BypassResult::NotNeeded => "not_needed",
        }
    }
}

/// Unexpected faults raised by a strategy.
///
/// Ordinary failures are reported as [`BypassResult::Failed`]; an `Err` is
/// reserved for faults the strategy could not turn into a result. The manager
/// converts either kind into a retryable failure.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("strategy timed out after {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("{0}")]
    Other(String),
}

/// Pluggable way of obtaining a clearance credential.
///
/// Implementations own their timeouts (see [`BypassConfig::timeout`]) and must
/// not hold shared locks across an `.await`.
#[async_trait]
pub trait BypassStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the strategy has any chance against `challenge`.
    fn can_handle(&self, _challenge: &Challenge) -> bool {
        true
    }

    async fn bypass(
        &self,
        url: &str,
        challenge: &Challenge,
        config: &BypassConfig,
    ) -> Result<BypassResult, StrategyError>;
}
