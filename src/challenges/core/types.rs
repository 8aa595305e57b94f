//! Core data structures shared across challenge classification, strategies,
//! and the bypass manager.

use std::fmt;
use std::time::Duration;

use http::HeaderMap;

/// Minimal view of an HTTP response handed over by the transport layer.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeResponse<'a> {
    pub status: u16,
    pub headers: &'a HeaderMap,
    pub body: &'a str,
}

impl<'a> ChallengeResponse<'a> {
    pub fn new(status: u16, headers: &'a HeaderMap, body: &'a str) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

/// Classification of a hostile response.
///
/// Produced once per response by the classifier and consumed by the
/// [`BypassManager`](crate::BypassManager). `None` means no known signal was
/// found, which does not prove the origin is unprotected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Challenge {
    #[default]
    None,
    JsChallenge {
        ray_id: Option<String>,
    },
    CaptchaChallenge {
        site_key: String,
        ray_id: Option<String>,
    },
    BlockedIp {
        ray_id: Option<String>,
    },
    RateLimited {
        retry_after_seconds: u64,
        ray_id: Option<String>,
    },
}

impl Challenge {
    pub fn js(ray_id: Option<String>) -> Self {
        Challenge::JsChallenge { ray_id }
    }

    pub fn captcha(site_key: impl Into<String>, ray_id: Option<String>) -> Self {
        Challenge::CaptchaChallenge {
            site_key: site_key.into(),
            ray_id,
        }
    }

    pub fn blocked(ray_id: Option<String>) -> Self {
        Challenge::BlockedIp { ray_id }
    }

    pub fn rate_limited(retry_after_seconds: u64, ray_id: Option<String>) -> Self {
        Challenge::RateLimited {
            retry_after_seconds,
            ray_id,
        }
    }

    /// Whether an automated strategy can be expected to clear the challenge.
    ///
    /// `None` carries no challenge and reports `false`.
    pub fn is_auto_solvable(&self) -> bool {
        match self {
            Challenge::JsChallenge { .. } | Challenge::RateLimited { .. } => true,
            Challenge::CaptchaChallenge { .. } | Challenge::BlockedIp { .. } => false,
            Challenge::None => false,
        }
    }

    /// Whether a human has to step in. `None` reports `false`.
    pub fn requires_user_interaction(&self) -> bool {
        match self {
            Challenge::CaptchaChallenge { .. } | Challenge::BlockedIp { .. } => true,
            Challenge::JsChallenge { .. } | Challenge::RateLimited { .. } => false,
            Challenge::None => false,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Challenge::None)
    }

    pub fn ray_id(&self) -> Option<&str> {
        match self {
            Challenge::None => None,
            Challenge::JsChallenge { ray_id }
            | Challenge::CaptchaChallenge { ray_id, .. }
            | Challenge::BlockedIp { ray_id }
            | Challenge::RateLimited { ray_id, .. } => ray_id.as_deref(),
        }
    }

    /// Back-off suggested by a rate-limit classification.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Challenge::RateLimited {
                retry_after_seconds,
                ..
            } => Some(Duration::from_secs(*retry_after_seconds)),
            _ => None,
        }
    }

    /// Stable identifier used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Challenge::None => "none",
            Challenge::JsChallenge { .. } => "js_challenge",
            Challenge::CaptchaChallenge { .. } => "captcha_challenge",
            Challenge::BlockedIp { .. } => "blocked_ip",
            Challenge::RateLimited { .. } => "rate_limited",
        }
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())?;
        if let Some(ray_id) = self.ray_id() {
            write!(f, " (ray {ray_id})")?;
        }
        Ok(())
    }
}
