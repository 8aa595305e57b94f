//! Clearance credential issued by a protected origin once a challenge is solved.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use http::header::{COOKIE, InvalidHeaderValue, USER_AGENT};
use http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::analysis::normalize_domain;

/// Name of the primary clearance cookie set by Cloudflare.
pub const CF_CLEARANCE_COOKIE: &str = "cf_clearance";
/// Name of the bot-management cookie that usually accompanies the clearance.
pub const CF_BM_COOKIE: &str = "__cf_bm";

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_millis(duration: Duration) -> i64 {
    duration.as_millis().min(i64::MAX as u128) as i64
}

/// Immutable clearance record bound to a domain and a user agent.
///
/// Validity is derived from the token and the expiry on every call and is
/// never stored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceCookie {
    clearance_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auxiliary_token: Option<String>,
    user_agent: String,
    issued_at_ms: i64,
    expires_at_ms: i64,
    domain: String,
}

impl ClearanceCookie {
    /// Create a cookie issued now and expiring after `ttl`.
    pub fn new(
        clearance_token: impl Into<String>,
        user_agent: impl Into<String>,
        domain: &str,
        ttl: Duration,
    ) -> Self {
        let issued_at_ms = now_millis();
        Self {
            clearance_token: clearance_token.into(),
            auxiliary_token: None,
            user_agent: user_agent.into(),
            issued_at_ms,
            expires_at_ms: issued_at_ms.saturating_add(duration_millis(ttl)),
            domain: normalize_domain(domain),
        }
    }

    /// Build a cookie from explicit timestamps, e.g. when restoring from storage.
    pub fn from_parts(
        clearance_token: impl Into<String>,
        auxiliary_token: Option<String>,
        user_agent: impl Into<String>,
        issued_at_ms: i64,
        expires_at_ms: i64,
        domain: &str,
    ) -> Self {
        Self {
            clearance_token: clearance_token.into(),
            auxiliary_token,
            user_agent: user_agent.into(),
            issued_at_ms,
            expires_at_ms,
            domain: normalize_domain(domain),
        }
    }

    pub fn with_auxiliary_token(mut self, token: impl Into<String>) -> Self {
        self.auxiliary_token = Some(token.into());
        self
    }

    pub fn clearance_token(&self) -> &str {
        &self.clearance_token
    }

    pub fn auxiliary_token(&self) -> Option<&str> {
        self.auxiliary_token.as_deref()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn issued_at_ms(&self) -> i64 {
        self.issued_at_ms
    }

    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at_ms
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// A cookie is valid iff its token is non-empty and it has not expired.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_millis())
    }

    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        !self.clearance_token.is_empty() && now_ms < self.expires_at_ms
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Time left before expiry, `None` once expired.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        let remaining = self.expires_at_ms.saturating_sub(now_millis());
        (remaining > 0).then(|| Duration::from_millis(remaining as u64))
    }

    /// `Cookie` header value carrying the clearance (and auxiliary) token.
    pub fn cookie_header(&self) -> String {
        let mut header = format!("{CF_CLEARANCE_COOKIE}={}", self.clearance_token);
        if let Some(aux) = self.auxiliary_token.as_deref().filter(|aux| !aux.is_empty()) {
            header.push_str("; ");
            header.push_str(CF_BM_COOKIE);
            header.push('=');
            header.push_str(aux);
        }
        header
    }

    /// Attach the credential to an outgoing request.
    ///
    /// Existing cookies are preserved; the user agent is replaced because
    /// the origin only honours the token under the agent it was issued to.
    pub fn apply_to_headers(&self, headers: &mut HeaderMap) -> Result<(), InvalidHeaderValue> {
        let clearance = self.cookie_header();
        let cookie = match headers.get(COOKIE).and_then(|value| value.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => {
                let kept: Vec<&str> = existing
                    .split(';')
                    .map(str::trim)
                    .filter(|pair| {
                        let name = pair.split('=').next().unwrap_or_default().trim();
                        !pair.is_empty() && name != CF_CLEARANCE_COOKIE && name != CF_BM_COOKIE
                    })
                    .collect();
                if kept.is_empty() {
                    clearance
                } else {
                    format!("{}; {}", kept.join("; "), clearance)
                }
            }
            _ => clearance,
        };

        headers.insert(COOKIE, HeaderValue::from_str(&cookie)?);
        headers.insert(USER_AGENT, HeaderValue::from_str(&self.user_agent)?);
        Ok(())
    }
}

impl fmt::Debug for ClearanceCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClearanceCookie")
            .field("clearance_token", &redact(&self.clearance_token))
            .field(
                "auxiliary_token",
                &self.auxiliary_token.as_deref().map(redact),
            )
            .field("user_agent", &self.user_agent)
            .field("issued_at_ms", &self.issued_at_ms)
            .field("expires_at_ms", &self.expires_at_ms)
            .field("domain", &self.domain)
            .finish()
    }
}

fn redact(token: &str) -> &'static str {
    if token.is_empty() { "<empty>" } else { "<redacted>" }
}
