//! Strategy that replays a stored clearance cookie.
//!
//! Cheap and local, so it belongs at the front of the strategy chain: it never
//! touches the network and fails fast when the stored token cannot work.

use std::sync::Arc;

use async_trait::async_trait;

use crate::challenges::core::{Challenge, normalize_domain};
use crate::config::BypassConfig;
use crate::modules::state::CookieStore;

use super::{BypassResult, BypassStrategy, StrategyError};

pub const NO_CACHED_COOKIE: &str = "no cached cookie available";
pub const USER_AGENT_MISMATCH: &str = "cached cookie user agent mismatch";

/// Serves a still-valid cookie from the shared store.
pub struct CookieReplayStrategy {
    store: Arc<dyn CookieStore>,
}

impl CookieReplayStrategy {
    pub fn new(store: Arc<dyn CookieStore>) -> Self {
        Self { store }
    }

    /// Synchronous core of [`BypassStrategy::bypass`]; replay never awaits.
    pub fn replay(&self, url: &str, config: &BypassConfig) -> BypassResult {
        let domain = normalize_domain(url);
        let Some(cookie) = self.store.get_clearance_cookie(&domain) else {
            return BypassResult::failed(NO_CACHED_COOKIE, true);
        };

        // Tokens are bound to the agent they were issued to; a mismatched
        // agent is rejected by the origin, so skip the round trip.
        if cookie.user_agent() != config.user_agent {
            log::debug!("cookie replay for {}: user agent mismatch", domain);
            return BypassResult::failed(USER_AGENT_MISMATCH, true);
        }

        BypassResult::CachedCookie(cookie)
    }
}

#[async_trait]
impl BypassStrategy for CookieReplayStrategy {
    fn name(&self) -> &str {
        "cookie_replay"
    }

    async fn bypass(
        &self,
        url: &str,
        _challenge: &Challenge,
        config: &BypassConfig,
    ) -> Result<BypassResult, StrategyError> {
        Ok(self.replay(url, config))
    }
}
