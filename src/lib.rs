//! # cf-clearance
//!
//! Cloudflare challenge classification, clearance cookie caching, and a
//! pluggable chain of bypass strategies.
//!
//! The crate does not fetch pages itself. The caller's HTTP layer hands a
//! hostile response to the [`ChallengeClassifier`], passes the resulting
//! [`Challenge`] to a [`BypassManager`], and retries the original request with
//! the returned [`ClearanceCookie`] attached.
//!
//! ## Features
//!
//! - Ordered classification of JavaScript challenges, CAPTCHAs, IP blocks and
//!   rate limits
//! - Domain-keyed, sharded in-memory clearance cookie store
//! - Cookie replay and FlareSolverr strategies behind one async trait
//! - Event hooks for logging and per-domain metrics
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cf_clearance::{
//!     BypassConfig, BypassManager, BypassResult, BypassStrategy, ChallengeClassifier,
//!     CookieReplayStrategy, FlareSolverrClient, FlareSolverrConfig, FlareSolverrStrategy,
//!     InMemoryCookieStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryCookieStore::new());
//!     let client = Arc::new(FlareSolverrClient::new(FlareSolverrConfig::default())?);
//!     let strategies: Vec<Arc<dyn BypassStrategy>> = vec![
//!         Arc::new(CookieReplayStrategy::new(store.clone())),
//!         Arc::new(FlareSolverrStrategy::new(client)),
//!     ];
//!     let manager = BypassManager::new(store, strategies);
//!
//!     let headers = http::HeaderMap::new();
//!     let challenge = ChallengeClassifier::new().classify(
//!         403,
//!         "<title>Just a moment...</title>",
//!         &headers,
//!     );
//!
//!     let config = BypassConfig::default();
//!     let result = manager
//!         .bypass_challenge("https://example.com/", &challenge, &config)
//!         .await?;
//!     if let BypassResult::Success(cookie) | BypassResult::CachedCookie(cookie) = result {
//!         println!("Cookie: {}", cookie.cookie_header());
//!     }
//!     Ok(())
//! }
//! ```

pub mod challenges;
pub mod config;
pub mod external_deps;
pub mod modules;

pub use crate::challenges::core::{
    Challenge,
    ChallengeResponse,
    ClearanceCookie,
    normalize_domain,
};

pub use crate::challenges::detectors::ChallengeClassifier;

pub use crate::challenges::manager::{
    BypassError,
    BypassManager,
    BypassManagerBuilder,
};

pub use crate::challenges::strategies::{
    BypassResult,
    BypassStrategy,
    CookieReplayStrategy,
    FlareSolverrStrategy,
    StrategyError,
};

pub use crate::config::{
    BypassConfig,
    ConfigError,
    FlareSolverrConfig,
};

pub use crate::external_deps::flaresolverr::{
    FlareSolverrClient,
    FlareSolverrError,
};

pub use crate::modules::{
    BypassEvent,
    CookieStore,
    EventDispatcher,
    EventHandler,
    InMemoryCookieStore,
    LoggingHandler,
    MetricsCollector,
    MetricsHandler,
    MetricsSnapshot,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
