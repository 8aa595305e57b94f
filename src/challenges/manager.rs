//! Bypass orchestration.
//!
//! [`BypassManager`] is the single entry point callers use once a response has
//! been classified. It serves still-valid credentials from the
//! [`CookieStore`], otherwise runs the configured strategies in order and
//! writes any newly obtained credential back to the store.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;

use crate::challenges::core::{Challenge, ChallengeResponse, normalize_domain};
use crate::challenges::detectors::ChallengeClassifier;
use crate::challenges::strategies::{BypassResult, BypassStrategy};
use crate::config::{BypassConfig, ConfigError};
use crate::modules::events::{
    BypassEvent, CacheHitEvent, EventDispatcher, EventHandler, ExhaustedEvent, LoggingHandler,
    MetricsHandler, StrategyAttemptEvent, StrategyFailedEvent, StrategySucceededEvent,
};
use crate::modules::metrics::MetricsCollector;
use crate::modules::state::CookieStore;

pub const NO_STRATEGY_AVAILABLE: &str = "no strategy available";

/// Misconfiguration detected before any strategy runs.
#[derive(Debug, Error)]
pub enum BypassError {
    #[error("invalid bypass configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("cannot derive a domain from url: {0:?}")]
    InvalidUrl(String),
}

/// Orchestrates cache lookup, the strategy chain, and persistence.
///
/// Holds no mutable state of its own; share it behind an `Arc` across tasks.
pub struct BypassManager {
    store: Arc<dyn CookieStore>,
    strategies: Vec<Arc<dyn BypassStrategy>>,
    classifier: ChallengeClassifier,
    events: EventDispatcher,
}

impl BypassManager {
    /// Manager with the default logging handler.
    pub fn new(store: Arc<dyn CookieStore>, strategies: Vec<Arc<dyn BypassStrategy>>) -> Self {
        let mut builder = Self::builder(store);
        builder.strategies = strategies;
        builder.build()
    }

    pub fn builder(store: Arc<dyn CookieStore>) -> BypassManagerBuilder {
        BypassManagerBuilder {
            store,
            strategies: Vec::new(),
            handlers: Vec::new(),
            logging: true,
        }
    }

    pub fn store(&self) -> &Arc<dyn CookieStore> {
        &self.store
    }

    /// Strategy names in execution order.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Obtain a usable clearance credential for `url`.
    ///
    /// Expected failures come back as [`BypassResult::Failed`]; `Err` is
    /// reserved for unusable input.
    pub async fn bypass_challenge(
        &self,
        url: &str,
        challenge: &Challenge,
        config: &BypassConfig,
    ) -> Result<BypassResult, BypassError> {
        config.validate()?;
        let domain = normalize_domain(url);
        if domain.is_empty() {
            return Err(BypassError::InvalidUrl(url.to_string()));
        }

        if let Some(cookie) = self.store.get_clearance_cookie(&domain) {
            if cookie.user_agent() == config.user_agent {
                self.events.dispatch(BypassEvent::CacheHit(CacheHitEvent {
                    domain,
                    timestamp: Utc::now(),
                }));
                return Ok(BypassResult::CachedCookie(cookie));
            }
        }

        if self.strategies.is_empty() {
            let failure = BypassResult::failed(NO_STRATEGY_AVAILABLE, false);
            return Ok(self.exhausted(domain, challenge, 0, failure));
        }

        let mut attempts = 0;
        let mut last_failure = None;

        for strategy in &self.strategies {
            if !strategy.can_handle(challenge) {
                log::debug!("{} skipped for {}", strategy.name(), challenge);
                continue;
            }
            attempts += 1;

            self.events.dispatch(BypassEvent::StrategyAttempt(StrategyAttemptEvent {
                domain: domain.clone(),
                strategy: strategy.name().to_string(),
                challenge: challenge.kind().to_string(),
                timestamp: Utc::now(),
            }));

            let started = Instant::now();
            let result = match strategy.bypass(url, challenge, config).await {
                Ok(result) => result,
                Err(err) => BypassResult::failed(err.to_string(), true),
            };
            let latency = started.elapsed();

            match result {
                BypassResult::Failed {
                    ref message,
                    can_retry,
                    ..
                } => {
                    self.events.dispatch(BypassEvent::StrategyFailed(StrategyFailedEvent {
                        domain: domain.clone(),
                        strategy: strategy.name().to_string(),
                        message: message.clone(),
                        can_retry,
                        latency,
                        timestamp: Utc::now(),
                    }));
                    last_failure = Some(result);
                }
                success => {
                    if let BypassResult::Success(cookie) = &success {
                        self.store.save_clearance_cookie(&domain, cookie.clone());
                    }
                    self.events.dispatch(BypassEvent::StrategySucceeded(StrategySucceededEvent {
                        domain,
                        strategy: strategy.name().to_string(),
                        outcome: success.kind(),
                        latency,
                        timestamp: Utc::now(),
                    }));
                    return Ok(success);
                }
            }
        }

        let failure = last_failure.unwrap_or_else(|| {
            BypassResult::failed(format!("{NO_STRATEGY_AVAILABLE} for {challenge}"), false)
        });
        Ok(self.exhausted(domain, challenge, attempts, failure))
    }

    /// Classify `response` and bypass whatever it turned out to be.
    pub async fn bypass_response(
        &self,
        url: &str,
        response: &ChallengeResponse<'_>,
        config: &BypassConfig,
    ) -> Result<(Challenge, BypassResult), BypassError> {
        let challenge = self.classifier.classify_response(response);
        let result = self.bypass_challenge(url, &challenge, config).await?;
        Ok((challenge, result))
    }

    /// Report a terminal failure. A rate-limit cool-down is only suggested
    /// when retrying can help.
    fn exhausted(
        &self,
        domain: String,
        challenge: &Challenge,
        attempts: usize,
        failure: BypassResult,
    ) -> BypassResult {
        let failure = match challenge.retry_after() {
            Some(wait) if failure.can_retry() && failure.retry_after().is_none() => {
                failure.with_retry_after(wait)
            }
            _ => failure,
        };
        self.events.dispatch(BypassEvent::Exhausted(ExhaustedEvent {
            domain,
            challenge: challenge.kind().to_string(),
            attempts,
            message: failure.extract_error_message().unwrap_or_default().to_string(),
            timestamp: Utc::now(),
        }));
        failure
    }
}

impl fmt::Debug for BypassManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BypassManager")
            .field("strategies", &self.strategy_names())
            .field("handlers", &self.events.handler_count())
            .finish()
    }
}

/// Builder for [`BypassManager`].
pub struct BypassManagerBuilder {
    store: Arc<dyn CookieStore>,
    strategies: Vec<Arc<dyn BypassStrategy>>,
    handlers: Vec<Arc<dyn EventHandler>>,
    logging: bool,
}

impl BypassManagerBuilder {
    /// Append a strategy; strategies run in insertion order.
    pub fn with_strategy(mut self, strategy: Arc<dyn BypassStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_metrics(self, metrics: MetricsCollector) -> Self {
        self.with_event_handler(Arc::new(MetricsHandler::new(metrics)))
    }

    /// Drop the default [`LoggingHandler`].
    pub fn without_logging(mut self) -> Self {
        self.logging = false;
        self
    }

    pub fn build(self) -> BypassManager {
        let mut events = EventDispatcher::new();
        if self.logging {
            events.register_handler(Arc::new(LoggingHandler));
        }
        for handler in self.handlers {
            events.register_handler(handler);
        }

        BypassManager {
            store: self.store,
            strategies: self.strategies,
            classifier: ChallengeClassifier::new(),
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::{ClearanceCookie, now_millis};
    use crate::challenges::strategies::{CookieReplayStrategy, StrategyError};
    use crate::modules::state::InMemoryCookieStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted strategy that records the order it ran in.
    struct Scripted {
        name: &'static str,
        result: Result<BypassResult, &'static str>,
        handles: fn(&Challenge) -> bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Scripted {
        fn new(
            name: &'static str,
            result: Result<BypassResult, &'static str>,
            log: &Arc<Mutex<Vec<&'static str>>>,
        ) -> Arc<dyn BypassStrategy> {
            Arc::new(Self {
                name,
                result,
                handles: |_| true,
                log: log.clone(),
            })
        }
    }

    #[async_trait]
    impl BypassStrategy for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn can_handle(&self, challenge: &Challenge) -> bool {
            (self.handles)(challenge)
        }

        async fn bypass(
            &self,
            _url: &str,
            _challenge: &Challenge,
            _config: &BypassConfig,
        ) -> Result<BypassResult, StrategyError> {
            self.log.lock().unwrap().push(self.name);
            self.result
                .clone()
                .map_err(|message| StrategyError::Other(message.to_string()))
        }
    }

    fn cookie(user_agent: &str) -> ClearanceCookie {
        ClearanceCookie::from_parts(
            "tok",
            None,
            user_agent,
            now_millis(),
            now_millis() + 3_600_000,
            "example.com",
        )
    }

    fn store() -> Arc<InMemoryCookieStore> {
        Arc::new(InMemoryCookieStore::new())
    }

    #[tokio::test]
    async fn strategies_run_in_order_until_first_success() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = store();
        let manager = BypassManager::new(
            store.clone(),
            vec![
                Scripted::new("first", Ok(BypassResult::failed("nope", true)), &log),
                Scripted::new("second", Ok(BypassResult::Success(cookie("UA"))), &log),
                Scripted::new("third", Ok(BypassResult::failed("unused", true)), &log),
            ],
        );

        let result = manager
            .bypass_challenge(
                "https://www.example.com/a",
                &Challenge::js(None),
                &BypassConfig::new("UA"),
            )
            .await
            .unwrap();

        assert!(matches!(result, BypassResult::Success(_)));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert!(store.get_clearance_cookie("example.com").is_some());
    }

    #[tokio::test]
    async fn last_failure_wins_and_errors_become_retryable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = BypassManager::new(
            store(),
            vec![
                Scripted::new("first", Ok(BypassResult::failed("structural", false)), &log),
                Scripted::new("second", Err("solver crashed"), &log),
            ],
        );

        let result = manager
            .bypass_challenge("example.com", &Challenge::js(None), &BypassConfig::new("UA"))
            .await
            .unwrap();

        assert_eq!(result, BypassResult::failed("solver crashed", true));
    }

    #[tokio::test]
    async fn incapable_strategies_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let picky: Arc<dyn BypassStrategy> = Arc::new(Scripted {
            name: "js_only",
            result: Ok(BypassResult::Success(cookie("UA"))),
            handles: |challenge| matches!(challenge, Challenge::JsChallenge { .. }),
            log: log.clone(),
        });
        let manager = BypassManager::new(store(), vec![picky]);

        let result = manager
            .bypass_challenge("example.com", &Challenge::blocked(None), &BypassConfig::new("UA"))
            .await
            .unwrap();

        assert_eq!(
            result,
            BypassResult::failed("no strategy available for blocked_ip", false)
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_hint_is_attached_to_final_failure() {
        let replay: Arc<dyn BypassStrategy> = Arc::new(CookieReplayStrategy::new(store()));
        let manager = BypassManager::new(store(), vec![replay]);

        let result = manager
            .bypass_challenge(
                "example.com",
                &Challenge::rate_limited(30, None),
                &BypassConfig::new("UA"),
            )
            .await
            .unwrap();

        assert!(result.can_retry());
        assert_eq!(result.retry_after(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn structural_rate_limit_failures_carry_no_hint() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let js_only: Arc<dyn BypassStrategy> = Arc::new(Scripted {
            name: "js_only",
            result: Ok(BypassResult::Success(cookie("UA"))),
            handles: |challenge| matches!(challenge, Challenge::JsChallenge { .. }),
            log: log.clone(),
        });
        let config = BypassConfig::new("UA");
        let limited = Challenge::rate_limited(30, None);

        let incapable = BypassManager::new(store(), vec![js_only])
            .bypass_challenge("example.com", &limited, &config)
            .await
            .unwrap();
        assert!(!incapable.can_retry());
        assert_eq!(incapable.retry_after(), None);

        let empty = BypassManager::new(store(), Vec::new())
            .bypass_challenge("example.com", &limited, &config)
            .await
            .unwrap();
        assert!(!empty.can_retry());
        assert_eq!(empty.retry_after(), None);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn own_retry_hint_is_not_overridden() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = Scripted::new(
            "hinted",
            Ok(BypassResult::failed("busy", true).with_retry_after(Duration::from_secs(5))),
            &log,
        );
        let result = BypassManager::new(store(), vec![failing])
            .bypass_challenge(
                "example.com",
                &Challenge::rate_limited(30, None),
                &BypassConfig::new("UA"),
            )
            .await
            .unwrap();
        assert_eq!(result.retry_after(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn not_needed_is_terminal_and_not_persisted() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = store();
        let manager = BypassManager::new(
            store.clone(),
            vec![
                Scripted::new("probe", Ok(BypassResult::NotNeeded), &log),
                Scripted::new("after", Ok(BypassResult::Success(cookie("UA"))), &log),
            ],
        );

        let result = manager
            .bypass_challenge("example.com", &Challenge::None, &BypassConfig::new("UA"))
            .await
            .unwrap();

        assert_eq!(result, BypassResult::NotNeeded);
        assert_eq!(*log.lock().unwrap(), vec!["probe"]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn mismatched_cached_agent_falls_through_to_strategies() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = store();
        store.save_clearance_cookie("example.com", cookie("old UA"));
        let manager = BypassManager::new(
            store.clone(),
            vec![Scripted::new("fresh", Ok(BypassResult::Success(cookie("UA"))), &log)],
        );

        let result = manager
            .bypass_challenge("example.com", &Challenge::js(None), &BypassConfig::new("UA"))
            .await
            .unwrap();

        assert!(matches!(result, BypassResult::Success(_)));
        let stored = store.get_clearance_cookie("example.com").unwrap();
        assert_eq!(stored.user_agent(), "UA");
    }

    #[tokio::test]
    async fn rejects_invalid_input() {
        let manager = BypassManager::new(store(), Vec::new());

        let err = manager
            .bypass_challenge("example.com", &Challenge::None, &BypassConfig::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, BypassError::InvalidConfig(ConfigError::MissingUserAgent)));

        let err = manager
            .bypass_challenge("   ", &Challenge::None, &BypassConfig::new("UA"))
            .await
            .unwrap_err();
        assert!(matches!(err, BypassError::InvalidUrl(_)));
    }

    struct Hanging {
        started: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BypassStrategy for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn bypass(
            &self,
            _url: &str,
            _challenge: &Challenge,
            _config: &BypassConfig,
        ) -> Result<BypassResult, StrategyError> {
            let _flag = DropFlag(self.dropped.clone());
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(BypassResult::NotNeeded)
        }
    }

    #[tokio::test]
    async fn cancelling_the_caller_cancels_the_running_strategy() {
        let started = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let hanging: Arc<dyn BypassStrategy> = Arc::new(Hanging {
            started: started.clone(),
            dropped: dropped.clone(),
        });
        let manager = BypassManager::new(store(), vec![hanging]);

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            manager.bypass_challenge("example.com", &Challenge::js(None), &BypassConfig::new("UA")),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn metrics_follow_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let metrics = MetricsCollector::new();
        let manager = BypassManager::builder(store())
            .with_strategy(Scripted::new("a", Ok(BypassResult::failed("x", true)), &log))
            .with_strategy(Scripted::new("b", Ok(BypassResult::Success(cookie("UA"))), &log))
            .with_metrics(metrics.clone())
            .build();

        let config = BypassConfig::new("UA");
        manager
            .bypass_challenge("example.com", &Challenge::js(None), &config)
            .await
            .unwrap();
        let cached = manager
            .bypass_challenge("example.com", &Challenge::None, &config)
            .await
            .unwrap();
        assert!(matches!(cached, BypassResult::CachedCookie(_)));

        let snapshot = metrics.snapshot();
        let domain = snapshot.domain("example.com").unwrap();
        assert_eq!(domain.attempts, 2);
        assert_eq!(domain.failures, 1);
        assert_eq!(domain.successes, 1);
        assert_eq!(domain.cache_hits, 1);
        assert_eq!(manager.strategy_names(), vec!["a", "b"]);
    }
}
