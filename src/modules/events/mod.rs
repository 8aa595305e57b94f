//! Event system for bypass orchestration.
//!
//! Provides hooks for metrics, logging, and custom reactions around strategy
//! activity.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::metrics::MetricsCollector;

/// A stored cookie satisfied the request without running any strategy.
#[derive(Debug, Clone)]
pub struct CacheHitEvent {
    pub domain: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StrategyAttemptEvent {
    pub domain: String,
    pub strategy: String,
    pub challenge: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StrategySucceededEvent {
    pub domain: String,
    pub strategy: String,
    /// `BypassResult::kind` of the returned result.
    pub outcome: &'static str,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StrategyFailedEvent {
    pub domain: String,
    pub strategy: String,
    pub message: String,
    pub can_retry: bool,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Every capable strategy failed, or none could run.
#[derive(Debug, Clone)]
pub struct ExhaustedEvent {
    pub domain: String,
    pub challenge: String,
    pub attempts: usize,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum BypassEvent {
    CacheHit(CacheHitEvent),
    StrategyAttempt(StrategyAttemptEvent),
    StrategySucceeded(StrategySucceededEvent),
    StrategyFailed(StrategyFailedEvent),
    Exhausted(ExhaustedEvent),
}

impl BypassEvent {
    pub fn domain(&self) -> &str {
        match self {
            BypassEvent::CacheHit(event) => &event.domain,
            BypassEvent::StrategyAttempt(event) => &event.domain,
            BypassEvent::StrategySucceeded(event) => &event.domain,
            BypassEvent::StrategyFailed(event) => &event.domain,
            BypassEvent::Exhausted(event) => &event.domain,
        }
    }
}

/// Trait implemented by event handlers.
///
/// Handlers run inline on the bypassing task; keep them cheap.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &BypassEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn dispatch(&self, event: BypassEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &BypassEvent) {
        match event {
            BypassEvent::CacheHit(hit) => {
                log::info!("clearance cache hit for {}", hit.domain);
            }
            BypassEvent::StrategyAttempt(attempt) => {
                log::debug!(
                    "-> {} trying {} against {}",
                    attempt.domain,
                    attempt.strategy,
                    attempt.challenge
                );
            }
            BypassEvent::StrategySucceeded(done) => {
                log::info!(
                    "<- {} {} -> {} ({:.2}s)",
                    done.domain,
                    done.strategy,
                    done.outcome,
                    done.latency.as_secs_f64()
                );
            }
            BypassEvent::StrategyFailed(failed) => {
                log::warn!(
                    "{} {} failed (retry={}): {}",
                    failed.domain,
                    failed.strategy,
                    failed.can_retry,
                    failed.message
                );
            }
            BypassEvent::Exhausted(exhausted) => {
                log::warn!(
                    "bypass exhausted for {} ({}) after {} attempt(s): {}",
                    exhausted.domain,
                    exhausted.challenge,
                    exhausted.attempts,
                    exhausted.message
                );
            }
        }
    }
}

/// Metrics handler that feeds the metrics collector.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &BypassEvent) {
        match event {
            BypassEvent::CacheHit(hit) => self.metrics.record_cache_hit(&hit.domain),
            BypassEvent::StrategyAttempt(attempt) => {
                self.metrics.record_attempt(&attempt.domain, &attempt.strategy)
            }
            BypassEvent::StrategySucceeded(done) => {
                self.metrics
                    .record_success(&done.domain, &done.strategy, done.latency)
            }
            BypassEvent::StrategyFailed(failed) => {
                self.metrics
                    .record_failure(&failed.domain, &failed.strategy, failed.latency)
            }
            BypassEvent::Exhausted(_) => {}
        }
    }
}
