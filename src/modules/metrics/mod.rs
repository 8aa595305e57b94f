//! Metrics collection utilities.
//!
//! Aggregates global and per-domain bypass statistics, plus per-strategy
//! latency percentiles.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const DEFAULT_WINDOW: usize = 128;

/// Aggregated metrics across all domains.
#[derive(Debug, Clone)]
pub struct GlobalStats {
    pub started_at: DateTime<Utc>,
    pub cache_hits: u64,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

impl Default for GlobalStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            cache_hits: 0,
            attempts: 0,
            successes: 0,
            failures: 0,
        }
    }
}

/// Domain-scoped metrics snapshot.
#[derive(Debug, Clone, Default)]
pub struct DomainStats {
    pub domain: String,
    pub cache_hits: u64,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_strategy: Option<String>,
}

/// Latency profile of one strategy across all domains.
#[derive(Debug, Clone)]
pub struct StrategyStats {
    pub strategy: String,
    pub runs: u64,
    pub average_latency: Option<Duration>,
    pub p95_latency: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub global: GlobalStats,
    pub domains: Vec<DomainStats>,
    pub strategies: Vec<StrategyStats>,
}

impl MetricsSnapshot {
    pub fn domain(&self, domain: &str) -> Option<&DomainStats> {
        self.domains.iter().find(|stats| stats.domain == domain)
    }

    pub fn strategy(&self, strategy: &str) -> Option<&StrategyStats> {
        self.strategies.iter().find(|stats| stats.strategy == strategy)
    }
}

#[derive(Debug)]
struct LatencyWindow {
    runs: u64,
    samples: VecDeque<Duration>,
    max_window: usize,
}

impl LatencyWindow {
    fn new(max_window: usize) -> Self {
        Self {
            runs: 0,
            samples: VecDeque::with_capacity(max_window),
            max_window,
        }
    }

    fn record(&mut self, latency: Duration) {
        self.runs += 1;
        if self.samples.len() == self.max_window {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    fn latency_stats(&self) -> (Option<Duration>, Option<Duration>) {
        if self.samples.is_empty() {
            return (None, None);
        }
        let mut samples: Vec<_> = self.samples.iter().copied().collect();
        samples.sort_unstable();
        let avg = samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / samples.len() as f64;
        let p95_index = ((samples.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
        (Some(Duration::from_secs_f64(avg)), Some(samples[p95_index]))
    }
}

#[derive(Debug)]
struct MetricsState {
    global: GlobalStats,
    max_window: usize,
    domains: HashMap<String, DomainStats>,
    strategies: HashMap<String, LatencyWindow>,
}

impl MetricsState {
    fn new(max_window: usize) -> Self {
        Self {
            global: GlobalStats::default(),
            max_window,
            domains: HashMap::new(),
            strategies: HashMap::new(),
        }
    }

    fn domain_mut(&mut self, domain: &str) -> &mut DomainStats {
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainStats {
                domain: domain.to_string(),
                ..DomainStats::default()
            })
    }

    fn record_latency(&mut self, strategy: &str, latency: Duration) {
        let window = self.max_window;
        self.strategies
            .entry(strategy.to_string())
            .or_insert_with(|| LatencyWindow::new(window))
            .record(latency);
    }
}

/// Thread-safe metrics collector shared with [`super::events::MetricsHandler`].
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Keep at most `window` latency samples per strategy (minimum 16).
    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(window.max(16)))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_cache_hit(&self, domain: &str) {
        let mut guard = self.lock();
        guard.global.cache_hits += 1;
        guard.domain_mut(domain).cache_hits += 1;
    }

    pub fn record_attempt(&self, domain: &str, strategy: &str) {
        let mut guard = self.lock();
        guard.global.attempts += 1;
        let stats = guard.domain_mut(domain);
        stats.attempts += 1;
        stats.last_strategy = Some(strategy.to_string());
    }

    pub fn record_success(&self, domain: &str, strategy: &str, latency: Duration) {
        let mut guard = self.lock();
        guard.global.successes += 1;
        let stats = guard.domain_mut(domain);
        stats.successes += 1;
        stats.consecutive_failures = 0;
        guard.record_latency(strategy, latency);
    }

    pub fn record_failure(&self, domain: &str, strategy: &str, latency: Duration) {
        let mut guard = self.lock();
        guard.global.failures += 1;
        let stats = guard.domain_mut(domain);
        stats.failures += 1;
        stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
        guard.record_latency(strategy, latency);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.lock();
        let domains = guard.domains.values().cloned().collect();
        let strategies = guard
            .strategies
            .iter()
            .map(|(name, window)| {
                let (average_latency, p95_latency) = window.latency_stats();
                StrategyStats {
                    strategy: name.clone(),
                    runs: window.runs,
                    average_latency,
                    p95_latency,
                }
            })
            .collect();
        MetricsSnapshot {
            global: guard.global.clone(),
            domains,
            strategies,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
