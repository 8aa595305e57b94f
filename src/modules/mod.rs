//! Cross-cutting services module
//!
//! Credential storage plus the event and metrics plumbing the bypass manager
//! reports through.

pub mod events;
pub mod metrics;
pub mod state;

// Re-export commonly used types
pub use events::{
    BypassEvent, CacheHitEvent, EventDispatcher, EventHandler, ExhaustedEvent, LoggingHandler,
    MetricsHandler, StrategyAttemptEvent, StrategyFailedEvent, StrategySucceededEvent,
};
pub use metrics::{DomainStats, GlobalStats, MetricsCollector, MetricsSnapshot, StrategyStats};
pub use state::{CookieStore, InMemoryCookieStore};
