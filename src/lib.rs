//! # GridPulse - Embeddable Telemetry & Alerting Core
//!
//! An in-memory observability core any backend service can embed: a
//! process-wide metric recorder with percentile statistics, a TTL cache
//! family, a rule-driven alert engine with cooldown and severity routing,
//! an error-deduplication tracker that groups recurring failures by
//! fingerprint, and a structured log ring buffer.
//!
//! ## Features
//!
//! - **Sliding-Window Metrics**: bounded per-metric windows with exact
//!   nearest-rank p95/p99, wall-clock timers, and on-demand aggregation
//! - **TTL Caching**: lazy-expiry cache with hit/miss accounting and
//!   key-shaping facades for API responses, query results, and objects
//! - **Error Deduplication**: fingerprint-grouped failure reports with
//!   severity buckets, context merging, and a process panic hook
//! - **Declarative Alerting**: threshold rules as data, per-rule cooldown,
//!   failure-isolated listeners, and severity-routed notification channels
//! - **Log Aggregation**: recent-logs queries served from memory via a
//!   `tracing` layer, no file system involved
//! - **Bounded Everything**: every store is capped and in-memory; state
//!   resets on process restart by design
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridpulse::{TelemetryConfig, TelemetryHub};
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = TelemetryHub::new(TelemetryConfig::default());
//!     let _ticks = hub.start();
//!
//!     // inline with request handling
//!     let timer = hub.metrics().start_timer("http.request_duration_ms");
//!     // ... handle the request ...
//!     timer.stop();
//!
//!     // evaluate alert rules against a fresh snapshot
//!     let snapshot = hub.snapshot();
//!     hub.alerts().evaluate_metrics(&snapshot).await;
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`metrics`] - sliding-window sample recorder and statistics
//! - [`caching`] - generic TTL cache and its keyed facades
//! - [`error_tracking`] - fingerprint-deduplicated failure reports
//! - [`alerting`] - declarative rules, cooldown, and the alert buffer
//! - [`notifications`] - outbound channel seam and severity routing
//! - [`logging`] - structured log ring buffer and `tracing` layer
//! - [`hub`] - component wiring, background ticks, HTTP query surface
//! - [`config`] - capacities, TTLs, and intervals
//! - [`error`] - crate error type

// Core infrastructure
pub mod config;
pub mod error;
pub mod shutdown;

// Domain modules
pub mod alerting;
pub mod caching;
pub mod error_tracking;
pub mod hub;
pub mod logging;
pub mod metrics;
pub mod notifications;

// Re-export commonly used types for convenience
pub use alerting::{
    default_rules, Alert, AlertListener, AlertManager, AlertQuery, AlertRule, AlertSeverity,
    AlertStats, AlertType, Comparator, RuleCondition,
};
pub use caching::{
    ApiResponseCache, CacheEntryMetadata, CacheStats, ObjectCache, QueryCache, TtlCache,
};
pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use error_tracking::{
    ErrorCategory, ErrorReport, ErrorSeverity, ErrorStats, ErrorTracker,
};
pub use hub::TelemetryHub;
pub use logging::{
    AggregatorLayer, LogAggregator, LogEntry, LogLevel, LogQuery, LogStats,
};
pub use metrics::{MetricStats, MetricStore, MetricTimer, MetricsSnapshot};
pub use notifications::{LogNotifier, NotificationRouter, Notifier};
pub use shutdown::ShutdownHandle;

/// The result type used throughout the library
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Current wall-clock time in unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
