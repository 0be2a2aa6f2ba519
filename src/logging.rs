//! # Log Aggregation Module
//!
//! In-memory ring buffer of structured log entries, answering "recent logs"
//! queries without touching the file system. Components log through the
//! ordinary `tracing` macros; [`AggregatorLayer`] mirrors every emitted
//! event into the buffer when registered on the subscriber, so nothing in
//! the core writes to stdout or files directly.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::now_millis;

/// Entries retained before the oldest are dropped.
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 1000;

/// Log level, ordered least to most severe: `Error > Warn > Info > Http >
/// Debug`. `Http` is reserved for request-scope entries pushed explicitly
/// through [`LogAggregator::push_http`]; `tracing` debug and trace events
/// both land on `Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Http,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Http => "http",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

/// One structured log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emission time (unix millis)
    pub timestamp: i64,
    pub level: LogLevel,
    /// Module path or subsystem that emitted the entry
    pub target: String,
    pub message: String,
    /// Structured fields attached to the event
    pub fields: HashMap<String, String>,
}

/// Filter for [`LogAggregator::recent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogQuery {
    /// Keep entries at or above this level
    pub min_level: Option<LogLevel>,
    /// Keep entries at or after this time (unix millis)
    pub since: Option<i64>,
    /// Keep entries at or before this time (unix millis)
    pub until: Option<i64>,
    pub limit: Option<usize>,
}

/// Aggregate counts over the buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStats {
    pub total: usize,
    pub by_level: HashMap<String, u64>,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
}

/// # Log Aggregator
///
/// Bounded FIFO buffer of recent structured log entries. Cheap to clone;
/// clones share the buffer.
#[derive(Debug, Clone)]
pub struct LogAggregator {
    entries: Arc<RwLock<VecDeque<LogEntry>>>,
    max_entries: usize,
}

impl LogAggregator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_LOG_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: max_entries.max(1),
        }
    }

    /// Append one entry, dropping the oldest past capacity.
    pub fn push(&self, entry: LogEntry) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Append a request-scope entry at the `Http` level.
    pub fn push_http(&self, message: impl Into<String>, fields: HashMap<String, String>) {
        self.push(LogEntry {
            timestamp: now_millis(),
            level: LogLevel::Http,
            target: "http".to_string(),
            message: message.into(),
            fields,
        });
    }

    /// Matching entries, newest-first, capped at `query.limit`.
    pub fn recent(&self, query: &LogQuery) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let limit = query.limit.unwrap_or(usize::MAX);
        entries
            .iter()
            .rev()
            .filter(|entry| {
                query.min_level.map_or(true, |level| entry.level >= level)
                    && query.since.map_or(true, |since| entry.timestamp >= since)
                    && query.until.map_or(true, |until| entry.timestamp <= until)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Aggregate counts over the current buffer.
    pub fn stats(&self) -> LogStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut by_level: HashMap<String, u64> = [
            LogLevel::Debug,
            LogLevel::Http,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ]
        .iter()
        .map(|level| (level.as_str().to_string(), 0))
        .collect();
        for entry in entries.iter() {
            *by_level.entry(entry.level.as_str().to_string()).or_insert(0) += 1;
        }
        LogStats {
            total: entries.len(),
            by_level,
            oldest: entries.front().map(|e| e.timestamp),
            newest: entries.back().map(|e| e.timestamp),
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }
}

impl Default for LogAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// # Aggregator Layer
///
/// `tracing-subscriber` layer that mirrors every event into a
/// [`LogAggregator`]. Register it alongside the fmt layer:
///
/// ```rust,no_run
/// use gridpulse::{AggregatorLayer, LogAggregator};
/// use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
///
/// let logs = LogAggregator::new();
/// tracing_subscriber::registry()
///     .with(tracing_subscriber::fmt::layer())
///     .with(AggregatorLayer::new(logs.clone()))
///     .init();
/// ```
pub struct AggregatorLayer {
    aggregator: LogAggregator,
}

impl AggregatorLayer {
    pub fn new(aggregator: LogAggregator) -> Self {
        Self { aggregator }
    }
}

impl<S: Subscriber> Layer<S> for AggregatorLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        self.aggregator.push(LogEntry {
            timestamp: now_millis(),
            level: metadata.level().into(),
            target: metadata.target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: LogLevel, timestamp: i64, message: &str) -> LogEntry {
        LogEntry {
            timestamp,
            level,
            target: "test".to_string(),
            message: message.to_string(),
            fields: HashMap::new(),
        }
    }

    #[test]
    fn buffer_drops_oldest_past_capacity() {
        let logs = LogAggregator::with_capacity(3);
        for i in 0..5 {
            logs.push(entry(LogLevel::Info, i, &format!("m{}", i)));
        }
        let recent = logs.recent(&LogQuery::default());
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "m4");
        assert_eq!(recent[2].message, "m2");
    }

    #[test]
    fn level_ordering_filters_correctly() {
        let logs = LogAggregator::new();
        logs.push(entry(LogLevel::Debug, 1, "d"));
        logs.push(entry(LogLevel::Http, 2, "h"));
        logs.push(entry(LogLevel::Info, 3, "i"));
        logs.push(entry(LogLevel::Warn, 4, "w"));
        logs.push(entry(LogLevel::Error, 5, "e"));

        let warnish = logs.recent(&LogQuery {
            min_level: Some(LogLevel::Warn),
            ..Default::default()
        });
        assert_eq!(warnish.len(), 2);

        let httpish = logs.recent(&LogQuery {
            min_level: Some(LogLevel::Http),
            ..Default::default()
        });
        assert_eq!(httpish.len(), 4);
    }

    #[test]
    fn time_range_and_limit_apply() {
        let logs = LogAggregator::new();
        for i in 0..10 {
            logs.push(entry(LogLevel::Info, i, "m"));
        }
        let windowed = logs.recent(&LogQuery {
            since: Some(3),
            until: Some(7),
            limit: Some(3),
            ..Default::default()
        });
        assert_eq!(windowed.len(), 3);
        assert_eq!(windowed[0].timestamp, 7);
    }

    #[test]
    fn stats_bucket_all_levels() {
        let logs = LogAggregator::new();
        logs.push(entry(LogLevel::Error, 1, "e"));
        logs.push_http("GET /api/projects", HashMap::new());
        let stats = logs.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_level["error"], 1);
        assert_eq!(stats.by_level["http"], 1);
        assert_eq!(stats.by_level["debug"], 0);
    }
}
