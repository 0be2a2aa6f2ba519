//! # Metric Store Module
//!
//! Records numeric samples per named metric in a bounded sliding window and
//! derives count/average/min/max/p95/p99 on demand. Every other component of
//! the telemetry core reports into this one.

use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, PoisonError, RwLock},
    time::Instant,
};
use tracing::debug;

/// Samples retained per metric window. Oldest samples are dropped on
/// overflow, so the window always holds the most recent values in call order.
pub const DEFAULT_WINDOW_CAPACITY: usize = 1000;

/// # Metric Statistics
///
/// Read-only view derived from a metric's current window. Percentiles use
/// nearest-rank indexing into a sorted copy, without interpolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    /// Number of samples currently in the window
    pub count: usize,
    /// Arithmetic mean of the window
    pub average: f64,
    /// Smallest sample in the window
    pub min: f64,
    /// Largest sample in the window
    pub max: f64,
    /// 95th percentile (nearest-rank)
    pub p95: f64,
    /// 99th percentile (nearest-rank)
    pub p99: f64,
}

/// # Metric Store
///
/// Process-wide recorder of numeric samples. Cheap to clone; clones share
/// the same underlying windows.
#[derive(Debug, Clone)]
pub struct MetricStore {
    /// Sliding windows keyed by metric name
    windows: Arc<RwLock<HashMap<String, VecDeque<f64>>>>,
    /// Per-window capacity
    capacity: usize,
}

impl MetricStore {
    /// Create a metric store with the default window capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_CAPACITY)
    }

    /// Create a metric store with a custom per-metric window capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample to the named window, trimming to the most recent
    /// `capacity` values. Creates the window on first use; always succeeds.
    pub fn record(&self, name: &str, value: f64) {
        let mut windows = self
            .windows
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(name.to_string()).or_default();
        window.push_back(value);
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    /// Start a wall-clock timer for the named metric. Elapsed milliseconds
    /// are recorded when [`MetricTimer::stop`] is called; a timer dropped
    /// without `stop` records nothing. Timers are independent per call site
    /// and may be nested freely.
    pub fn start_timer(&self, name: &str) -> MetricTimer {
        MetricTimer {
            store: self.clone(),
            name: name.to_string(),
            started_at: Instant::now(),
        }
    }

    /// Derive statistics for one metric. Returns `None` when the metric has
    /// never been recorded or its window is empty.
    pub fn get_stats(&self, name: &str) -> Option<MetricStats> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows.get(name).and_then(|window| compute_stats(window))
    }

    /// Snapshot of the current window contents for one metric, oldest first.
    pub fn values(&self, name: &str) -> Option<Vec<f64>> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows.get(name).map(|w| w.iter().copied().collect())
    }

    /// Statistics for every known metric.
    pub fn get_all(&self) -> HashMap<String, Option<MetricStats>> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows
            .iter()
            .map(|(name, window)| (name.clone(), compute_stats(window)))
            .collect()
    }

    /// Drop every window.
    pub fn clear(&self) {
        let mut windows = self
            .windows
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let dropped = windows.len();
        windows.clear();
        if dropped > 0 {
            debug!(dropped, "cleared metric windows");
        }
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Running timer returned by [`MetricStore::start_timer`].
#[derive(Debug)]
pub struct MetricTimer {
    store: MetricStore,
    name: String,
    started_at: Instant,
}

impl MetricTimer {
    /// Stop the timer, record elapsed milliseconds under the timer's metric
    /// name, and return the elapsed value.
    pub fn stop(self) -> f64 {
        let elapsed_ms = self.started_at.elapsed().as_secs_f64() * 1000.0;
        self.store.record(&self.name, elapsed_ms);
        elapsed_ms
    }
}

fn compute_stats(window: &VecDeque<f64>) -> Option<MetricStats> {
    if window.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let count = sorted.len();
    let sum: f64 = sorted.iter().sum();
    Some(MetricStats {
        count,
        average: sum / count as f64,
        min: sorted[0],
        max: sorted[count - 1],
        p95: nearest_rank(&sorted, 0.95),
        p99: nearest_rank(&sorted, 0.99),
    })
}

/// Nearest-rank percentile: index into the sorted window at `floor(q * len)`,
/// clamped to the last element. No interpolation.
fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    let idx = ((q * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// # Metrics Snapshot
///
/// Flat `field -> value` view of current telemetry, handed to alert rule
/// conditions and the query surface. Loosely typed on purpose: rules refer
/// to fields by name and treat missing fields as non-matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was assembled (unix millis)
    pub taken_at: i64,
    /// Flattened gauge values
    pub values: HashMap<String, f64>,
}

impl MetricsSnapshot {
    /// Create an empty snapshot stamped with the current time.
    pub fn new() -> Self {
        Self {
            taken_at: crate::now_millis(),
            values: HashMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, field: &str, value: f64) -> Self {
        self.insert(field, value);
        self
    }

    /// Set one field.
    pub fn insert(&mut self, field: &str, value: f64) {
        self.values.insert(field.to_string(), value);
    }

    /// Read one field.
    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl From<HashMap<String, f64>> for MetricsSnapshot {
    fn from(values: HashMap<String, f64>) -> Self {
        Self {
            taken_at: crate::now_millis(),
            values,
        }
    }
}
