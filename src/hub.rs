//! # Telemetry Hub Module
//!
//! Wires one instance of each telemetry component together, owns the
//! periodic background work (process memory sampling, alert rule
//! evaluation), and exposes the read-only query surface consumed by admin
//! dashboards and health endpoints.
//!
//! Production wiring is one hub per process, constructed explicitly and
//! passed to request handlers; tests construct a fresh hub each.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::alerting::{default_rules, AlertManager};
use crate::caching::{ApiResponseCache, QueryCache};
use crate::config::TelemetryConfig;
use crate::error_tracking::ErrorTracker;
use crate::logging::LogAggregator;
use crate::metrics::{MetricStore, MetricsSnapshot};
use crate::notifications::NotificationRouter;
use crate::now_millis;
use crate::shutdown::ShutdownHandle;

/// # Telemetry Hub
///
/// Owner of the telemetry core. Cheap to clone; clones share every
/// component and the shutdown signal.
#[derive(Debug, Clone)]
pub struct TelemetryHub {
    config: TelemetryConfig,
    metrics: MetricStore,
    errors: ErrorTracker,
    alerts: AlertManager,
    logs: LogAggregator,
    api_cache: ApiResponseCache,
    query_cache: QueryCache,
    started_at: i64,
    shutdown: ShutdownHandle,
}

impl TelemetryHub {
    /// Build a hub with a log-only notification router.
    pub fn new(config: TelemetryConfig) -> Self {
        Self::with_router(config, NotificationRouter::new())
    }

    /// Build a hub with the given notification channels attached.
    pub fn with_router(config: TelemetryConfig, router: NotificationRouter) -> Self {
        let alerts = AlertManager::with_capacity(config.max_alerts).with_router(router);
        if config.install_default_rules {
            for rule in default_rules() {
                alerts.add_rule(rule);
            }
        }
        Self {
            metrics: MetricStore::with_capacity(config.metric_window_capacity),
            errors: ErrorTracker::with_capacity(config.max_errors),
            alerts,
            logs: LogAggregator::with_capacity(config.max_log_entries),
            api_cache: ApiResponseCache::with_ttl(config.api_cache_ttl_ms),
            query_cache: QueryCache::with_ttl(config.query_cache_ttl_ms),
            started_at: now_millis(),
            shutdown: ShutdownHandle::new(),
            config,
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricStore {
        &self.metrics
    }

    pub fn errors(&self) -> &ErrorTracker {
        &self.errors
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn logs(&self) -> &LogAggregator {
        &self.logs
    }

    pub fn api_cache(&self) -> &ApiResponseCache {
        &self.api_cache
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.query_cache
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Request a stop of the background ticks (and the server, when its
    /// graceful-shutdown future is wired to this hub's handle).
    pub fn stop(&self) {
        self.shutdown.request_stop();
    }

    /// Spawn the periodic background work: a memory sampling tick and an
    /// alert evaluation tick. Both stop when [`stop`](Self::stop) is
    /// called; the returned handles let the caller await the drain.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let sampler = self.clone();
        let sample_period = Duration::from_secs(self.config.memory_sample_interval_secs);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sample_period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => sampler.sample_memory(),
                    _ = sampler.shutdown.wait() => break,
                }
            }
            debug!("memory sampling tick stopped");
        }));

        let evaluator = self.clone();
        let evaluation_period = Duration::from_secs(self.config.evaluation_interval_secs);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(evaluation_period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = evaluator.snapshot();
                        evaluator.alerts.evaluate_metrics(&snapshot).await;
                    }
                    _ = evaluator.shutdown.wait() => break,
                }
            }
            debug!("alert evaluation tick stopped");
        }));

        info!(
            memory_sample_secs = self.config.memory_sample_interval_secs,
            evaluation_secs = self.config.evaluation_interval_secs,
            "telemetry background ticks started"
        );
        handles
    }

    /// Record the current process memory gauges into the metric store.
    pub fn sample_memory(&self) {
        let (rss_bytes, percent) = memory_gauges();
        self.metrics.record("process.memory_rss_bytes", rss_bytes as f64);
        self.metrics.record("process.memory_percent", percent);
    }

    /// Assemble the flat snapshot handed to alert rule conditions:
    /// per-metric aggregates, cache hit rates, error totals, and live
    /// memory gauges.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::new();

        for (name, stats) in self.metrics.get_all() {
            if let Some(stats) = stats {
                snapshot.insert(&format!("{}.count", name), stats.count as f64);
                snapshot.insert(&format!("{}.avg", name), stats.average);
                snapshot.insert(&format!("{}.min", name), stats.min);
                snapshot.insert(&format!("{}.max", name), stats.max);
                snapshot.insert(&format!("{}.p95", name), stats.p95);
                snapshot.insert(&format!("{}.p99", name), stats.p99);
            }
        }

        let api_stats = self.api_cache.stats();
        snapshot.insert("cache.api.hit_rate", api_stats.hit_rate);
        snapshot.insert("cache.api.size", api_stats.size as f64);
        let query_stats = self.query_cache.stats();
        snapshot.insert("cache.query.hit_rate", query_stats.hit_rate);
        snapshot.insert("cache.query.size", query_stats.size as f64);

        let error_stats = self.errors.stats();
        snapshot.insert("errors.total", error_stats.total as f64);
        snapshot.insert("errors.unresolved", error_stats.unresolved as f64);

        let (rss_bytes, percent) = memory_gauges();
        snapshot.insert("process.memory_rss_bytes", rss_bytes as f64);
        snapshot.insert("process.memory_percent", percent);
        snapshot.insert(
            "process.uptime_secs",
            ((now_millis() - self.started_at) / 1000) as f64,
        );

        snapshot
    }

    /// Uptime since the hub was constructed, in seconds.
    pub fn uptime_secs(&self) -> i64 {
        (now_millis() - self.started_at) / 1000
    }

    /// The axum router for the read-only query surface.
    #[cfg(feature = "server")]
    pub fn router(&self) -> axum::Router {
        http::router(self.clone())
    }
}

/// Current process RSS in bytes and as a percentage of system memory.
/// Reads `/proc` on Linux; reports zero elsewhere.
fn memory_gauges() -> (u64, f64) {
    let rss = read_rss_bytes();
    let total = read_total_memory_bytes();
    let percent = if total > 0 {
        rss as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    (rss, percent)
}

fn read_rss_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(statm) = std::fs::read_to_string("/proc/self/statm") {
            if let Some(pages) = statm
                .split_whitespace()
                .nth(1)
                .and_then(|v| v.parse::<u64>().ok())
            {
                return pages * 4096;
            }
        }
    }
    0
}

fn read_total_memory_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/proc/meminfo") {
            for line in contents.lines() {
                if line.starts_with("MemTotal:") {
                    if let Some(kb) = line
                        .split_whitespace()
                        .nth(1)
                        .and_then(|v| v.parse::<u64>().ok())
                    {
                        return kb * 1024;
                    }
                }
            }
        }
    }
    0
}

#[cfg(feature = "server")]
mod http {
    use super::TelemetryHub;
    use crate::alerting::AlertQuery;
    use crate::logging::LogQuery;
    use axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use serde::Deserialize;
    use serde_json::json;
    use tower_http::{cors::CorsLayer, trace::TraceLayer};

    pub fn router(hub: TelemetryHub) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(all_metrics))
            .route("/metrics/{name}", get(metric_stats))
            .route("/snapshot", get(snapshot))
            .route("/cache/stats", get(cache_stats))
            .route("/errors", get(error_stats))
            .route("/errors/reports", get(error_reports))
            .route("/alerts", get(alerts))
            .route("/alerts/stats", get(alert_stats))
            .route("/alerts/{id}/acknowledge", post(acknowledge_alert))
            .route("/alerts/{id}/resolve", post(resolve_alert))
            .route("/logs", get(logs))
            .route("/logs/stats", get(log_stats))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(hub)
    }

    async fn health(State(hub): State<TelemetryHub>) -> impl IntoResponse {
        Json(json!({
            "status": "ok",
            "uptime_secs": hub.uptime_secs(),
        }))
    }

    async fn all_metrics(State(hub): State<TelemetryHub>) -> impl IntoResponse {
        Json(hub.metrics().get_all())
    }

    async fn metric_stats(
        State(hub): State<TelemetryHub>,
        Path(name): Path<String>,
    ) -> Response {
        match hub.metrics().get_stats(&name) {
            Some(stats) => Json(stats).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("no metric named '{}'", name)})),
            )
                .into_response(),
        }
    }

    async fn snapshot(State(hub): State<TelemetryHub>) -> impl IntoResponse {
        Json(hub.snapshot())
    }

    async fn cache_stats(State(hub): State<TelemetryHub>) -> impl IntoResponse {
        Json(json!({
            "api": hub.api_cache().stats(),
            "query": hub.query_cache().stats(),
        }))
    }

    async fn error_stats(State(hub): State<TelemetryHub>) -> impl IntoResponse {
        Json(hub.errors().stats())
    }

    async fn error_reports(State(hub): State<TelemetryHub>) -> impl IntoResponse {
        Json(hub.errors().reports())
    }

    async fn alerts(
        State(hub): State<TelemetryHub>,
        Query(query): Query<AlertQuery>,
    ) -> impl IntoResponse {
        Json(hub.alerts().get_alerts(&query))
    }

    async fn alert_stats(State(hub): State<TelemetryHub>) -> impl IntoResponse {
        Json(hub.alerts().get_alert_stats())
    }

    #[derive(Debug, Deserialize)]
    struct AcknowledgeParams {
        by: Option<String>,
    }

    async fn acknowledge_alert(
        State(hub): State<TelemetryHub>,
        Path(id): Path<String>,
        Query(params): Query<AcknowledgeParams>,
    ) -> impl IntoResponse {
        let acknowledged = hub
            .alerts()
            .acknowledge_alert(&id, params.by.as_deref());
        Json(json!({"id": id, "acknowledged": acknowledged}))
    }

    async fn resolve_alert(
        State(hub): State<TelemetryHub>,
        Path(id): Path<String>,
    ) -> impl IntoResponse {
        let resolved = hub.alerts().resolve_alert(&id);
        Json(json!({"id": id, "resolved": resolved}))
    }

    async fn logs(
        State(hub): State<TelemetryHub>,
        Query(query): Query<LogQuery>,
    ) -> impl IntoResponse {
        Json(hub.logs().recent(&query))
    }

    async fn log_stats(State(hub): State<TelemetryHub>) -> impl IntoResponse {
        Json(hub.logs().stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_flattens_metric_aggregates() {
        let hub = TelemetryHub::new(TelemetryConfig::for_test());
        for v in [100.0, 200.0, 300.0] {
            hub.metrics().record("http.request_duration_ms", v);
        }
        let snapshot = hub.snapshot();
        assert_eq!(snapshot.get("http.request_duration_ms.count"), Some(3.0));
        assert_eq!(snapshot.get("http.request_duration_ms.avg"), Some(200.0));
        assert!(snapshot.get("errors.total").is_some());
        assert!(snapshot.get("process.memory_rss_bytes").is_some());
    }

    #[tokio::test]
    async fn ticks_stop_on_shutdown() {
        let hub = TelemetryHub::new(TelemetryConfig::for_test());
        let handles = hub.start();
        hub.stop();
        for handle in handles {
            tokio::time::timeout(std::time::Duration::from_secs(1), handle)
                .await
                .expect("tick should stop promptly")
                .expect("tick task should not panic");
        }
    }
}
