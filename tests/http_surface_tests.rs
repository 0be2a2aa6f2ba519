//! # HTTP Query Surface Tests
//!
//! Exercises the read-only admin endpoints end to end through the axum
//! router: health, metric aggregates, alert queries, the acknowledge and
//! resolve lifecycle, and log statistics.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use gridpulse::{TelemetryConfig, TelemetryHub};
use serde_json::Value;
use tower::ServiceExt;

fn test_hub() -> TelemetryHub {
    TelemetryHub::new(TelemetryConfig::for_test())
}

async fn get_json(hub: &TelemetryHub, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = hub.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post_json(hub: &TelemetryHub, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = hub.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_reports_ok() {
    let hub = test_hub();
    let (status, body) = get_json(&hub, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime_secs"].is_number());
}

#[tokio::test]
async fn metrics_endpoints_expose_recorded_stats() {
    let hub = test_hub();
    for v in 1..=100 {
        hub.metrics().record("api.latency_ms", v as f64);
    }

    let (status, body) = get_json(&hub, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("api.latency_ms").is_some());

    let (status, stats) = get_json(&hub, "/metrics/api.latency_ms").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["count"], 100);
    assert_eq!(stats["p95"], 96.0);

    let (status, _) = get_json(&hub, "/metrics/never.recorded").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn snapshot_endpoint_includes_gauges() {
    let hub = test_hub();
    let (status, body) = get_json(&hub, "/snapshot").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["values"].get("errors.total").is_some());
    assert!(body["values"].get("cache.api.hit_rate").is_some());
}

#[tokio::test]
async fn alert_lifecycle_over_http() {
    let hub = test_hub();
    // fire the default memory rule
    let snapshot = hub.snapshot().with("process.memory_percent", 95.0);
    hub.alerts().evaluate_metrics(&snapshot).await;

    let (status, alerts) = get_json(&hub, "/alerts?type=memory").await;
    assert_eq!(status, StatusCode::OK);
    let alerts = alerts.as_array().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    let id = alerts[0]["id"].as_str().unwrap().to_string();

    let (status, body) = post_json(&hub, &format!("/alerts/{}/acknowledge?by=ops", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["acknowledged"], true);

    // idempotent: second acknowledge reports false
    let (_, body) = post_json(&hub, &format!("/alerts/{}/acknowledge", id)).await;
    assert_eq!(body["acknowledged"], false);

    let (_, body) = post_json(&hub, &format!("/alerts/{}/resolve", id)).await;
    assert_eq!(body["resolved"], true);
    let (_, body) = post_json(&hub, &format!("/alerts/{}/resolve", id)).await;
    assert_eq!(body["resolved"], false);

    let (_, stats) = get_json(&hub, "/alerts/stats").await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["unresolved"], 0);
}

#[tokio::test]
async fn error_endpoints_expose_tracker_state() {
    let hub = test_hub();
    hub.errors().track(
        "rpc timeout",
        None,
        gridpulse::ErrorSeverity::High,
        gridpulse::ErrorCategory::Network,
        Default::default(),
    );

    let (status, stats) = get_json(&hub, "/errors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["by_severity"]["high"], 1);

    let (status, reports) = get_json(&hub, "/errors/reports").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reports.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn log_endpoints_serve_recent_entries() {
    let hub = test_hub();
    hub.logs()
        .push_http("GET /api/projects 200", Default::default());

    let (status, entries) = get_json(&hub, "/logs?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries.as_array().unwrap().len(), 1);

    let (status, stats) = get_json(&hub, "/logs/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["by_level"]["http"], 1);
}

#[tokio::test]
async fn cache_stats_endpoint_reports_both_facades() {
    let hub = test_hub();
    hub.api_cache()
        .set("/api/projects", &serde_json::json!({}), serde_json::json!(1), None);
    hub.api_cache().get("/api/projects", &serde_json::json!({}));

    let (status, body) = get_json(&hub, "/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api"]["hits"], 1);
    assert_eq!(body["api"]["hit_rate"], 100.0);
    assert_eq!(body["query"]["hits"], 0);
}
