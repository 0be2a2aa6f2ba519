//! # GridPulse - Embedded Core Example
//!
//! Shows the telemetry core embedded directly in application code, without
//! the HTTP server: recording metrics, caching query results, tracking
//! errors, and evaluating alert rules by hand.

use gridpulse::{
    AlertQuery, ErrorCategory, ErrorSeverity, TelemetryConfig, TelemetryHub,
};
use serde_json::json;
use std::collections::HashMap;

#[tokio::main]
async fn main() {
    let hub = TelemetryHub::new(TelemetryConfig::default());

    // time a unit of work
    let timer = hub.metrics().start_timer("projects.load_ms");
    let projects = load_projects();
    timer.stop();

    // cache the result under a canonical key
    hub.query_cache().set(
        "projects_by_status",
        &json!({"status": "funding"}),
        json!(projects),
        None,
    );

    // record a failure with structured context
    let mut context = HashMap::new();
    context.insert("project".to_string(), json!("solar-7"));
    hub.errors().track(
        "escrow release rejected",
        Some("at escrow::release\nat handler"),
        ErrorSeverity::High,
        ErrorCategory::Funding,
        context,
    );

    // evaluate the default rule set against a fresh snapshot
    let snapshot = hub.snapshot();
    let fired = hub.alerts().evaluate_metrics(&snapshot).await;
    println!("alerts fired this sweep: {}", fired);

    for alert in hub.alerts().get_alerts(&AlertQuery::default()) {
        println!("[{}] {}: {}", alert.severity.as_str(), alert.title, alert.message);
    }

    let stats = hub.metrics().get_stats("projects.load_ms").unwrap();
    println!(
        "projects.load_ms: count={} avg={:.2}ms p95={:.2}ms",
        stats.count, stats.average, stats.p95
    );
}

fn load_projects() -> Vec<&'static str> {
    vec!["solar-7", "wind-12", "hydro-3"]
}
