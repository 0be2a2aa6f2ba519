//! # Telemetry Core Tests
//!
//! End-to-end behavior of the metric store, the cache family, and the
//! error tracker: sliding-window bounds, exact percentile parity, TTL
//! expiry semantics, hit-rate accounting, and fingerprint deduplication.

use gridpulse::{
    ApiResponseCache, ErrorCategory, ErrorSeverity, ErrorTracker, MetricStore, QueryCache,
    TtlCache,
};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

// ---------------------------------------------------------------------------
// metric store
// ---------------------------------------------------------------------------

#[test]
fn window_holds_last_thousand_values_in_call_order() {
    let store = MetricStore::new();
    for v in 1..=1500 {
        store.record("api.latency_ms", v as f64);
    }
    let stats = store.get_stats("api.latency_ms").unwrap();
    assert_eq!(stats.count, 1000);
    assert_eq!(stats.min, 501.0);
    assert_eq!(stats.max, 1500.0);

    let values = store.values("api.latency_ms").unwrap();
    assert_eq!(values.len(), 1000);
    assert_eq!(values[0], 501.0);
    assert_eq!(values[999], 1500.0);
}

#[test]
fn window_below_capacity_holds_every_value() {
    let store = MetricStore::new();
    for v in 1..=10 {
        store.record("escrow.release_ms", v as f64);
    }
    let stats = store.get_stats("escrow.release_ms").unwrap();
    assert_eq!(stats.count, 10);
    assert_eq!(
        store.values("escrow.release_ms").unwrap(),
        (1..=10).map(|v| v as f64).collect::<Vec<_>>()
    );
}

#[test]
fn percentiles_use_nearest_rank_without_interpolation() {
    let store = MetricStore::new();
    for v in 1..=100 {
        store.record("window", v as f64);
    }
    let stats = store.get_stats("window").unwrap();
    assert_eq!(stats.p95, 96.0);
    assert_eq!(stats.p99, 100.0);
    assert_eq!(stats.average, 50.5);
}

#[test]
fn clear_drops_every_window() {
    let store = MetricStore::new();
    store.record("a", 1.0);
    store.record("b", 2.0);
    store.clear();
    assert!(store.get_stats("a").is_none());
    assert!(store.get_all().is_empty());
}

// ---------------------------------------------------------------------------
// cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cache_round_trip_and_ttl_expiry() {
    let cache: TtlCache<String> = TtlCache::new(60_000);
    cache.set("k", "v".to_string(), Some(50));
    assert_eq!(cache.get("k"), Some("v".to_string()));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(cache.get("k"), None);
    assert!(!cache.has("k"));
}

#[test]
fn hit_rate_is_a_percentage_over_lookups() {
    let cache: TtlCache<u32> = TtlCache::new(60_000);
    cache.set("k", 1, None);
    cache.get("k");
    cache.get("k");
    cache.get("k");
    cache.get("missing");
    let stats = cache.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate, 75.0);
}

#[test]
fn hit_rate_with_no_lookups_is_zero() {
    let cache: TtlCache<u32> = TtlCache::new(60_000);
    assert_eq!(cache.stats().hit_rate, 0.0);
}

#[tokio::test]
async fn size_and_keys_report_only_live_entries() {
    let cache: TtlCache<u32> = TtlCache::new(60_000);
    cache.set("short", 1, Some(30));
    cache.set("long", 2, None);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.size(), 1);
    assert_eq!(cache.keys(), vec!["long".to_string()]);
}

#[test]
fn delete_and_clear_account_in_stats() {
    let cache: TtlCache<u32> = TtlCache::new(60_000);
    cache.set("a", 1, None);
    cache.set("b", 2, None);
    assert!(cache.delete("a"));
    assert!(!cache.delete("a"));
    cache.clear();
    let stats = cache.stats();
    assert_eq!(stats.sets, 2);
    assert_eq!(stats.deletes, 1);
    assert_eq!(stats.clears, 1);
    assert_eq!(stats.size, 0);
}

#[test]
fn metadata_tracks_access_counts() {
    let cache: TtlCache<u32> = TtlCache::new(60_000);
    cache.set("k", 9, Some(120_000));
    cache.get("k");
    cache.get("k");
    let meta = cache.metadata("k").unwrap();
    assert_eq!(meta.hit_count, 2);
    assert_eq!(meta.ttl_ms, 120_000);
    assert_eq!(meta.expires_at, meta.created_at + 120_000);
    assert!(cache.metadata("missing").is_none());
}

#[test]
fn api_cache_canonicalizes_parameter_order() {
    let cache = ApiResponseCache::new();
    let response = json!({"projects": [{"id": "solar-7"}]});
    cache.set(
        "/api/projects",
        &json!({"region": "emea", "status": "funding", "page": 1}),
        response.clone(),
        None,
    );
    let hit = cache.get(
        "/api/projects",
        &json!({"page": 1, "status": "funding", "region": "emea"}),
    );
    assert_eq!(hit, Some(response));
}

#[test]
fn clear_endpoint_scopes_to_prefix() {
    let cache = ApiResponseCache::new();
    cache.set("/api/projects", &json!({"page": 1}), json!(1), None);
    cache.set("/api/projects", &json!({"page": 2}), json!(2), None);
    cache.set("/api/governance", &json!({}), json!(3), None);
    assert_eq!(cache.clear_endpoint("/api/projects"), 2);
    assert!(cache.get("/api/projects", &json!({"page": 1})).is_none());
    assert!(cache.get("/api/governance", &json!({})).is_some());
}

#[test]
fn query_cache_round_trips_results() {
    let cache = QueryCache::new();
    cache.set(
        "projects_by_status",
        &json!({"status": "active"}),
        json!([{"id": 1}]),
        None,
    );
    assert!(cache
        .get("projects_by_status", &json!({"status": "active"}))
        .is_some());
    assert!(cache
        .get("projects_by_status", &json!({"status": "closed"}))
        .is_none());
}

// ---------------------------------------------------------------------------
// error tracker
// ---------------------------------------------------------------------------

#[test]
fn identical_failures_dedup_into_one_report_with_merged_context() {
    let tracker = ErrorTracker::new();
    let stack = "at rpc::send\nat escrow::release\nat handler";

    let mut ctx1 = HashMap::new();
    ctx1.insert("wallet".to_string(), json!("7f…3a"));
    let mut ctx2 = HashMap::new();
    ctx2.insert("project".to_string(), json!("solar-7"));
    let mut ctx3 = HashMap::new();
    ctx3.insert("wallet".to_string(), json!("9c…1b"));

    let fp = tracker.track(
        "escrow release failed",
        Some(stack),
        ErrorSeverity::High,
        ErrorCategory::Funding,
        ctx1,
    );
    tracker.track(
        "escrow release failed",
        Some(stack),
        ErrorSeverity::High,
        ErrorCategory::Funding,
        ctx2,
    );
    tracker.track(
        "escrow release failed",
        Some(stack),
        ErrorSeverity::High,
        ErrorCategory::Funding,
        ctx3,
    );

    let report = tracker.get_report(&fp).unwrap();
    assert_eq!(report.occurrences, 3);
    assert_eq!(tracker.stats().total, 1);
    // overlapping keys overwritten, new keys added
    assert_eq!(report.context.get("wallet"), Some(&json!("9c…1b")));
    assert_eq!(report.context.get("project"), Some(&json!("solar-7")));
    assert!(report.first_seen <= report.last_seen);
}

#[test]
fn different_category_means_different_fingerprint() {
    let tracker = ErrorTracker::new();
    let a = tracker.track(
        "timeout",
        None,
        ErrorSeverity::Medium,
        ErrorCategory::Network,
        HashMap::new(),
    );
    let b = tracker.track(
        "timeout",
        None,
        ErrorSeverity::Medium,
        ErrorCategory::Database,
        HashMap::new(),
    );
    assert_ne!(a, b);
    assert_eq!(tracker.stats().total, 2);
}

#[test]
fn bounded_store_evicts_strictly_by_insertion_order() {
    let tracker = ErrorTracker::with_capacity(3);
    let critical = tracker.track(
        "critical failure",
        None,
        ErrorSeverity::Critical,
        ErrorCategory::Blockchain,
        HashMap::new(),
    );
    for i in 0..3 {
        tracker.track(
            format!("minor {}", i),
            None,
            ErrorSeverity::Low,
            ErrorCategory::Validation,
            HashMap::new(),
        );
    }
    // oldest-inserted goes first, severity does not protect it
    assert!(tracker.get_report(&critical).is_none());
    assert_eq!(tracker.stats().total, 3);
}

#[test]
fn resolution_lifecycle_and_export() {
    let tracker = ErrorTracker::new();
    let fp = tracker.track(
        "vote tally mismatch",
        None,
        ErrorSeverity::Medium,
        ErrorCategory::Governance,
        HashMap::new(),
    );
    assert_eq!(tracker.stats().unresolved, 1);
    assert!(tracker.mark_resolved(&fp));
    assert_eq!(tracker.stats().unresolved, 0);
    assert_eq!(tracker.clear_resolved(), 1);
    assert_eq!(tracker.stats().total, 0);

    tracker.track(
        "left behind",
        None,
        ErrorSeverity::Low,
        ErrorCategory::Unknown,
        HashMap::new(),
    );
    let exported = tracker.export().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&exported).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
    assert_eq!(parsed[0]["message"], "left behind");
}

#[test]
fn stats_cover_every_severity_and_category() {
    let tracker = ErrorTracker::new();
    tracker.track(
        "x",
        None,
        ErrorSeverity::Critical,
        ErrorCategory::Wallet,
        HashMap::new(),
    );
    let stats = tracker.stats();
    for severity in ErrorSeverity::ALL {
        assert!(stats.by_severity.contains_key(severity.as_str()));
    }
    for category in ErrorCategory::ALL {
        assert!(stats.by_category.contains_key(category.as_str()));
    }
    assert_eq!(stats.by_severity["critical"], 1);
    assert_eq!(stats.by_category["wallet"], 1);
}
