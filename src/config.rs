//! # Configuration Module
//!
//! Capacities, TTLs, and tick intervals for the telemetry core, with
//! command-line and environment variable support for the server binary and
//! plain defaults for library embedding.

#[cfg(feature = "cli")]
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// # Telemetry Configuration
///
/// Every bound in the core is configurable but ships with the production
/// defaults: 1000-sample metric windows, 1000-report error store,
/// 1000-alert buffer, 1000-entry log buffer, 30-second ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", command(name = "gridpulse"))]
#[cfg_attr(feature = "cli", command(about = "In-memory telemetry and alerting core with an HTTP query surface"))]
#[cfg_attr(feature = "cli", command(version))]
pub struct TelemetryConfig {
    // =============================================================================
    // SERVER
    // =============================================================================
    /// Port for the HTTP query surface
    #[cfg_attr(feature = "cli", arg(short, long, env = "GRIDPULSE_PORT", default_value = "8080"))]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host for the HTTP query surface
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_HOST", default_value = "0.0.0.0"))]
    #[serde(default = "default_host")]
    pub host: String,

    // =============================================================================
    // CAPACITIES
    // =============================================================================
    /// Samples retained per metric window
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_METRIC_WINDOW", default_value = "1000"))]
    #[serde(default = "default_bound")]
    pub metric_window_capacity: usize,

    /// Grouped error reports retained before insertion-order eviction
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_MAX_ERRORS", default_value = "1000"))]
    #[serde(default = "default_bound")]
    pub max_errors: usize,

    /// Alerts retained in the ring buffer
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_MAX_ALERTS", default_value = "1000"))]
    #[serde(default = "default_bound")]
    pub max_alerts: usize,

    /// Structured log entries retained in the ring buffer
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_MAX_LOG_ENTRIES", default_value = "1000"))]
    #[serde(default = "default_bound")]
    pub max_log_entries: usize,

    // =============================================================================
    // CACHE TTLS
    // =============================================================================
    /// Default TTL for cached API responses, in milliseconds
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_API_CACHE_TTL_MS", default_value = "300000"))]
    #[serde(default = "default_api_ttl")]
    pub api_cache_ttl_ms: u64,

    /// Default TTL for cached query results, in milliseconds
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_QUERY_CACHE_TTL_MS", default_value = "600000"))]
    #[serde(default = "default_query_ttl")]
    pub query_cache_ttl_ms: u64,

    // =============================================================================
    // BACKGROUND TICKS
    // =============================================================================
    /// Seconds between process memory samples
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_MEMORY_SAMPLE_SECS", default_value = "30"))]
    #[serde(default = "default_tick_secs")]
    pub memory_sample_interval_secs: u64,

    /// Seconds between alert rule evaluation sweeps
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_EVALUATION_SECS", default_value = "30"))]
    #[serde(default = "default_tick_secs")]
    pub evaluation_interval_secs: u64,

    // =============================================================================
    // RULES
    // =============================================================================
    /// Register the built-in default rule set at startup
    #[cfg_attr(feature = "cli", arg(long, env = "GRIDPULSE_DEFAULT_RULES", default_value_t = true, action = clap::ArgAction::Set))]
    #[serde(default = "default_true")]
    pub install_default_rules: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_bound() -> usize {
    1000
}

fn default_api_ttl() -> u64 {
    5 * 60 * 1000
}

fn default_query_ttl() -> u64 {
    10 * 60 * 1000
}

fn default_tick_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            metric_window_capacity: default_bound(),
            max_errors: default_bound(),
            max_alerts: default_bound(),
            max_log_entries: default_bound(),
            api_cache_ttl_ms: default_api_ttl(),
            query_cache_ttl_ms: default_query_ttl(),
            memory_sample_interval_secs: default_tick_secs(),
            evaluation_interval_secs: default_tick_secs(),
            install_default_rules: default_true(),
        }
    }
}

impl TelemetryConfig {
    /// Parse configuration from CLI arguments and the environment, loading
    /// a `.env` file first when present.
    #[cfg(feature = "cli")]
    pub fn parse_args() -> Self {
        dotenv::dotenv().ok();
        Self::parse()
    }

    /// Small-bounds configuration for tests.
    pub fn for_test() -> Self {
        Self {
            port: 0,
            metric_window_capacity: 100,
            max_errors: 50,
            max_alerts: 50,
            max_log_entries: 100,
            memory_sample_interval_secs: 1,
            evaluation_interval_secs: 1,
            ..Default::default()
        }
    }

    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.metric_window_capacity == 0 {
            return Err(TelemetryError::Config(
                "metric_window_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_errors == 0 || self.max_alerts == 0 || self.max_log_entries == 0 {
            return Err(TelemetryError::Config(
                "store bounds must be at least 1".to_string(),
            ));
        }
        if self.memory_sample_interval_secs == 0 || self.evaluation_interval_secs == 0 {
            return Err(TelemetryError::Config(
                "tick intervals must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}
