//! # Error Tracking Module
//!
//! Deduplicates recurring failures into grouped reports keyed by a
//! deterministic fingerprint of category, message, and the top of the stack
//! trace. Reports carry severity, occurrence counts, first/last-seen
//! timestamps, and a resolution flag.
//!
//! The store is bounded: past `max_errors` the single oldest-inserted report
//! is evicted, in strict insertion order regardless of severity or
//! occurrence count. That policy is part of the documented behavior.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::TelemetryError;
use crate::now_millis;

/// Maximum grouped reports retained before insertion-order eviction.
pub const DEFAULT_MAX_ERRORS: usize = 1000;
/// Stack lines contributing to the fingerprint.
pub const FINGERPRINT_STACK_LINES: usize = 5;

/// Failure severity, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub const ALL: [ErrorSeverity; 4] = [
        ErrorSeverity::Low,
        ErrorSeverity::Medium,
        ErrorSeverity::High,
        ErrorSeverity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        }
    }
}

/// Failure category used for grouping and dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Auth,
    Wallet,
    Blockchain,
    Database,
    Network,
    Validation,
    Funding,
    Governance,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::Auth,
        ErrorCategory::Wallet,
        ErrorCategory::Blockchain,
        ErrorCategory::Database,
        ErrorCategory::Network,
        ErrorCategory::Validation,
        ErrorCategory::Funding,
        ErrorCategory::Governance,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::Wallet => "wallet",
            ErrorCategory::Blockchain => "blockchain",
            ErrorCategory::Database => "database",
            ErrorCategory::Network => "network",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Funding => "funding",
            ErrorCategory::Governance => "governance",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

/// # Error Report
///
/// One grouped failure. Repeat occurrences of the same fingerprint update
/// `occurrences`, `last_seen`, and shallow-merge `context` instead of
/// creating a new report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Stable report id
    pub id: String,
    /// Failure message
    pub message: String,
    /// Stack trace or failure location, when available
    pub stack: Option<String>,
    /// Severity at first occurrence
    pub severity: ErrorSeverity,
    /// Grouping category
    pub category: ErrorCategory,
    /// Merged structured context from every occurrence
    pub context: HashMap<String, Value>,
    /// Dedup key
    pub fingerprint: String,
    /// Occurrence count
    pub occurrences: u64,
    /// First occurrence (unix millis)
    pub first_seen: i64,
    /// Latest occurrence (unix millis)
    pub last_seen: i64,
    /// Whether the failure was explicitly marked resolved
    pub resolved: bool,
}

/// Aggregate counts over the current report store. Every severity and
/// category variant is present, zero-defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total: u64,
    pub by_severity: HashMap<String, u64>,
    pub by_category: HashMap<String, u64>,
    pub unresolved: u64,
}

struct ReportStore {
    reports: HashMap<String, ErrorReport>,
    insertion_order: VecDeque<String>,
}

/// # Error Tracker
///
/// Process-wide failure dedup store. Cheap to clone; clones share state.
/// Production wiring is one instance per process, passed explicitly to
/// request handlers rather than reached through a global.
#[derive(Clone)]
pub struct ErrorTracker {
    store: Arc<RwLock<ReportStore>>,
    max_errors: usize,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ERRORS)
    }

    pub fn with_capacity(max_errors: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(ReportStore {
                reports: HashMap::new(),
                insertion_order: VecDeque::new(),
            })),
            max_errors: max_errors.max(1),
        }
    }

    /// Compute the dedup fingerprint for a failure: a truncated SHA-256 of
    /// the category, message, and first five whitespace-trimmed stack lines.
    /// Deterministic and order-sensitive.
    pub fn fingerprint(category: ErrorCategory, message: &str, stack: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(category.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(message.as_bytes());
        if let Some(stack) = stack {
            for line in stack.lines().take(FINGERPRINT_STACK_LINES) {
                hasher.update(b"|");
                hasher.update(line.trim().as_bytes());
            }
        }
        let digest = hasher.finalize();
        digest
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Record a failure. Returns the report fingerprint.
    ///
    /// A failure sharing a fingerprint with an existing report increments
    /// its occurrence count, refreshes `last_seen`, and shallow-merges the
    /// context (new keys added, overlapping keys overwritten). A new
    /// fingerprint creates a fresh report, evicting the oldest-inserted one
    /// when the store is full. Every call also emits one structured log
    /// event at a level mapped from severity.
    pub fn track(
        &self,
        message: impl Into<String>,
        stack: Option<&str>,
        severity: ErrorSeverity,
        category: ErrorCategory,
        context: HashMap<String, Value>,
    ) -> String {
        let message = message.into();
        let fingerprint = Self::fingerprint(category, &message, stack);
        let now = now_millis();
        let occurrences;
        {
            let mut guard = self.store.write().unwrap_or_else(PoisonError::into_inner);
            let store = &mut *guard;
            match store.reports.entry(fingerprint.clone()) {
                Entry::Occupied(mut slot) => {
                    let report = slot.get_mut();
                    report.occurrences += 1;
                    report.last_seen = now;
                    report.context.extend(context);
                    occurrences = report.occurrences;
                }
                Entry::Vacant(slot) => {
                    slot.insert(ErrorReport {
                        id: Uuid::new_v4().to_string(),
                        message: message.clone(),
                        stack: stack.map(str::to_string),
                        severity,
                        category,
                        context,
                        fingerprint: fingerprint.clone(),
                        occurrences: 1,
                        first_seen: now,
                        last_seen: now,
                        resolved: false,
                    });
                    store.insertion_order.push_back(fingerprint.clone());
                    occurrences = 1;
                }
            }
            while store.reports.len() > self.max_errors {
                if let Some(oldest) = store.insertion_order.pop_front() {
                    store.reports.remove(&oldest);
                } else {
                    break;
                }
            }
        }
        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                error!(
                    fingerprint = %fingerprint,
                    category = category.as_str(),
                    severity = severity.as_str(),
                    occurrences,
                    "{}", message
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    fingerprint = %fingerprint,
                    category = category.as_str(),
                    occurrences,
                    "{}", message
                );
            }
            ErrorSeverity::Low => {
                info!(
                    fingerprint = %fingerprint,
                    category = category.as_str(),
                    occurrences,
                    "{}", message
                );
            }
        }
        fingerprint
    }

    /// Record a std error, using its `Display` output as the message and its
    /// source chain as the stack.
    pub fn track_error(
        &self,
        err: &(dyn std::error::Error + 'static),
        severity: ErrorSeverity,
        category: ErrorCategory,
    ) -> String {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        let stack = if chain.is_empty() {
            None
        } else {
            Some(chain.join("\n"))
        };
        self.track(
            err.to_string(),
            stack.as_deref(),
            severity,
            category,
            HashMap::new(),
        )
    }

    /// Record a failure surfaced from a detached background task. Fixed
    /// `High` severity, mirroring the treatment of unhandled async failures.
    pub fn track_background_failure(&self, task: &str, err: &(dyn std::error::Error + 'static)) {
        let mut context = HashMap::new();
        context.insert("task".to_string(), Value::String(task.to_string()));
        self.track(
            err.to_string(),
            None,
            ErrorSeverity::High,
            ErrorCategory::Unknown,
            context,
        );
    }

    /// Install a process-wide panic hook that records every panic as a
    /// `Critical` failure before delegating to the previously installed
    /// hook, so crash behavior is unchanged — the panic is recorded first,
    /// never suppressed.
    pub fn install_panic_hook(&self) {
        let tracker = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "panic with non-string payload".to_string()
            };
            let location = panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            tracker.track(
                message,
                location.as_deref(),
                ErrorSeverity::Critical,
                ErrorCategory::Unknown,
                HashMap::new(),
            );
            previous(panic_info);
        }));
    }

    /// Aggregate counts: total reports, reports per severity and category
    /// (all variants present), and unresolved reports.
    pub fn stats(&self) -> ErrorStats {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut by_severity: HashMap<String, u64> = ErrorSeverity::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_category: HashMap<String, u64> = ErrorCategory::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), 0))
            .collect();
        let mut unresolved = 0;
        for report in store.reports.values() {
            *by_severity.entry(report.severity.as_str().to_string()).or_insert(0) += 1;
            *by_category.entry(report.category.as_str().to_string()).or_insert(0) += 1;
            if !report.resolved {
                unresolved += 1;
            }
        }
        ErrorStats {
            total: store.reports.len() as u64,
            by_severity,
            by_category,
            unresolved,
        }
    }

    /// Look up one report by fingerprint.
    pub fn get_report(&self, fingerprint: &str) -> Option<ErrorReport> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.reports.get(fingerprint).cloned()
    }

    /// Every current report, most recently seen first.
    pub fn reports(&self) -> Vec<ErrorReport> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut reports: Vec<ErrorReport> = store.reports.values().cloned().collect();
        reports.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        reports
    }

    /// Mark a report resolved. Returns `false` for unknown fingerprints.
    pub fn mark_resolved(&self, fingerprint: &str) -> bool {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        match store.reports.get_mut(fingerprint) {
            Some(report) => {
                report.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Remove every resolved report. Returns the removed count.
    pub fn clear_resolved(&self) -> usize {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let before = store.reports.len();
        store.reports.retain(|_, report| !report.resolved);
        let removed = before - store.reports.len();
        let remaining: std::collections::HashSet<String> =
            store.reports.keys().cloned().collect();
        store
            .insertion_order
            .retain(|fingerprint| remaining.contains(fingerprint));
        removed
    }

    /// Serialize the current reports (most recently seen first) to JSON.
    pub fn export(&self) -> Result<String, TelemetryError> {
        let reports = self.reports();
        Ok(serde_json::to_string_pretty(&reports)?)
    }
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ErrorTracker")
            .field("reports", &store.reports.len())
            .field("max_errors", &self.max_errors)
            .finish()
    }
}
