//! # Alerting Module
//!
//! Rule-driven alert engine. Rules are declarative data: a condition over a
//! flat metrics snapshot, a severity, a message, and a cooldown. On each
//! evaluation sweep, every enabled rule whose cooldown has elapsed is
//! checked; a triggering rule emits an [`Alert`] into a bounded ring buffer,
//! invokes registered listeners, and forwards the alert to the notification
//! router. Firing is instantaneous: the rule re-arms immediately, gated only
//! by its cooldown timestamp.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, warn};

use crate::metrics::MetricsSnapshot;
use crate::notifications::NotificationRouter;
use crate::now_millis;

/// Alerts retained in the ring buffer before the oldest are dropped,
/// independent of resolution state.
pub const DEFAULT_MAX_ALERTS: usize = 1000;

/// Alert severity, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// What a rule is watching. Purely informational grouping for queries and
/// dashboards; evaluation never special-cases a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ResponseTime,
    ErrorRate,
    Memory,
    AuthFailure,
    SuspiciousActivity,
    Engagement,
    Custom,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ResponseTime => "response_time",
            AlertType::ErrorRate => "error_rate",
            AlertType::Memory => "memory",
            AlertType::AuthFailure => "auth_failure",
            AlertType::SuspiciousActivity => "suspicious_activity",
            AlertType::Engagement => "engagement",
            AlertType::Custom => "custom",
        }
    }
}

/// Comparison operator for threshold conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Comparator {
    fn compare(&self, left: f64, right: f64) -> bool {
        match self {
            Comparator::Gt => left > right,
            Comparator::Gte => left >= right,
            Comparator::Lt => left < right,
            Comparator::Lte => left <= right,
            Comparator::Eq => left == right,
        }
    }
}

/// Predicate registered for conditions not expressible declaratively.
pub type NamedPredicate = Arc<dyn Fn(&MetricsSnapshot) -> bool + Send + Sync>;

/// Rule condition over a metrics snapshot, expressed as data wherever
/// possible. `Named` falls back to a predicate registered on the manager.
/// A missing snapshot field never matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    Threshold {
        field: String,
        comparator: Comparator,
        value: f64,
    },
    AllOf {
        conditions: Vec<RuleCondition>,
    },
    AnyOf {
        conditions: Vec<RuleCondition>,
    },
    Named {
        key: String,
    },
}

impl RuleCondition {
    /// Convenience constructor for the common threshold case.
    pub fn threshold(field: &str, comparator: Comparator, value: f64) -> Self {
        RuleCondition::Threshold {
            field: field.to_string(),
            comparator,
            value,
        }
    }

    fn evaluate(
        &self,
        snapshot: &MetricsSnapshot,
        predicates: &HashMap<String, NamedPredicate>,
    ) -> Result<bool, String> {
        match self {
            RuleCondition::Threshold {
                field,
                comparator,
                value,
            } => Ok(snapshot
                .get(field)
                .map(|observed| comparator.compare(observed, *value))
                .unwrap_or(false)),
            RuleCondition::AllOf { conditions } => {
                for condition in conditions {
                    if !condition.evaluate(snapshot, predicates)? {
                        return Ok(false);
                    }
                }
                Ok(!conditions.is_empty())
            }
            RuleCondition::AnyOf { conditions } => {
                for condition in conditions {
                    if condition.evaluate(snapshot, predicates)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RuleCondition::Named { key } => predicates
                .get(key)
                .map(|predicate| predicate(snapshot))
                .ok_or_else(|| format!("no predicate registered under '{}'", key)),
        }
    }
}

/// # Alert Rule
///
/// Declarative trigger definition. Registered by id; re-registering the same
/// id replaces every field except `last_triggered`, so cooldown state
/// survives a rule redefinition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub condition: RuleCondition,
    pub message: String,
    pub cooldown_ms: u64,
    pub enabled: bool,
    /// Set by the engine on trigger; never written by callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<i64>,
}

/// # Alert
///
/// One rule trigger. `id` is `<rule id>-<trigger millis>`, unique per
/// trigger. Acknowledge and resolve are each settable at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub details: serde_json::Value,
    pub timestamp: i64,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
}

/// Filter for [`AlertManager::get_alerts`]. Every field is optional;
/// matching alerts are returned newest-first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertQuery {
    #[serde(rename = "type")]
    pub alert_type: Option<AlertType>,
    pub severity: Option<AlertSeverity>,
    pub resolved: Option<bool>,
    pub acknowledged: Option<bool>,
    pub limit: Option<usize>,
}

/// Aggregate counts over the alert buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: u64,
    pub by_type: HashMap<String, u64>,
    pub by_severity: HashMap<String, u64>,
    pub unresolved: u64,
    pub unacknowledged: u64,
}

/// Callback invoked for every triggered alert. Listeners run with panic
/// isolation: one misbehaving listener cannot block the others or the
/// evaluation sweep.
pub type AlertListener = Box<dyn Fn(&Alert) + Send + Sync>;

/// # Alert Manager
///
/// Holds the rule set, the bounded alert buffer, listeners, and the
/// notification router. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AlertManager {
    rules: Arc<RwLock<HashMap<String, AlertRule>>>,
    alerts: Arc<RwLock<VecDeque<Alert>>>,
    listeners: Arc<RwLock<Vec<AlertListener>>>,
    predicates: Arc<RwLock<HashMap<String, NamedPredicate>>>,
    router: NotificationRouter,
    max_alerts: usize,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ALERTS)
    }

    pub fn with_capacity(max_alerts: usize) -> Self {
        Self {
            rules: Arc::new(RwLock::new(HashMap::new())),
            alerts: Arc::new(RwLock::new(VecDeque::new())),
            listeners: Arc::new(RwLock::new(Vec::new())),
            predicates: Arc::new(RwLock::new(HashMap::new())),
            router: NotificationRouter::new(),
            max_alerts: max_alerts.max(1),
        }
    }

    /// Replace the notification router (builder style).
    pub fn with_router(mut self, router: NotificationRouter) -> Self {
        self.router = router;
        self
    }

    /// Register a named predicate for `RuleCondition::Named` conditions.
    pub fn register_predicate<F>(&self, key: &str, predicate: F)
    where
        F: Fn(&MetricsSnapshot) -> bool + Send + Sync + 'static,
    {
        let mut predicates = self
            .predicates
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        predicates.insert(key.to_string(), Arc::new(predicate));
    }

    /// Register a listener invoked for every triggered alert.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.push(Box::new(listener));
    }

    /// Upsert a rule by id. All fields of an existing rule are replaced
    /// except `last_triggered`, preserving cooldown continuity.
    pub fn add_rule(&self, mut rule: AlertRule) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = rules.get(&rule.id) {
            rule.last_triggered = existing.last_triggered;
        }
        debug!(rule_id = %rule.id, "alert rule registered");
        rules.insert(rule.id.clone(), rule);
    }

    /// Remove a rule. Returns whether it existed.
    pub fn remove_rule(&self, id: &str) -> bool {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.remove(id).is_some()
    }

    /// Enable or disable a rule. Returns `false` for unknown ids.
    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        match rules.get_mut(id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Current rule set, sorted by id.
    pub fn get_rules(&self) -> Vec<AlertRule> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<AlertRule> = rules.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Run one evaluation sweep over the snapshot. Returns the number of
    /// alerts fired.
    ///
    /// Per enabled rule: the cooldown gate is checked first; the condition
    /// is then evaluated with panic isolation — a failing or panicking
    /// condition is logged, counts as `false` for this sweep only, and
    /// never aborts the remaining rules. Triggered alerts are appended to
    /// the ring buffer, handed to every listener (each isolated), logged at
    /// warning level, and forwarded to the notification router.
    pub async fn evaluate_metrics(&self, snapshot: &MetricsSnapshot) -> usize {
        let now = now_millis();
        let fired = {
            let predicates = self
                .predicates
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
            let mut fired = Vec::new();
            for rule in rules.values_mut() {
                if !rule.enabled {
                    continue;
                }
                if let Some(last) = rule.last_triggered {
                    if now - last < rule.cooldown_ms as i64 {
                        continue; // suppressed: inside the cooldown window
                    }
                }
                let condition = rule.condition.clone();
                let verdict = catch_unwind(AssertUnwindSafe(|| {
                    condition.evaluate(snapshot, &predicates)
                }));
                let triggered = match verdict {
                    Ok(Ok(triggered)) => triggered,
                    Ok(Err(reason)) => {
                        error!(rule_id = %rule.id, %reason, "alert condition failed to evaluate");
                        false
                    }
                    Err(_) => {
                        error!(rule_id = %rule.id, "alert condition panicked");
                        false
                    }
                };
                if !triggered {
                    continue;
                }
                rule.last_triggered = Some(now);
                fired.push(Alert {
                    id: format!("{}-{}", rule.id, now),
                    alert_type: rule.alert_type,
                    severity: rule.severity,
                    title: rule.name.clone(),
                    message: rule.message.clone(),
                    details: json!({
                        "rule_id": rule.id,
                        "metrics": snapshot.values,
                    }),
                    timestamp: now,
                    resolved: false,
                    resolved_at: None,
                    acknowledged: false,
                    acknowledged_at: None,
                    acknowledged_by: None,
                });
            }
            fired
        };

        if fired.is_empty() {
            return 0;
        }

        {
            let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
            for alert in &fired {
                alerts.push_back(alert.clone());
            }
            while alerts.len() > self.max_alerts {
                alerts.pop_front();
            }
        }

        {
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for alert in &fired {
                warn!(
                    alert_id = %alert.id,
                    severity = alert.severity.as_str(),
                    title = %alert.title,
                    "alert triggered"
                );
                for listener in listeners.iter() {
                    if catch_unwind(AssertUnwindSafe(|| listener(alert))).is_err() {
                        error!(alert_id = %alert.id, "alert listener panicked");
                    }
                }
            }
        }

        for alert in &fired {
            self.router.dispatch(alert).await;
        }
        fired.len()
    }

    /// Matching alerts, newest-first, capped at `query.limit`.
    pub fn get_alerts(&self, query: &AlertQuery) -> Vec<Alert> {
        let alerts = self.alerts.read().unwrap_or_else(PoisonError::into_inner);
        let limit = query.limit.unwrap_or(usize::MAX);
        alerts
            .iter()
            .rev()
            .filter(|alert| {
                query.alert_type.map_or(true, |t| alert.alert_type == t)
                    && query.severity.map_or(true, |s| alert.severity == s)
                    && query.resolved.map_or(true, |r| alert.resolved == r)
                    && query.acknowledged.map_or(true, |a| alert.acknowledged == a)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Aggregate counts over the alert buffer.
    pub fn get_alert_stats(&self) -> AlertStats {
        let alerts = self.alerts.read().unwrap_or_else(PoisonError::into_inner);
        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut by_severity: HashMap<String, u64> = HashMap::new();
        let mut unresolved = 0;
        let mut unacknowledged = 0;
        for alert in alerts.iter() {
            *by_type.entry(alert.alert_type.as_str().to_string()).or_insert(0) += 1;
            *by_severity
                .entry(alert.severity.as_str().to_string())
                .or_insert(0) += 1;
            if !alert.resolved {
                unresolved += 1;
            }
            if !alert.acknowledged {
                unacknowledged += 1;
            }
        }
        AlertStats {
            total: alerts.len() as u64,
            by_type,
            by_severity,
            unresolved,
            unacknowledged,
        }
    }

    /// Acknowledge an alert. Returns `true` on the first acknowledgement,
    /// `false` when already acknowledged or the id is unknown.
    pub fn acknowledge_alert(&self, id: &str, by: Option<&str>) -> bool {
        let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
        match alerts.iter_mut().find(|alert| alert.id == id) {
            Some(alert) if !alert.acknowledged => {
                alert.acknowledged = true;
                alert.acknowledged_at = Some(now_millis());
                alert.acknowledged_by = by.map(str::to_string);
                true
            }
            _ => false,
        }
    }

    /// Resolve an alert. Returns `true` on the first resolution, `false`
    /// when already resolved or the id is unknown.
    pub fn resolve_alert(&self, id: &str) -> bool {
        let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
        match alerts.iter_mut().find(|alert| alert.id == id) {
            Some(alert) if !alert.resolved => {
                alert.resolved = true;
                alert.resolved_at = Some(now_millis());
                true
            }
            _ => false,
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let alerts = self.alerts.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("AlertManager")
            .field("rules", &rules.len())
            .field("alerts", &alerts.len())
            .field("max_alerts", &self.max_alerts)
            .finish()
    }
}

/// Default rule set shipped with the engine. Pure configuration data over
/// the generic [`AlertRule`] structure; callers register, tune, or drop
/// individual rules like any other.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            id: "api-response-time".to_string(),
            name: "Slow API responses".to_string(),
            alert_type: AlertType::ResponseTime,
            severity: AlertSeverity::Medium,
            condition: RuleCondition::threshold("http.request_duration_ms.p95", Comparator::Gt, 2000.0),
            message: "95th percentile API response time above 2s".to_string(),
            cooldown_ms: 5 * 60 * 1000,
            enabled: true,
            last_triggered: None,
        },
        AlertRule {
            id: "error-rate".to_string(),
            name: "Elevated error rate".to_string(),
            alert_type: AlertType::ErrorRate,
            severity: AlertSeverity::High,
            condition: RuleCondition::threshold("errors.unresolved", Comparator::Gte, 10.0),
            message: "10 or more unresolved error groups".to_string(),
            cooldown_ms: 10 * 60 * 1000,
            enabled: true,
            last_triggered: None,
        },
        AlertRule {
            id: "memory-usage".to_string(),
            name: "High memory usage".to_string(),
            alert_type: AlertType::Memory,
            severity: AlertSeverity::High,
            condition: RuleCondition::threshold("process.memory_percent", Comparator::Gt, 85.0),
            message: "Process memory above 85% of system total".to_string(),
            cooldown_ms: 5 * 60 * 1000,
            enabled: true,
            last_triggered: None,
        },
        AlertRule {
            id: "auth-failures".to_string(),
            name: "Authentication failure spike".to_string(),
            alert_type: AlertType::AuthFailure,
            severity: AlertSeverity::Critical,
            condition: RuleCondition::threshold("auth.failures.count", Comparator::Gte, 10.0),
            message: "Burst of failed wallet authentication attempts".to_string(),
            cooldown_ms: 15 * 60 * 1000,
            enabled: true,
            last_triggered: None,
        },
        AlertRule {
            id: "suspicious-activity".to_string(),
            name: "Suspicious wallet activity".to_string(),
            alert_type: AlertType::SuspiciousActivity,
            severity: AlertSeverity::Critical,
            condition: RuleCondition::threshold("wallet.suspicious_events.count", Comparator::Gte, 3.0),
            message: "Repeated suspicious wallet operations detected".to_string(),
            cooldown_ms: 30 * 60 * 1000,
            enabled: true,
            last_triggered: None,
        },
        AlertRule {
            id: "funding-bounce-rate".to_string(),
            name: "Funding page bounce rate".to_string(),
            alert_type: AlertType::Engagement,
            severity: AlertSeverity::Low,
            condition: RuleCondition::threshold("funding.bounce_rate_percent", Comparator::Gt, 70.0),
            message: "Funding page bounce rate above 70%".to_string(),
            cooldown_ms: 60 * 60 * 1000,
            enabled: true,
            last_triggered: None,
        },
    ]
}
