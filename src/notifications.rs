//! # Notifications Module
//!
//! The outbound boundary of the alert engine. Concrete transports (chat
//! webhooks, email, SMS) live outside this crate and own their own
//! timeout/retry policy; this module defines the [`Notifier`] seam they
//! implement and the severity routing applied before dispatch.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::alerting::{Alert, AlertSeverity};
use crate::error::TelemetryError;

/// An alert delivery channel. Implementations must not panic; failures are
/// reported through the `Result` and are logged by the router, never
/// propagated to the evaluation sweep.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used in dispatch logs.
    fn name(&self) -> &str;

    /// Deliver one alert.
    async fn send(&self, alert: &Alert) -> Result<(), TelemetryError>;
}

/// Fallback notifier that writes alerts to the structured log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<(), TelemetryError> {
        debug!(
            alert_id = %alert.id,
            severity = alert.severity.as_str(),
            title = %alert.title,
            "alert notification"
        );
        Ok(())
    }
}

/// # Notification Router
///
/// Applies the severity policy to each triggered alert: the chat-style
/// channel receives every severity above `Low`, the email-style channel
/// receives `Critical` only. Channel failures are caught and logged.
#[derive(Clone, Default)]
pub struct NotificationRouter {
    chat: Option<Arc<dyn Notifier>>,
    email: Option<Arc<dyn Notifier>>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the chat-style channel (severity above `Low`).
    pub fn with_chat(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.chat = Some(notifier);
        self
    }

    /// Attach the email-style channel (`Critical` only).
    pub fn with_email(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.email = Some(notifier);
        self
    }

    /// Route one alert to the configured channels per the severity policy.
    pub async fn dispatch(&self, alert: &Alert) {
        if alert.severity != AlertSeverity::Low {
            if let Some(chat) = &self.chat {
                if let Err(err) = chat.send(alert).await {
                    warn!(
                        channel = chat.name(),
                        alert_id = %alert.id,
                        %err,
                        "notification dispatch failed"
                    );
                }
            }
        }
        if alert.severity == AlertSeverity::Critical {
            if let Some(email) = &self.email {
                if let Err(err) = email.send(alert).await {
                    warn!(
                        channel = email.name(),
                        alert_id = %alert.id,
                        %err,
                        "notification dispatch failed"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("chat", &self.chat.as_ref().map(|n| n.name().to_string()))
            .field("email", &self.email.as_ref().map(|n| n.name().to_string()))
            .finish()
    }
}
