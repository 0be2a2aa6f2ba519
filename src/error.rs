#[cfg(feature = "server")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors produced at the fallible seams of the telemetry core.
///
/// The in-memory recording operations (`record`, `get`, `set`, `track`) are
/// total functions and never return this type; it covers configuration
/// validation, snapshot export, and notification dispatch.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Snapshot export or payload serialization failed
    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// A notification channel failed to deliver an alert
    #[error("notification dispatch failed: {0}")]
    Notification(String),
}

#[cfg(feature = "server")]
impl IntoResponse for TelemetryError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            TelemetryError::Config(msg) => (StatusCode::BAD_REQUEST, msg),
            TelemetryError::Serialization { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Serialization error: {}", source),
            ),
            TelemetryError::Notification(msg) => (
                StatusCode::BAD_GATEWAY,
                format!("Notification error: {}", msg),
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": "telemetry_error",
                "code": null
            }
        }));

        (status, body).into_response()
    }
}
