//! # Shutdown Module
//!
//! Cooperative stop signal for the hub's background ticks and the optional
//! HTTP server. Requesting a stop is idempotent and wakes every waiter;
//! in-flight work finishes its current step before observing the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared stop flag. Cheap to clone; clones observe the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop_requested: Arc<AtomicBool>,
    notify: Arc<tokio::sync::Notify>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            stop_requested: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Whether a stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Request a stop and wake every waiter. Idempotent.
    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
            self.notify.notify_waiters();
        }
    }

    /// Wait until a stop is requested. Returns immediately if one already
    /// was.
    pub async fn wait(&self) {
        loop {
            // register interest before checking the flag, so a concurrent
            // request_stop between check and await cannot be missed
            let notified = self.notify.notified();
            if self.is_stopping() {
                return;
            }
            notified.await;
        }
    }

    /// Wait for SIGINT (ctrl-c) or SIGTERM, then request a stop. Intended
    /// for the server binary's graceful-shutdown future.
    #[cfg(feature = "server")]
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = terminate => info!("received SIGTERM, shutting down"),
            _ = self.wait() => {}
        }
        self.request_stop();
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_after_request_stop() {
        let handle = ShutdownHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait().await })
        };
        handle.request_stop();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter task should not panic");
        assert!(handle.is_stopping());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_stopped() {
        let handle = ShutdownHandle::new();
        handle.request_stop();
        handle.request_stop(); // idempotent
        handle.wait().await;
    }
}
