//! Operator notification channel
//!
//! Notifications are best-effort: they run outside the store lock, after the
//! mutation has committed, and a failure is logged and dropped.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery seam for operator-facing notifications (chat message, webhook).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. The default when no chat transport is
/// wired up, and what shadow deployments run with.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        info!(%text, "notification");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures notification texts for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Always fails, for verifying that delivery failure never surfaces.
    #[derive(Debug, Default)]
    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _text: &str) -> Result<(), NotifyError> {
            Err(NotifyError("transport down".to_string()))
        }
    }
}
