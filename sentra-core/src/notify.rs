//! Notification collaborator.
//!
//! Alert delivery to the user-facing notification service. The dispatcher
//! owns retry policy; this module classifies each failure as transient or
//! permanent so the dispatcher knows whether a retry can help.

use crate::dedup::Alert;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Failures of the notification collaborator.
///
/// Transient variants are retried by the dispatcher; permanent variants go
/// straight to the dead-letter log.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Connection-level failure likely to clear on retry
    #[error("Notification transport error: {0}")]
    Transport(String),

    /// The request itself could not be built or processed
    #[error("Notification request error: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status
    #[error("Notification endpoint returned {0}")]
    Status(StatusCode),
}

impl NotifyError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Request(_) => false,
            Self::Status(status) => is_transient_status(*status),
        }
    }
}

/// Downstream notification interface.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an alert notification.
    async fn notify(&self, alert: &Alert) -> std::result::Result<(), NotifyError>;
}

/// Notifier that drops everything, for tests and headless deployments.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _alert: &Alert) -> std::result::Result<(), NotifyError> {
        Ok(())
    }
}

/// Whether an HTTP status is worth retrying.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Whether a reqwest error is worth retrying.
pub fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Webhook notifier posting alert JSON to a configured endpoint.
pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(level = "debug", skip(self, alert), fields(alert_id = %alert.alert_id))]
    async fn notify(&self, alert: &Alert) -> std::result::Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(alert)
            .send()
            .await
            .map_err(|e| {
                if is_transient_error(&e) {
                    NotifyError::Transport(e.to_string())
                } else {
                    NotifyError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status));
        }

        debug!("Alert notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> Alert {
        use crate::dedup::{AlertLabel, AlertStatus};
        use crate::ingest::Platform;

        Alert {
            alert_id: uuid::Uuid::new_v4(),
            identity_id: "alice".into(),
            content_id: uuid::Uuid::new_v4(),
            platform: Platform::X,
            source_account: "fake".into(),
            content_locator: "https://x.com/fake/status/1".into(),
            confidence_score: 0.9,
            label: AlertLabel::Impersonation,
            status: AlertStatus::New,
            detected_at: chrono::Utc::now(),
            reviewed_at: None,
        }
    }

    #[test]
    fn test_transient_status_classification() {
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));

        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn test_notify_error_transience() {
        assert!(NotifyError::Transport("connection reset".into()).is_transient());
        assert!(NotifyError::Status(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(NotifyError::Status(StatusCode::TOO_MANY_REQUESTS).is_transient());

        assert!(!NotifyError::Status(StatusCode::BAD_REQUEST).is_transient());
        assert!(!NotifyError::Request("invalid body".into()).is_transient());
    }

    #[tokio::test]
    async fn test_noop_notifier_accepts_everything() {
        assert!(NoopNotifier.notify(&alert()).await.is_ok());
    }

    #[test]
    fn test_webhook_payload_shape() {
        let value = serde_json::to_value(alert()).unwrap();
        assert_eq!(value["identity_id"], "alice");
        assert_eq!(value["platform"], "x");
        assert_eq!(value["status"], "new");
        assert_eq!(value["label"], "impersonation");
        assert!(value["reviewed_at"].is_null());
    }
}
