use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::auth::ClientProfile;
use crate::model::Reservation;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned HTTP {0}")]
    HttpStatus(u16),
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound plain-text notifications to staff.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Posts `{"msgtype":"text","text":{"content":…}}` to a group-chat webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "msgtype": "text",
            "text": { "content": message },
        });
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _message: &str) -> Result<(), NotifyError> {
        tracing::debug!("notifications disabled, dropping message");
        Ok(())
    }
}

/// Staff-facing text for a new booking.
pub fn booking_message(profile: &ClientProfile, reservation: &Reservation) -> String {
    format!(
        "Client: {}\nPhone: {}\nCompany: {}\nSlot: {} {}",
        profile.display_name,
        profile.phone,
        profile.company_name,
        reservation.date,
        reservation.range()
    )
}

/// Fire and forget. The attempt is bounded by `timeout`; failures are logged
/// and counted, never surfaced to the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, message: String, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = match tokio::time::timeout(timeout, notifier.notify(&message)).await {
            Ok(r) => r,
            Err(_) => Err(NotifyError::Timeout(timeout)),
        };
        if let Err(e) = result {
            metrics::counter!(crate::observability::NOTIFICATIONS_FAILED_TOTAL).increment(1);
            tracing::warn!("booking notification failed: {e}");
        }
    })
}
