//! Outbound notification channels.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SendError;

// ---

/// Capability to deliver one message about an artifact.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, artifact_id: i64, subject: &str, body: &str) -> Result<(), SendError>;

    /// Human-readable name for this channel (e.g., "webhook", "log").
    fn channel_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    artifact_id: i64,
    subject: &'a str,
    body: &'a str,
}

/// Posts each message as JSON to a configured URL.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    url: String,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookSender {
    // ---
    pub fn new(url: impl Into<String>) -> Self {
        // ---
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    // ---
    async fn send(&self, artifact_id: i64, subject: &str, body: &str) -> Result<(), SendError> {
        // ---
        let payload = WebhookPayload {
            artifact_id,
            subject,
            body,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(artifact_id, status = status.as_u16(), url = %self.url, "Webhook rejected notification");
            return Err(SendError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Writes messages to the log. Used when no delivery channel is configured.
#[derive(Debug, Default, Clone)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    // ---
    async fn send(&self, artifact_id: i64, subject: &str, body: &str) -> Result<(), SendError> {
        info!(artifact_id, subject, "Notification:\n{}", body);
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
