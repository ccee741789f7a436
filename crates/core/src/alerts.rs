//! Outbound alerting for conditions that need a human's attention
//! immediately, independent of the approval queue — today, just a
//! dead-lettered event.
//!
//! Grounded on the teacher's `toolkit::write`-style outward posting: a
//! thin trait in front of whatever channel webhook is configured, so the
//! queue never depends on a concrete chat provider.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AlertError;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, message: &str, context: Value) -> Result<(), AlertError>;
}

/// Posts to a chat incoming-webhook URL. Most chat providers accept a
/// bare `{"text": ...}` body for incoming webhooks; anything richer is
/// out of scope here.
pub struct ChatWebhookAlertSink {
    client: reqwest::Client,
    webhook_url: String,
}

impl ChatWebhookAlertSink {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl AlertSink for ChatWebhookAlertSink {
    async fn send(&self, message: &str, context: Value) -> Result<(), AlertError> {
        let body = serde_json::json!({ "text": message, "context": context });
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|source| AlertError::Delivery { source })?;

        if !response.status().is_success() {
            return Err(AlertError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Drops every alert. Used when no webhook is configured, so the rest of
/// the system doesn't need an `Option<Arc<dyn AlertSink>>` at every call
/// site.
pub struct NoopAlertSink;

#[async_trait]
impl AlertSink for NoopAlertSink {
    async fn send(&self, _message: &str, _context: Value) -> Result<(), AlertError> {
        Ok(())
    }
}
