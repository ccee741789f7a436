//! Source pollers.
//!
//! One poller per upstream source, each a thin wrapper around a
//! `SourceClient` trait object so the concrete wire format of any given
//! mail/chat/ticketing/survey/PM/drive backend stays out of this crate —
//! tests exercise a `FakeSourceClient` double instead of a real API.

pub mod drive;
pub mod mail;
pub mod project_management;
pub mod survey;
pub mod ticketing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PollError;
use crate::model::EventSource;

pub use drive::DrivePoller;
pub use mail::MailPoller;
pub use project_management::ProjectManagementPoller;
pub use survey::SurveyPoller;
pub use ticketing::TicketingPoller;

/// A single new-or-updated item observed since the last poll, not yet
/// published to the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolledItem {
    pub external_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Thin abstraction over an upstream API client. Concrete wire formats are
/// out of scope; implementors translate raw responses into `PolledItem`s.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<PolledItem>, PollError>;
}

/// A poller for one event source, driven by the scheduler on each tick.
#[async_trait]
pub trait SourcePoller: Send + Sync {
    fn source(&self) -> EventSource;
    async fn poll_since(&self, since: DateTime<Utc>) -> Result<Vec<PolledItem>, PollError>;
}

/// Chat pollers need webhook-push rather than pull in most deployments, but
/// a poll-based fallback (e.g. for channels without push support) shares
/// this same shape; kept here since it has no folder-snapshot state.
pub struct ChatPoller {
    client: std::sync::Arc<dyn SourceClient>,
}

impl ChatPoller {
    pub fn new(client: std::sync::Arc<dyn SourceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourcePoller for ChatPoller {
    fn source(&self) -> EventSource {
        EventSource::Chat
    }

    async fn poll_since(&self, since: DateTime<Utc>) -> Result<Vec<PolledItem>, PollError> {
        self.client.fetch_since(since).await
    }
}

/// Placeholder `SourceClient` for a source with no concrete backend wired
/// in yet. Always reports no new items; swap in a real client once the
/// upstream API integration exists.
pub struct NullSourceClient;

#[async_trait]
impl SourceClient for NullSourceClient {
    async fn fetch_since(&self, _since: DateTime<Utc>) -> Result<Vec<PolledItem>, PollError> {
        Ok(Vec::new())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub struct FakeSourceClient {
    pub items: Vec<PolledItem>,
}

#[cfg(any(test, feature = "test-helpers"))]
#[async_trait]
impl SourceClient for FakeSourceClient {
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<PolledItem>, PollError> {
        Ok(self
            .items
            .iter()
            .filter(|i| i.occurred_at >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn item(id: &str, occurred_at: DateTime<Utc>) -> PolledItem {
        PolledItem {
            external_id: id.to_string(),
            event_type: "message".to_string(),
            payload: serde_json::json!({"id": id}),
            occurred_at,
        }
    }

    #[tokio::test]
    async fn chat_poller_filters_by_since() {
        use chrono::TimeZone;
        let old = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let client = Arc::new(FakeSourceClient {
            items: vec![item("a", old), item("b", new)],
        });
        let poller = ChatPoller::new(client);
        let items = poller.poll_since(new).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id, "b");
    }
}
