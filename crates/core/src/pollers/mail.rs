use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PollError;
use crate::model::EventSource;
use crate::pollers::{PolledItem, SourceClient, SourcePoller};

pub struct MailPoller {
    client: Arc<dyn SourceClient>,
}

impl MailPoller {
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourcePoller for MailPoller {
    fn source(&self) -> EventSource {
        EventSource::Mail
    }

    async fn poll_since(&self, since: DateTime<Utc>) -> Result<Vec<PolledItem>, PollError> {
        self.client.fetch_since(since).await
    }
}
