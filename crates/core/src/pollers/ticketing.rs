use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PollError;
use crate::model::EventSource;
use crate::pollers::{PolledItem, SourceClient, SourcePoller};

pub struct TicketingPoller {
    client: Arc<dyn SourceClient>,
}

impl TicketingPoller {
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourcePoller for TicketingPoller {
    fn source(&self) -> EventSource {
        EventSource::Ticketing
    }

    async fn poll_since(&self, since: DateTime<Utc>) -> Result<Vec<PolledItem>, PollError> {
        self.client.fetch_since(since).await
    }
}
