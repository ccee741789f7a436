use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PollError;
use crate::model::EventSource;
use crate::pollers::{PolledItem, SourceClient, SourcePoller};

pub struct ProjectManagementPoller {
    client: Arc<dyn SourceClient>,
}

impl ProjectManagementPoller {
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourcePoller for ProjectManagementPoller {
    fn source(&self) -> EventSource {
        EventSource::ProjectManagement
    }

    async fn poll_since(&self, since: DateTime<Utc>) -> Result<Vec<PolledItem>, PollError> {
        self.client.fetch_since(since).await
    }
}
