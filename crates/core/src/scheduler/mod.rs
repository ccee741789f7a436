//! Scheduler: the heartbeat ticker that drives polling, pattern detection,
//! feedback analysis, and cron-like scheduled events.
//!
//! Grounded directly on the teacher's `LoopScheduler` (base interval plus
//! jitter-free heartbeat here, since this loop's cadence is operationally
//! fixed rather than needing to look organic) and on its
//! `Runtime::run_until_shutdown` cooperative-shutdown pattern.

pub mod ticker;

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::model::{EventSource, Priority};
use crate::patterns::PatternDetector;
use crate::pollers::SourcePoller;
use crate::queue::Queue;
use crate::storage::DbPool;

pub use ticker::Ticker;

/// Drives one tick of the scheduler: polls every source concurrently,
/// publishes discovered items onto the queue, and runs periodic
/// maintenance (pattern detection, baseline recompute, scheduled briefs).
pub struct Scheduler {
    pollers: Vec<Arc<dyn SourcePoller>>,
    queue: Arc<Queue>,
    pattern_detector: Arc<PatternDetector>,
    db: DbPool,
    ticker: Ticker,
    pattern_detection_every_n_ticks: u32,
    feedback_analysis_every_n_ticks: u32,
    brief_minute: u32,
    tick_count: u64,
    last_poll_at: DateTime<Utc>,
}

impl Scheduler {
    pub fn new(
        pollers: Vec<Arc<dyn SourcePoller>>,
        queue: Arc<Queue>,
        pattern_detector: Arc<PatternDetector>,
        db: DbPool,
        heartbeat_interval_seconds: u64,
        pattern_detection_every_n_ticks: u32,
        feedback_analysis_every_n_ticks: u32,
        brief_minute: u32,
    ) -> Self {
        Self {
            pollers,
            queue,
            pattern_detector,
            db,
            ticker: Ticker::new(heartbeat_interval_seconds),
            pattern_detection_every_n_ticks,
            feedback_analysis_every_n_ticks,
            brief_minute,
            tick_count: 0,
            last_poll_at: Utc::now(),
        }
    }

    /// Runs one heartbeat's worth of work. Errors from individual pollers
    /// or maintenance tasks are logged, never propagated — a bad source or
    /// a transient pattern-detection failure must never take down the
    /// scheduler loop.
    pub async fn tick(&mut self) {
        self.tick_count += 1;
        let since = self.last_poll_at;
        self.last_poll_at = Utc::now();

        self.poll_all_sources(since).await;

        if self.pattern_detection_every_n_ticks > 0
            && self.tick_count % u64::from(self.pattern_detection_every_n_ticks) == 0
        {
            if let Err(err) = self.pattern_detector.run_detection_pass(&self.db, &self.queue).await {
                tracing::warn!(error = %err, "pattern detection pass failed");
            }
        }

        if self.feedback_analysis_every_n_ticks > 0
            && self.tick_count % u64::from(self.feedback_analysis_every_n_ticks) == 0
        {
            if let Err(err) = self.pattern_detector.recompute_baselines(&self.db).await {
                tracing::warn!(error = %err, "baseline recompute failed");
            }
        }

        let now = Utc::now();
        if now.minute() == self.brief_minute {
            self.emit_scheduled_brief().await;
        }
    }

    async fn poll_all_sources(&self, since: DateTime<Utc>) {
        let futures = self.pollers.iter().map(|poller| {
            let poller = poller.clone();
            async move {
                match poller.poll_since(since).await {
                    Ok(items) => Some((poller.source(), items)),
                    Err(err) => {
                        tracing::warn!(source = ?poller.source(), error = %err, "poll failed");
                        None
                    }
                }
            }
        });

        for result in join_all(futures).await.into_iter().flatten() {
            let (source, items) = result;
            for item in items {
                let publish_result = self
                    .queue
                    .publish(
                        source.as_str(),
                        &item.event_type,
                        item.payload,
                        Priority::Medium,
                        Some(format!("{}:{}", source.as_str(), item.external_id)),
                    )
                    .await;
                if let Err(err) = publish_result {
                    tracing::warn!(source = ?source, error = %err, "failed to publish polled item");
                }
            }
        }
    }

    async fn emit_scheduled_brief(&self) {
        let payload = serde_json::json!({ "kind": "scheduled_brief", "at": Utc::now() });
        if let Err(err) = self
            .queue
            .publish(EventSource::Scheduler.as_str(), "scheduled_brief", payload, Priority::Low, None)
            .await
        {
            tracing::warn!(error = %err, "failed to publish scheduled brief event");
        }
    }

    /// Runs the heartbeat loop until `cancel` fires, matching the teacher's
    /// cooperative-shutdown pattern for long-running background loops.
    pub async fn run_until_shutdown(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("scheduler shutting down");
                    return;
                }
                () = self.ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
