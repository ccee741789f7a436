//! Pattern detector: adaptive anomaly detection over per-hour event-volume
//! baselines, plus a blunt hourly error-rate spike check.
//!
//! Anomaly semantics are grounded on the reference pattern detector: a
//! bucket is anomalous when its current count exceeds
//! `max(mean + 2*stddev, 2)` against its `(source, event_type, dow, hour)`
//! baseline; with no baseline yet, a flat fallback threshold of 3 applies.
//! Detected anomalies cool down for two hours via a KV TTL key so a
//! sustained spike doesn't re-alert every tick.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Datelike, Timelike, Utc};

use crate::error::PatternError;
use crate::kv::{keys, KvStore};
use crate::model::{Baseline, EventSource, Priority};
use crate::queue::Queue;
use crate::storage::{baselines, events, DbPool};

const FALLBACK_COUNT_THRESHOLD: i64 = 3;
const ANOMALY_FLOOR: f64 = 2.0;
const COOLDOWN_SECONDS: u64 = 2 * 60 * 60;
const ERROR_RATE_THRESHOLD: f64 = 0.3;
const ERROR_RATE_MIN_SAMPLE: i64 = 5;
const RECENT_WINDOW_SECONDS: i64 = 60 * 60;
const BASELINE_LOOKBACK_DAYS: i64 = 28;
/// 3+ negative reviews within the trailing hour, matching the reference
/// feedback poller's Trustpilot-spike check.
const NEGATIVE_SPIKE_THRESHOLD: i64 = 3;

pub struct PatternDetector {
    kv: std::sync::Arc<dyn KvStore>,
    cache: RwLock<HashMap<(String, String, i32, i32), Baseline>>,
}

impl PatternDetector {
    pub fn new(kv: std::sync::Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// `count > max(mean + 2*stddev, 2)` when a baseline exists; `count >=
    /// 3` otherwise.
    pub fn is_anomalous(count: i64, baseline: Option<(f64, f64)>) -> bool {
        match baseline {
            Some((mean, stddev)) => count as f64 > (mean + 2.0 * stddev).max(ANOMALY_FLOOR),
            None => count >= FALLBACK_COUNT_THRESHOLD,
        }
    }

    /// Sweeps every `(source, event_type)` pair active in the trailing
    /// hour against its baseline, publishing a CRITICAL `pattern_detected`
    /// event for anything anomalous, then runs the hourly error-rate
    /// spike check per source.
    pub async fn run_detection_pass(&self, db: &DbPool, queue: &Queue) -> Result<(), PatternError> {
        let now = Utc::now();
        let day_of_week = now.weekday().num_days_from_monday() as i32;
        let hour = now.hour() as i32;

        for (source, event_type) in events::distinct_source_event_types(db, RECENT_WINDOW_SECONDS).await? {
            let count = events::count_recent_by_source_and_type(db, &source, &event_type, RECENT_WINDOW_SECONDS).await?;
            let baseline = self.baseline_for(db, &source, &event_type, day_of_week, hour).await?;
            let baseline_stats = baseline.as_ref().map(|b| (b.mean, b.stddev));

            if !Self::is_anomalous(count, baseline_stats) {
                continue;
            }

            let group_key = format!("{source}:{event_type}");
            let cooldown_key = keys::pattern_cooldown("volume_spike", &group_key);
            if self.kv.exists(&cooldown_key).await? {
                continue;
            }

            self.emit_pattern_detected(queue, &source, &event_type, count, baseline_stats).await;
            self.kv.set_ex(&cooldown_key, "1", COOLDOWN_SECONDS).await?;
        }

        self.run_error_rate_check(db, queue).await?;
        self.run_negative_review_check(db, queue).await
    }

    /// Flags a survey/review negative-count spike: 3 or more negative
    /// responses (low star rating or negative sentiment) in the trailing
    /// hour, cooling down for `COOLDOWN_SECONDS` like the other checks.
    async fn run_negative_review_check(&self, db: &DbPool, queue: &Queue) -> Result<(), PatternError> {
        let count = events::count_recent_negative(db, "survey", RECENT_WINDOW_SECONDS).await?;
        if count < NEGATIVE_SPIKE_THRESHOLD {
            return Ok(());
        }

        let cooldown_key = keys::pattern_cooldown("negative_review_spike", "survey");
        if self.kv.exists(&cooldown_key).await? {
            return Ok(());
        }

        let payload = serde_json::json!({
            "kind": "negative_review_spike",
            "source": "survey",
            "negative_review_count": count,
            "window": "1 hour",
        });
        if let Err(err) = queue
            .publish(EventSource::Scheduler.as_str(), "pattern_detected", payload, Priority::Critical, None)
            .await
        {
            tracing::warn!(error = %err, "failed to publish negative-review pattern_detected event");
        }
        self.kv.set_ex(&cooldown_key, "1", COOLDOWN_SECONDS).await?;
        Ok(())
    }

    async fn emit_pattern_detected(
        &self,
        queue: &Queue,
        source: &str,
        event_type: &str,
        count: i64,
        baseline: Option<(f64, f64)>,
    ) {
        let payload = serde_json::json!({
            "kind": "volume_spike",
            "source": source,
            "event_type": event_type,
            "count": count,
            "baseline_mean": baseline.map(|(m, _)| m),
            "baseline_stddev": baseline.map(|(_, s)| s),
        });
        if let Err(err) = queue
            .publish(EventSource::Scheduler.as_str(), "pattern_detected", payload, Priority::Critical, None)
            .await
        {
            tracing::warn!(error = %err, "failed to publish pattern_detected event");
        }
    }

    async fn run_error_rate_check(&self, db: &DbPool, queue: &Queue) -> Result<(), PatternError> {
        for source in ["mail", "chat", "ticketing", "survey", "project_management", "drive"] {
            let (total, failed) = events::failure_counts_recent(db, source, RECENT_WINDOW_SECONDS).await?;
            if total < ERROR_RATE_MIN_SAMPLE {
                continue;
            }
            let rate = failed as f64 / total as f64;
            if rate <= ERROR_RATE_THRESHOLD {
                continue;
            }

            let cooldown_key = keys::pattern_cooldown("error_rate", source);
            if self.kv.exists(&cooldown_key).await? {
                continue;
            }

            let payload = serde_json::json!({
                "kind": "error_rate_spike",
                "source": source,
                "failed": failed,
                "total": total,
                "rate": rate,
            });
            if let Err(err) = queue
                .publish(EventSource::Scheduler.as_str(), "pattern_detected", payload, Priority::Critical, None)
                .await
            {
                tracing::warn!(error = %err, "failed to publish error-rate pattern_detected event");
            }
            self.kv.set_ex(&cooldown_key, "1", COOLDOWN_SECONDS).await?;
        }
        Ok(())
    }

    async fn baseline_for(
        &self,
        db: &DbPool,
        source: &str,
        event_type: &str,
        day_of_week: i32,
        hour: i32,
    ) -> Result<Option<Baseline>, PatternError> {
        let cache_key = (source.to_string(), event_type.to_string(), day_of_week, hour);
        if let Some(baseline) = self.cache.read().unwrap().get(&cache_key).cloned() {
            return Ok(Some(baseline));
        }

        let baseline = baselines::get(db, source, event_type, day_of_week, hour).await?;
        if let Some(baseline) = &baseline {
            self.cache.write().unwrap().insert(cache_key, baseline.clone());
        }
        Ok(baseline)
    }

    /// Upserts one baseline bucket and refreshes its in-memory cache entry
    /// in the same step — used by an approved `threshold_adjustment`
    /// proposal, which hands over an operator-edited mean/stddev.
    pub async fn apply_threshold_adjustment(&self, db: &DbPool, baseline: Baseline) -> Result<(), PatternError> {
        baselines::upsert(db, &baseline).await?;
        let cache_key = (
            baseline.source.clone(),
            baseline.event_type.clone(),
            baseline.day_of_week,
            baseline.hour,
        );
        self.cache.write().unwrap().insert(cache_key, baseline);
        Ok(())
    }

    /// Recomputes mean/stddev for every `(source, event_type)` pair over a
    /// rolling 28-day window, one bucket per hour-of-day actually seen in
    /// that window. Run weekly by the scheduler.
    pub async fn recompute_baselines(&self, db: &DbPool) -> Result<(), PatternError> {
        let now = Utc::now();
        let day_of_week = now.weekday().num_days_from_monday() as i32;

        for (source, event_type) in events::distinct_source_event_types(db, BASELINE_LOOKBACK_DAYS * 24 * 3600).await? {
            for hour in 0..24 {
                let counts = baselines::historical_daily_counts(db, &source, &event_type, hour, BASELINE_LOOKBACK_DAYS).await?;
                if counts.is_empty() {
                    continue;
                }
                let (mean, stddev) = mean_and_stddev(&counts);
                let baseline = Baseline {
                    source: source.clone(),
                    event_type: event_type.clone(),
                    day_of_week,
                    hour,
                    mean,
                    stddev,
                    sample_count: counts.len() as i64,
                    updated_at: now,
                };
                baselines::upsert(db, &baseline).await?;
                self.cache
                    .write()
                    .unwrap()
                    .insert((source.clone(), event_type.clone(), day_of_week, hour), baseline);
            }
        }
        Ok(())
    }
}

fn mean_and_stddev(counts: &[i64]) -> (f64, f64) {
    let n = counts.len() as f64;
    let mean = counts.iter().map(|&c| c as f64).sum::<f64>() / n;
    let variance = counts.iter().map(|&c| (c as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomalous_count_above_mean_plus_two_stddev() {
        assert!(PatternDetector::is_anomalous(10, Some((3.0, 1.0))));
    }

    #[test]
    fn not_anomalous_within_normal_range() {
        assert!(!PatternDetector::is_anomalous(4, Some((3.0, 1.0))));
    }

    #[test]
    fn floor_of_two_applies_when_stddev_is_zero() {
        assert!(!PatternDetector::is_anomalous(2, Some((0.0, 0.0))));
        assert!(PatternDetector::is_anomalous(3, Some((0.0, 0.0))));
    }

    #[test]
    fn fallback_threshold_of_three_applies_with_no_baseline() {
        assert!(!PatternDetector::is_anomalous(2, None));
        assert!(PatternDetector::is_anomalous(3, None));
    }

    #[test]
    fn mean_and_stddev_computed_correctly() {
        let (mean, stddev) = mean_and_stddev(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert!((mean - 5.0).abs() < 1e-9);
        assert!((stddev - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn recompute_baselines_persists_rows() {
        use crate::storage::init_test_db;
        use crate::error::KvError;
        use crate::kv::ScoredMember;
        use async_trait::async_trait;
        use std::sync::Arc;

        struct NoopKv;
        #[async_trait]
        impl KvStore for NoopKv {
            async fn zadd(&self, _: &str, _: &str, _: i64) -> Result<(), KvError> { Ok(()) }
            async fn zpopmin(&self, _: &str) -> Result<Option<ScoredMember>, KvError> { Ok(None) }
            async fn zrem(&self, _: &str, _: &str) -> Result<(), KvError> { Ok(()) }
            async fn zcard(&self, _: &str) -> Result<u64, KvError> { Ok(0) }
            async fn set_nx_ex(&self, _: &str, _: &str, _: u64) -> Result<bool, KvError> { Ok(true) }
            async fn compare_and_delete(&self, _: &str, _: &str) -> Result<bool, KvError> { Ok(true) }
            async fn get(&self, _: &str) -> Result<Option<String>, KvError> { Ok(None) }
            async fn set_ex(&self, _: &str, _: &str, _: u64) -> Result<(), KvError> { Ok(()) }
            async fn del(&self, _: &str) -> Result<(), KvError> { Ok(()) }
            async fn exists(&self, _: &str) -> Result<bool, KvError> { Ok(false) }
            async fn incr_with_ttl(&self, _: &str, _: u64) -> Result<i64, KvError> { Ok(1) }
        }

        let db = init_test_db().await.unwrap();
        let event = crate::model::Event {
            id: "e1".to_string(),
            source: "ticketing".to_string(),
            event_type: "new_ticket".to_string(),
            payload: serde_json::json!({}),
            priority: 1,
            idempotency_key: None,
            status: "pending".to_string(),
            retry_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        events::insert(&db, &event).await.unwrap();

        let detector = PatternDetector::new(Arc::new(NoopKv));
        detector.recompute_baselines(&db).await.unwrap();

        let day_of_week = Utc::now().weekday().num_days_from_monday() as i32;
        let hour = Utc::now().hour() as i32;
        let baseline = baselines::get(&db, "ticketing", "new_ticket", day_of_week, hour).await.unwrap();
        assert!(baseline.is_some());
    }

    #[tokio::test]
    async fn negative_review_spike_publishes_once_threshold_hit() {
        use crate::storage::init_test_db;
        use crate::kv::FakeKvStore;
        use std::sync::Arc;

        let db = init_test_db().await.unwrap();
        let kv: Arc<dyn KvStore> = Arc::new(FakeKvStore::default());
        let queue = Queue::new(kv.clone(), db.clone(), 3, 60);

        for i in 0..3 {
            let event = crate::model::Event {
                id: format!("neg_{i}"),
                source: "survey".to_string(),
                event_type: "review_received".to_string(),
                payload: serde_json::json!({"stars": 1}),
                priority: 1,
                idempotency_key: None,
                status: "pending".to_string(),
                retry_count: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            events::insert(&db, &event).await.unwrap();
        }

        let detector = PatternDetector::new(kv);
        detector.run_negative_review_check(&db, &queue).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);

        // Cooldown key now set; a second pass must not republish.
        detector.run_negative_review_check(&db, &queue).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn apply_threshold_adjustment_persists_and_updates_cache() {
        use crate::storage::init_test_db;
        use crate::kv::FakeKvStore;
        use std::sync::Arc;

        let db = init_test_db().await.unwrap();
        let detector = PatternDetector::new(Arc::new(FakeKvStore::default()));
        let baseline = Baseline {
            source: "ticketing".to_string(),
            event_type: "new_ticket".to_string(),
            day_of_week: 2,
            hour: 14,
            mean: 8.0,
            stddev: 2.5,
            sample_count: 28,
            updated_at: Utc::now(),
        };
        detector.apply_threshold_adjustment(&db, baseline.clone()).await.unwrap();

        let stored = baselines::get(&db, "ticketing", "new_ticket", 2, 14).await.unwrap().unwrap();
        assert_eq!(stored.mean, 8.0);

        let cached = detector.baseline_for(&db, "ticketing", "new_ticket", 2, 14).await.unwrap();
        assert_eq!(cached.unwrap().stddev, 2.5);
    }
}
