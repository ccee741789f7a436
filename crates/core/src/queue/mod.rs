//! Priority, deduplicated, leased work queue.
//!
//! Grounded on the reference queue implementation's Redis ZSET
//! (`ZADD`/`ZPOPMIN`), SET-NX-EX lease, and dual-write to a durable store.
//! `consume` pops the lowest-scored member (highest priority, then
//! earliest), acquires a lease, and hydrates the full event from the
//! durable store. `nack` always releases the lease; on exhausted retries
//! it dead-letters instead of republishing.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::alerts::{AlertSink, NoopAlertSink};
use crate::error::QueueError;
use crate::kv::{keys, KvStore};
use crate::model::{Event, EventStatus, Priority};
use crate::storage::{dead_letter, events, DbPool};

pub struct Queue {
    kv: Arc<dyn KvStore>,
    db: DbPool,
    max_retries: u32,
    lease_ttl_seconds: u64,
    alert_sink: Arc<dyn AlertSink>,
}

/// An event popped off the queue together with the lease token needed to
/// ack/nack it.
pub struct LeasedEvent {
    pub event: Event,
    lease_token: String,
}

impl Queue {
    pub fn new(kv: Arc<dyn KvStore>, db: DbPool, max_retries: u32, lease_ttl_seconds: u64) -> Self {
        Self {
            kv,
            db,
            max_retries,
            lease_ttl_seconds,
            alert_sink: Arc::new(NoopAlertSink),
        }
    }

    /// Replaces the alert sink used when an event exhausts its retry
    /// budget and is dead-lettered. Defaults to a no-op sink.
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = sink;
        self
    }

    /// Publish a new event. Dedup on `idempotency_key`: if a durable row
    /// with the same non-empty key already exists, this is a no-op (the
    /// original publish already queued the work).
    pub async fn publish(
        &self,
        source: &str,
        event_type: &str,
        payload: serde_json::Value,
        priority: Priority,
        idempotency_key: Option<String>,
    ) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let event = Event {
            id: id.clone(),
            source: source.to_string(),
            event_type: event_type.to_string(),
            payload,
            priority: priority as i32,
            idempotency_key: idempotency_key.clone(),
            status: events::status_str(EventStatus::Pending).to_string(),
            retry_count: 0,
            created_at: now,
            updated_at: now,
        };

        if let Some(key) = &idempotency_key {
            if !key.is_empty() && self.kv.exists(&keys::dedup(key)).await? {
                return Ok(id);
            }
        }

        events::insert(&self.db, &event).await?;

        if let Some(key) = &idempotency_key {
            if !key.is_empty() {
                self.kv.set_ex(&keys::dedup(key), &id, 86_400).await?;
            }
        }

        self.kv
            .set_ex(&keys::event_payload(&id), &event.payload.to_string(), 86_400)
            .await?;
        self.kv.zadd(&keys::queue_zset(), &id, priority.score(now)).await?;

        Ok(id)
    }

    /// Pop the next event, acquiring its lease. Returns `None` if the
    /// queue is empty. Does not check the pause flag itself — callers
    /// (the worker's consumer loop) check `is_paused` before calling.
    pub async fn consume(&self) -> Result<Option<LeasedEvent>, QueueError> {
        let Some(popped) = self.kv.zpopmin(&keys::queue_zset()).await? else {
            return Ok(None);
        };

        let lease_token = Uuid::new_v4().to_string();
        let acquired = self
            .kv
            .set_nx_ex(&keys::lease(&popped.member), &lease_token, self.lease_ttl_seconds)
            .await?;
        if !acquired {
            // Someone else already holds the lease (shouldn't happen since
            // ZPOPMIN is exclusive, but a crash-and-requeue race is
            // possible); put it back and let the next tick retry.
            self.kv.zadd(&keys::queue_zset(), &popped.member, popped.score).await?;
            return Ok(None);
        }

        let event = events::get(&self.db, &popped.member)
            .await?
            .ok_or_else(|| QueueError::EventNotFound {
                event_id: popped.member.clone(),
            })?;

        events::update_status(&self.db, &event.id, EventStatus::Processing, event.retry_count).await?;

        Ok(Some(LeasedEvent { event, lease_token }))
    }

    /// Check whether the queue is paused without consuming anything.
    pub async fn is_paused(&self) -> Result<bool, QueueError> {
        Ok(self.kv.exists(&keys::pause_flag()).await?)
    }

    pub async fn pause(&self) -> Result<(), QueueError> {
        self.kv.set_ex(&keys::pause_flag(), "1", 86_400 * 365).await?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), QueueError> {
        self.kv.del(&keys::pause_flag()).await?;
        Ok(())
    }

    /// Successful processing: mark complete and release the lease.
    pub async fn ack(&self, leased: &LeasedEvent) -> Result<(), QueueError> {
        events::update_status(&self.db, &leased.event.id, EventStatus::Completed, leased.event.retry_count)
            .await?;
        self.kv
            .compare_and_delete(&keys::lease(&leased.event.id), &leased.lease_token)
            .await?;
        Ok(())
    }

    /// Failed processing: always releases the lease. Republishes at the
    /// same priority with a fresh timestamp if under the retry budget,
    /// otherwise dead-letters. Pausing does not drop the event: a paused
    /// worker nacks without processing, so the event is republished and
    /// waits at the front of the queue until the operator resumes.
    pub async fn nack(&self, leased: &LeasedEvent, error: &str) -> Result<(), QueueError> {
        let next_retry_count = leased.event.retry_count + 1;

        if next_retry_count as u32 >= self.max_retries {
            dead_letter::insert(
                &self.db,
                &leased.event.id,
                &leased.event.source,
                &leased.event.event_type,
                &leased.event.payload,
                next_retry_count,
                &[error.to_string()],
            )
            .await?;
            events::update_status(
                &self.db,
                &leased.event.id,
                EventStatus::DeadLettered,
                next_retry_count,
            )
            .await?;

            let alert_context = serde_json::json!({
                "event_id": leased.event.id,
                "source": leased.event.source,
                "event_type": leased.event.event_type,
                "retry_count": next_retry_count,
                "error": error,
            });
            if let Err(alert_err) = self
                .alert_sink
                .send(&format!("event {} dead-lettered after {next_retry_count} attempts", leased.event.id), alert_context)
                .await
            {
                tracing::warn!(error = %alert_err, event_id = %leased.event.id, "failed to deliver dead-letter alert");
            }
        } else {
            events::update_status(&self.db, &leased.event.id, EventStatus::Pending, next_retry_count)
                .await?;
            let priority = Priority::from_i32_lenient(leased.event.priority);
            self.kv
                .zadd(&keys::queue_zset(), &leased.event.id, priority.score(Utc::now()))
                .await?;
        }

        self.kv
            .compare_and_delete(&keys::lease(&leased.event.id), &leased.lease_token)
            .await?;
        Ok(())
    }

    pub async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.kv.zcard(&keys::queue_zset()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use crate::error::KvError;
    use crate::kv::ScoredMember;

    /// In-memory KvStore double sufficient to exercise queue semantics
    /// without a live Redis instance.
    #[derive(Default)]
    struct FakeKv {
        zsets: Mutex<HashMap<String, Vec<(String, i64)>>>,
        strings: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KvStore for FakeKv {
        async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), KvError> {
            let mut zsets = self.zsets.lock().unwrap();
            let set = zsets.entry(key.to_string()).or_default();
            set.retain(|(m, _)| m != member);
            set.push((member.to_string(), score));
            Ok(())
        }

        async fn zpopmin(&self, key: &str) -> Result<Option<ScoredMember>, KvError> {
            let mut zsets = self.zsets.lock().unwrap();
            let Some(set) = zsets.get_mut(key) else { return Ok(None) };
            if set.is_empty() {
                return Ok(None);
            }
            let idx = set.iter().enumerate().min_by_key(|(_, (_, s))| *s).map(|(i, _)| i).unwrap();
            let (member, score) = set.remove(idx);
            Ok(Some(ScoredMember { member, score }))
        }

        async fn zrem(&self, key: &str, member: &str) -> Result<(), KvError> {
            let mut zsets = self.zsets.lock().unwrap();
            if let Some(set) = zsets.get_mut(key) {
                set.retain(|(m, _)| m != member);
            }
            Ok(())
        }

        async fn zcard(&self, key: &str) -> Result<u64, KvError> {
            Ok(self.zsets.lock().unwrap().get(key).map(|s| s.len()).unwrap_or(0) as u64)
        }

        async fn set_nx_ex(&self, key: &str, value: &str, _ttl_seconds: u64) -> Result<bool, KvError> {
            let mut strings = self.strings.lock().unwrap();
            if strings.contains_key(key) {
                Ok(false)
            } else {
                strings.insert(key.to_string(), value.to_string());
                Ok(true)
            }
        }

        async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, KvError> {
            let mut strings = self.strings.lock().unwrap();
            if strings.get(key).map(String::as_str) == Some(value) {
                strings.remove(key);
                Ok(true)
            } else {
                Ok(false)
            }
        }

        async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
            Ok(self.strings.lock().unwrap().get(key).cloned())
        }

        async fn set_ex(&self, key: &str, value: &str, _ttl_seconds: u64) -> Result<(), KvError> {
            self.strings.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn del(&self, key: &str) -> Result<(), KvError> {
            self.strings.lock().unwrap().remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> Result<bool, KvError> {
            Ok(self.strings.lock().unwrap().contains_key(key))
        }

        async fn incr_with_ttl(&self, key: &str, _ttl_seconds: u64) -> Result<i64, KvError> {
            let mut strings = self.strings.lock().unwrap();
            let entry = strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
            let n: i64 = entry.parse().unwrap_or(0) + 1;
            *entry = n.to_string();
            Ok(n)
        }
    }

    async fn test_queue() -> Queue {
        let db = init_test_db().await.unwrap();
        Queue::new(Arc::new(FakeKv::default()), db, 3, 300)
    }

    #[tokio::test]
    async fn publish_then_consume_returns_event() {
        let queue = test_queue().await;
        queue
            .publish("mail", "new_message", serde_json::json!({}), Priority::Medium, None)
            .await
            .unwrap();
        let leased = queue.consume().await.unwrap().expect("event present");
        assert_eq!(leased.event.source, "mail");
    }

    #[tokio::test]
    async fn higher_priority_pops_before_lower_priority() {
        let queue = test_queue().await;
        queue
            .publish("mail", "low", serde_json::json!({}), Priority::Low, None)
            .await
            .unwrap();
        queue
            .publish("mail", "urgent", serde_json::json!({}), Priority::Critical, None)
            .await
            .unwrap();
        let first = queue.consume().await.unwrap().unwrap();
        assert_eq!(first.event.event_type, "urgent");
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_not_republished() {
        let queue = test_queue().await;
        let id1 = queue
            .publish(
                "ticketing",
                "new_ticket",
                serde_json::json!({}),
                Priority::Medium,
                Some("tk-1".to_string()),
            )
            .await
            .unwrap();
        let id2 = queue
            .publish(
                "ticketing",
                "new_ticket",
                serde_json::json!({}),
                Priority::Medium,
                Some("tk-1".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn nack_under_retry_budget_republishes() {
        let queue = test_queue().await;
        queue
            .publish("mail", "x", serde_json::json!({}), Priority::Medium, None)
            .await
            .unwrap();
        let leased = queue.consume().await.unwrap().unwrap();
        queue.nack(&leased, "transient error").await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);
        let redelivered = queue.consume().await.unwrap().unwrap();
        assert_eq!(redelivered.event.retry_count, 1);
    }

    #[tokio::test]
    async fn nack_past_retry_budget_dead_letters_instead_of_republishing() {
        let queue = test_queue().await;
        queue
            .publish("mail", "x", serde_json::json!({}), Priority::Medium, None)
            .await
            .unwrap();
        for _ in 0..3 {
            let leased = queue.consume().await.unwrap().unwrap();
            queue.nack(&leased, "still failing").await.unwrap();
        }
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ack_releases_lease_and_removes_from_queue() {
        let queue = test_queue().await;
        queue
            .publish("mail", "x", serde_json::json!({}), Priority::Medium, None)
            .await
            .unwrap();
        let leased = queue.consume().await.unwrap().unwrap();
        queue.ack(&leased).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pause_flag_round_trips() {
        let queue = test_queue().await;
        assert!(!queue.is_paused().await.unwrap());
        queue.pause().await.unwrap();
        assert!(queue.is_paused().await.unwrap());
        queue.resume().await.unwrap();
        assert!(!queue.is_paused().await.unwrap());
    }
}
