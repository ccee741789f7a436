//! Key-value / sorted-set / lock / pub-sub abstraction backing the queue,
//! rate limiter, dedup cache, and pause flag.
//!
//! Grounded on the Redis primitives the reference queue implementation
//! uses directly (`ZADD`/`ZPOPMIN`, `SET NX EX`, `INCR`+`EXPIRE`): we wrap
//! them behind a trait so the rest of the crate depends on behavior, not
//! on a concrete client.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::KvError;

/// One entry popped from a sorted set: its member and score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// `ZADD key score member`.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), KvError>;

    /// `ZPOPMIN key` — pops and returns the lowest-scored member, if any.
    async fn zpopmin(&self, key: &str) -> Result<Option<ScoredMember>, KvError>;

    /// `ZREM key member`.
    async fn zrem(&self, key: &str, member: &str) -> Result<(), KvError>;

    /// `ZCARD key`.
    async fn zcard(&self, key: &str) -> Result<u64, KvError>;

    /// `SET key value EX ttl_seconds NX` — returns true if the lock was
    /// acquired, false if it was already held.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, KvError>;

    /// Release a lock only if `value` still matches what's stored
    /// (compare-and-delete, avoids releasing a lock acquired by someone
    /// else after ours expired).
    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, KvError>;

    /// `GET key`.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// `SET key value EX ttl_seconds`.
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), KvError>;

    /// `DEL key`.
    async fn del(&self, key: &str) -> Result<(), KvError>;

    /// `EXISTS key`.
    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Atomically increment a counter, setting its TTL only on the first
    /// increment (when the key did not previously exist). Returns the new
    /// value. This is the sliding-window rate-limit primitive.
    async fn incr_with_ttl(&self, key: &str, ttl_seconds: u64) -> Result<i64, KvError>;
}

/// In-memory `KvStore` double sufficient to exercise queue, guardrail,
/// and session semantics without a live Redis instance.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Default)]
pub struct FakeKvStore {
    zsets: std::sync::Mutex<std::collections::HashMap<String, Vec<(String, i64)>>>,
    strings: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(any(test, feature = "test-helpers"))]
#[async_trait]
impl KvStore for FakeKvStore {
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

/// Redis-backed implementation.
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zpopmin(&self, key: &str) -> Result<Option<ScoredMember>, KvError> {
        let mut conn = self.conn.clone();
        let result: Vec<(String, i64)> = conn.zpopmin(key, 1).await?;
        Ok(result.into_iter().next().map(|(member, score)| ScoredMember { member, score }))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.zrem(key, member).await?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<u64, KvError> {
        let mut conn = self.conn.clone();
        let n: u64 = conn.zcard(key).await?;
        Ok(n)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl_seconds as usize));
        let result: Option<String> = conn.set_options(key, value, opts).await?;
        Ok(result.is_some())
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        // Lua script keeps the compare-then-delete atomic: a lock we
        // think we hold may have already expired and been re-acquired by
        // someone else.
        let script = redis::Script::new(
            r"
            if redis.call('get', KEYS[1]) == ARGV[1] then
                return redis.call('del', KEYS[1])
            else
                return 0
            end
            ",
        );
        let deleted: i32 = script.key(key).arg(value).invoke_async(&mut conn).await?;
        Ok(deleted == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn incr_with_ttl(&self, key: &str, ttl_seconds: u64) -> Result<i64, KvError> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(
            r"
            local count = redis.call('incr', KEYS[1])
            if count == 1 then
                redis.call('expire', KEYS[1], ARGV[1])
            end
            return count
            ",
        );
        let count: i64 = script.key(key).arg(ttl_seconds).invoke_async(&mut conn).await?;
        Ok(count)
    }
}

/// Key conventions shared across modules.
pub mod keys {
    pub fn event_payload(event_id: &str) -> String {
        format!("event:{event_id}")
    }
    pub fn queue_zset() -> String {
        "queue:pending".to_string()
    }
    pub fn lease(event_id: &str) -> String {
        format!("lease:{event_id}")
    }
    pub fn dedup(idempotency_key: &str) -> String {
        format!("dedup:{idempotency_key}")
    }
    pub fn rate_limit(tool: &str, window: &str) -> String {
        format!("ratelimit:{tool}:{window}")
    }
    pub fn pause_flag() -> String {
        "queue:paused".to_string()
    }
    pub fn pattern_cooldown(kind: &str, group_key: &str) -> String {
        format!("pattern_cooldown:{kind}:{group_key}")
    }
    pub fn session_lock(session_key: &str) -> String {
        format!("session_lock:{session_key}")
    }
    pub fn drive_folder_snapshot(folder_id: &str) -> String {
        format!("drive:folder_files:{folder_id}")
    }
}
