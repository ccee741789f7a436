pub mod dlq;
pub mod inject_event;
pub mod migrate;
pub mod queue;
pub mod stats;

use std::sync::Arc;

use ops_core::config::Config;
use ops_core::kv::{KvStore, RedisKvStore};
use ops_core::queue::Queue;
use ops_core::storage::{self, DbPool};

/// Connects to the same durable store and work queue the worker/server
/// processes use, so operator commands observe and mutate live state.
pub async fn connect(config: &Config) -> anyhow::Result<(DbPool, Arc<Queue>)> {
    let db_path = storage::expand_tilde(&config.storage.db_path);
    let db = storage::init_db(&db_path).await?;
    let kv: Arc<dyn KvStore> = Arc::new(RedisKvStore::connect(&config.kv.url).await?);
    let queue = Arc::new(Queue::new(kv, db.clone(), config.queue.max_retries, config.queue.lease_ttl_seconds));
    Ok((db, queue))
}
