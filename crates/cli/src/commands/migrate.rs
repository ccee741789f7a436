//! Implementation of `ops-cli migrate`.
//!
//! Runs pending SQLite migrations against the configured database and
//! exits. Safe to run repeatedly and before the worker/server processes
//! have ever started.

use ops_core::config::Config;
use ops_core::storage;

pub async fn execute(config_path: &str) -> anyhow::Result<()> {
    let config = Config::load(Some(config_path))?;
    let db_path = storage::expand_tilde(&config.storage.db_path);

    eprintln!("Running migrations against {db_path}...");
    let pool = storage::init_db(&db_path).await?;
    pool.close().await;
    eprintln!("Migrations applied.");
    Ok(())
}
