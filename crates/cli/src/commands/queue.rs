//! Implementation of `ops-cli pause` / `ops-cli resume`.

use ops_core::config::Config;

use super::connect;

pub async fn pause(config: &Config) -> anyhow::Result<()> {
    let (db, queue) = connect(config).await?;
    queue.pause().await?;
    db.close().await;
    eprintln!("Queue paused. New events still enqueue; nothing will be consumed until resumed.");
    Ok(())
}

pub async fn resume(config: &Config) -> anyhow::Result<()> {
    let (db, queue) = connect(config).await?;
    queue.resume().await?;
    db.close().await;
    eprintln!("Queue resumed.");
    Ok(())
}
