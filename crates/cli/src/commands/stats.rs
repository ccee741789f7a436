//! Implementation of `ops-cli stats`.
//!
//! Prints the same at-a-glance counters as the server's `/admin/status`
//! route, for operators who'd rather not curl the admin API.

use ops_core::config::Config;
use ops_core::storage::{action_log, dead_letter, drafts, proposals};

use super::connect;

pub async fn execute(config: &Config) -> anyhow::Result<()> {
    let (db, queue) = connect(config).await?;

    let depth = queue.depth().await?;
    let paused = queue.is_paused().await?;
    let pending_drafts = drafts::get_pending(&db).await?.len();
    let pending_proposals = proposals::get_pending(&db).await?.len();
    let dlq_open = dead_letter::get_open(&db).await?.len();
    let last_action = action_log::most_recent(&db).await?;

    eprintln!();
    eprintln!("=== Operations Agent Status ===");
    eprintln!("  Queue depth:        {depth}");
    eprintln!("  Paused:             {paused}");
    eprintln!("  Pending drafts:     {pending_drafts}");
    eprintln!("  Pending proposals:  {pending_proposals}");
    eprintln!("  Open DLQ entries:   {dlq_open}");
    match last_action {
        Some((tool, at)) => eprintln!("  Last action:        {tool} @ {at}"),
        None => eprintln!("  Last action:        none recorded"),
    }
    eprintln!();

    db.close().await;
    Ok(())
}
