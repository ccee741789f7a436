//! Implementation of `ops-cli dlq` — list, retry, and resolve dead-lettered
//! events.

use clap::Subcommand;
use ops_core::config::Config;
use ops_core::model::Priority;
use ops_core::storage::dead_letter;

use super::connect;

#[derive(Subcommand)]
pub enum DlqCommand {
    /// List open dead-letter entries
    List,
    /// Republish a dead-lettered event at normal priority with a fresh retry budget
    Retry {
        /// Dead-letter entry id (not the original event id)
        id: String,
    },
    /// Mark a dead-letter entry resolved without republishing
    Resolve {
        /// Dead-letter entry id
        id: String,
        /// Operator identity recorded against the resolution
        #[arg(long, default_value = "operator")]
        resolved_by: String,
    },
}

pub async fn execute(config: &Config, cmd: DlqCommand) -> anyhow::Result<()> {
    let (db, queue) = connect(config).await?;

    match cmd {
        DlqCommand::List => {
            let open = dead_letter::get_open(&db).await?;
            if open.is_empty() {
                eprintln!("No open dead-letter entries.");
            } else {
                for entry in &open {
                    eprintln!(
                        "{} | source={} type={} retries={} | {}",
                        entry.id, entry.source, entry.event_type, entry.retry_count, entry.error_history
                    );
                }
            }
        }
        DlqCommand::Retry { id } => {
            let open = dead_letter::get_open(&db).await?;
            let entry = open
                .into_iter()
                .find(|e| e.id == id)
                .ok_or_else(|| anyhow::anyhow!("dead letter entry {id} not found (or already resolved)"))?;

            let payload: serde_json::Value = serde_json::from_str(&entry.payload).unwrap_or(serde_json::Value::Null);
            let event_id = queue.publish(&entry.source, &entry.event_type, payload, Priority::Medium, None).await?;
            dead_letter::mark_retried(&db, &id).await?;
            eprintln!("Retried {id} as new event {event_id}.");
        }
        DlqCommand::Resolve { id, resolved_by } => {
            dead_letter::resolve(&db, &id, &resolved_by).await?;
            eprintln!("Resolved {id}.");
        }
    }

    db.close().await;
    Ok(())
}
