//! Implementation of `ops-cli inject-event`.
//!
//! Publishes a manually-authored event onto the queue, for replaying a
//! captured webhook payload or seeding a demo/test event without waiting
//! on a poller.

use clap::Args;
use ops_core::config::Config;
use ops_core::model::Priority;

use super::connect;

#[derive(Args)]
pub struct InjectEventArgs {
    /// Event source (mail, chat, ticketing, survey, project_management, drive)
    #[arg(long)]
    source: String,

    /// Event type, e.g. "new_message" or "ticket_updated"
    #[arg(long)]
    event_type: String,

    /// JSON payload, e.g. '{"subject":"..."}'
    #[arg(long, default_value = "{}")]
    payload: String,

    /// Priority: critical, high, medium, low, background
    #[arg(long, default_value = "medium")]
    priority: String,

    /// Idempotency key; a second inject with the same key is a no-op
    #[arg(long)]
    idempotency_key: Option<String>,
}

fn parse_priority(value: &str) -> anyhow::Result<Priority> {
    match value {
        "critical" => Ok(Priority::Critical),
        "high" => Ok(Priority::High),
        "medium" | "normal" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        "background" => Ok(Priority::Background),
        other => anyhow::bail!("unknown priority '{other}' (expected critical, high, medium, low, or background)"),
    }
}

pub async fn execute(config: &Config, args: InjectEventArgs) -> anyhow::Result<()> {
    let payload: serde_json::Value = serde_json::from_str(&args.payload)
        .map_err(|e| anyhow::anyhow!("payload is not valid JSON: {e}"))?;
    let priority = parse_priority(&args.priority)?;

    let (db, queue) = connect(config).await?;
    let event_id = queue.publish(&args.source, &args.event_type, payload, priority, args.idempotency_key).await?;
    db.close().await;

    eprintln!("Injected event {event_id} (source={}, type={})", args.source, args.event_type);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_priorities() {
        assert!(matches!(parse_priority("low").unwrap(), Priority::Low));
        assert!(matches!(parse_priority("critical").unwrap(), Priority::Critical));
        assert!(matches!(parse_priority("background").unwrap(), Priority::Background));
    }

    #[test]
    fn rejects_unknown_priority() {
        assert!(parse_priority("urgent").is_err());
    }
}
