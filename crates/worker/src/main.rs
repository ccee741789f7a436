mod consumer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ops_core::alerts::{AlertSink, ChatWebhookAlertSink, NoopAlertSink};
use ops_core::classifier::Classifier;
use ops_core::config::Config;
use ops_core::context::ContextEngine;
use ops_core::guardrails::GuardrailEngine;
use ops_core::kv::RedisKvStore;
use ops_core::llm::factory::{create_embedding_provider, create_provider, ModelTier};
use ops_core::patterns::PatternDetector;
use ops_core::pollers::{
    ChatPoller, DrivePoller, MailPoller, NullSourceClient, ProjectManagementPoller, SourcePoller, SurveyPoller,
    TicketingPoller,
};
use ops_core::queue::Queue;
use ops_core::reasoning::ReasoningEngine;
use ops_core::sandbox::ScriptRunner;
use ops_core::scheduler::Scheduler;
use ops_core::sessions::SessionManager;
use ops_core::storage;
use ops_core::tools::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::consumer::Consumer;

#[derive(Parser)]
#[command(name = "ops-worker", version, about)]
struct Cli {
    #[arg(long, default_value = "~/.ops-agent/config.toml")]
    config: String,
}

/// How often the worker checks for sessions that have gone idle past
/// their source's cutoff.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(Some(&cli.config))?;

    let db_path = storage::expand_tilde(&config.storage.db_path);
    let db = storage::init_db(&db_path).await?;
    let kv: Arc<dyn ops_core::kv::KvStore> = Arc::new(RedisKvStore::connect(&config.kv.url).await?);

    let alert_sink: Arc<dyn AlertSink> = if config.webhook.alert_webhook_url.is_empty() {
        Arc::new(NoopAlertSink)
    } else {
        Arc::new(ChatWebhookAlertSink::new(config.webhook.alert_webhook_url.clone()))
    };
    let queue = Arc::new(
        Queue::new(kv.clone(), db.clone(), config.queue.max_retries, config.queue.lease_ttl_seconds)
            .with_alert_sink(alert_sink),
    );

    let guardrails = Arc::new(GuardrailEngine::new(kv.clone(), config.guardrails.clone()));
    let consumer_guardrails = guardrails.clone();
    let sandbox = Arc::new(ScriptRunner::new(config.sandbox.timeout_seconds));

    let mut tool_registry = ToolRegistry::new(guardrails.clone(), config.tools.clone());
    tool_registry.load_dynamic_tools(&db, sandbox.clone()).await?;
    tool_registry.connect_mcp_servers().await;
    let tool_registry = Arc::new(tool_registry);

    let fast_provider = create_provider(&config.llm, ModelTier::Fast)?;
    let moderate_provider = create_provider(&config.llm, ModelTier::Moderate)?;
    let pro_provider = create_provider(&config.llm, ModelTier::Pro)?;
    let flash_provider = create_provider(&config.llm, ModelTier::Flash)?;

    let classifier = Arc::new(Classifier::new(fast_provider.clone()));
    let embedding_provider = create_embedding_provider(&config.embedding)?;
    let context_engine = Arc::new(ContextEngine::new(db.clone(), embedding_provider, config.sessions.max_tokens));
    let reasoning = Arc::new(ReasoningEngine::new(
        db.clone(),
        tool_registry,
        guardrails,
        fast_provider,
        moderate_provider,
        pro_provider,
        config.llm.max_turns,
    ));

    let session_manager = Arc::new(SessionManager::new(db.clone(), kv.clone(), flash_provider, config.sessions.clone()));

    let pollers: Vec<Arc<dyn SourcePoller>> = vec![
        Arc::new(MailPoller::new(Arc::new(NullSourceClient))),
        Arc::new(ChatPoller::new(Arc::new(NullSourceClient))),
        Arc::new(TicketingPoller::new(Arc::new(NullSourceClient))),
        Arc::new(SurveyPoller::new(Arc::new(NullSourceClient))),
        Arc::new(ProjectManagementPoller::new(Arc::new(NullSourceClient))),
        Arc::new(DrivePoller::new(Arc::new(NullSourceClient), kv.clone())),
    ];
    let pattern_detector = Arc::new(PatternDetector::new(kv.clone()));
    let scheduler = Scheduler::new(
        pollers,
        queue.clone(),
        pattern_detector,
        db.clone(),
        config.scheduler.heartbeat_interval_seconds,
        config.scheduler.pattern_detection_every_n_ticks,
        config.scheduler.feedback_analysis_every_n_ticks,
        config.scheduler.brief_minute,
    );

    let cancel = CancellationToken::new();

    let scheduler_handle = tokio::spawn(scheduler.run_until_shutdown(cancel.clone()));

    let consumer = Consumer::new(db.clone(), queue, classifier, context_engine, consumer_guardrails, reasoning);
    let consumer_cancel = cancel.clone();
    let consumer_handle = tokio::spawn(async move { consumer.run_until_shutdown(consumer_cancel).await });

    let session_cancel = cancel.clone();
    let session_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = session_cancel.cancelled() => {
                    tracing::info!("session sweep shutting down");
                    return;
                }
                () = tokio::time::sleep(SESSION_SWEEP_INTERVAL) => {
                    match session_manager.expire_idle().await {
                        Ok(count) if count > 0 => tracing::info!(count, "expired idle sessions"),
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "session idle sweep failed"),
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    cancel.cancel();

    let _ = tokio::join!(scheduler_handle, consumer_handle, session_handle);
    Ok(())
}
