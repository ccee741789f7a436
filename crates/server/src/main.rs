//! Webhook/admin server binary.
//!
//! Starts the HTTP surface described in `ops_server::build_router`: health
//! and status probes, provider webhook intake, and the operator admin API.
//! Event consumption and the reasoning loop run in the separate worker
//! binary against the same database and KV store.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ops_core::approvals::ApprovalService;
use ops_core::config::Config;
use ops_core::guardrails::GuardrailEngine;
use ops_core::kv::RedisKvStore;
use ops_core::llm::factory::{create_provider, ModelTier};
use ops_core::patterns::PatternDetector;
use ops_core::queue::Queue;
use ops_core::sandbox::ScriptRunner;
use ops_core::storage;
use ops_server::state::AppState;
use tracing_subscriber::EnvFilter;

/// Operations agent webhook/admin server.
#[derive(Parser)]
#[command(name = "ops-server", version, about)]
struct Cli {
    /// Path to the agent configuration file.
    #[arg(long, default_value = "~/.ops-agent/config.toml")]
    config: String,

    /// Host address to bind to. Overrides the config file's `server.host`.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on. Overrides the config file's `server.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(Some(&cli.config))?;

    let db_path = storage::expand_tilde(&config.storage.db_path);
    tracing::info!(db = %db_path, "opening database");
    let db = storage::init_db(&db_path).await?;

    tracing::info!(url = %config.kv.url, "connecting to kv store");
    let kv: Arc<dyn ops_core::kv::KvStore> = Arc::new(RedisKvStore::connect(&config.kv.url).await?);

    let queue = Arc::new(Queue::new(
        kv.clone(),
        db.clone(),
        config.queue.max_retries,
        config.queue.lease_ttl_seconds,
    ));

    let guardrails = Arc::new(GuardrailEngine::new(kv.clone(), config.guardrails.clone()));
    let sandbox = Arc::new(ScriptRunner::new(config.sandbox.timeout_seconds));
    let patterns = Arc::new(PatternDetector::new(kv.clone()));
    let flash_provider = create_provider(&config.llm, ModelTier::Flash)?;

    let approvals = Arc::new(ApprovalService::new(
        db.clone(),
        guardrails.clone(),
        sandbox.clone(),
        queue.clone(),
        patterns.clone(),
        flash_provider,
    ));

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);

    let state = Arc::new(AppState {
        db,
        kv,
        queue,
        approvals,
        patterns,
        config,
    });

    let router = ops_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host = %host, port, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
