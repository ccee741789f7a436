//! Operator CLI for the operations agent.
//!
//! Entry point for the `ops-cli` binary. Parses arguments, initializes
//! logging, and dispatches to subcommand handlers. Talks to the same
//! SQLite/Redis stores the worker and server processes share.
mod commands;

use clap::Parser;
use ops_core::config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ops-cli")]
#[command(version)]
#[command(about = "Operator CLI for the operations agent")]
struct Cli {
    /// Path to config.toml
    #[arg(short = 'c', long, global = true, default_value = "~/.ops-agent/config.toml")]
    config: String,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run pending database migrations and exit
    Migrate,
    /// Manually inject an event onto the queue
    InjectEvent(commands::inject_event::InjectEventArgs),
    /// Pause the consumer (events keep queuing, nothing is processed)
    Pause,
    /// Resume a paused consumer
    Resume,
    /// Dead-letter queue operations
    #[command(subcommand)]
    Dlq(commands::dlq::DlqCommand),
    /// Show queue depth, pending approvals, and dead-letter counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("ops_cli=debug,ops_core=debug,info")
    } else {
        EnvFilter::new("ops_cli=info,ops_core=info,warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    if matches!(cli.command, Commands::Migrate) {
        return commands::migrate::execute(&cli.config).await;
    }

    let config = Config::load(Some(&cli.config)).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {e}\n\
             Hint: create a config.toml at {} or run 'ops-cli migrate' against a fresh database first.",
            cli.config
        )
    })?;

    match cli.command {
        Commands::Migrate => unreachable!(),
        Commands::InjectEvent(args) => commands::inject_event::execute(&config, args).await,
        Commands::Pause => commands::queue::pause(&config).await,
        Commands::Resume => commands::queue::resume(&config).await,
        Commands::Dlq(cmd) => commands::dlq::execute(&config, cmd).await,
        Commands::Stats => commands::stats::execute(&config).await,
    }
}
