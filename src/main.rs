// Relaybot - Main Entry Point
//
// CLI for the chat bot usage governor:
// - run: console transport (JSON lines on stdin/stdout)
// - register / status / premium: store administration
// - check-config: print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relaybot::config::Config;
use relaybot::governor::SessionGovernor;
use relaybot::integration::WebhookSink;
use relaybot::metrics_server::start_metrics_server;
use relaybot::rate_limit::RateLimiter;
use relaybot::router::MessageRouter;
use relaybot::store::{FileStore, MemoryStore, QuotaStore};
use relaybot::telemetry;
use relaybot::transport::{ConsoleClient, ConsoleReader};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Relaybot: rate limits, integration sessions and daily quotas for a chat bot
#[derive(Parser, Debug)]
#[command(name = "relaybot")]
#[command(author = "Relaybot Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Chat bot usage governor", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Route JSON-line messages from stdin, write actions to stdout
    Run,
    /// Register an identity
    Register {
        identity: String,
    },
    /// Show quota and session status for an identity
    Status {
        identity: String,
    },
    /// Upgrade an identity to premium
    Premium {
        identity: String,

        /// Daily limit instead of the configured premium limit
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Validate and print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::from_env()?,
    };

    telemetry::init(&config.logging, args.verbose)?;
    // Logged only once the subscriber exists
    match &args.config {
        Some(path) if path.exists() => info!("Loaded configuration from {:?}", path),
        Some(path) => info!("Config file not found at {:?}, using defaults", path),
        None => debug!("No config file given, using defaults"),
    }

    match args.command {
        Commands::Run => run(config).await?,
        Commands::Register { identity } => {
            let governor = governor(&config).await?;
            let user = governor.register(&identity).await?;
            println!("Registered {}", user.identity);
        }
        Commands::Status { identity } => {
            let governor = governor(&config).await?;
            let status = governor.status_for_user(&identity).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Premium { identity, limit } => {
            let governor = governor(&config).await?;
            let session = governor.upgrade_to_premium(&identity, limit).await?;
            println!(
                "Upgraded {} to premium (daily limit {})",
                identity, session.daily_limit
            );
        }
        Commands::CheckConfig => {
            let text = toml::to_string_pretty(&config).context("Failed to render config")?;
            println!("{}", text);
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn QuotaStore>> {
    match &config.store.path {
        Some(path) => {
            let store = FileStore::open(path)
                .await
                .with_context(|| format!("Failed to open store at {:?}", path))?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("No store path configured, records are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn governor(config: &Config) -> Result<SessionGovernor> {
    let store = open_store(config).await?;
    Ok(SessionGovernor::new(store, config.governor.clone()))
}

async fn run(config: Config) -> Result<()> {
    info!("Relaybot v{} starting...", env!("CARGO_PKG_VERSION"));

    let governor = governor(&config).await?;
    let limiter = RateLimiter::new(config.rate_limit.clone());
    let sweeper = limiter.spawn_sweeper();

    if config.metrics.enabled {
        let port = config.metrics.port;
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port).await {
                error!("Metrics server stopped: {:#}", e);
            }
        });
    }

    let sink = Arc::new(WebhookSink::new(config.integration.clone()));
    let client = Arc::new(ConsoleClient::stdout());
    let router = MessageRouter::new(config.router.clone(), limiter, governor, sink, client);

    let mut reader = ConsoleReader::new(BufReader::new(tokio::io::stdin()));
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            next = reader.next_message() => {
                let Some(message) = next? else {
                    info!("Input closed");
                    break;
                };
                let router = router.clone();
                tasks.spawn(async move {
                    router.handle(&message).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }

        while tasks.try_join_next().is_some() {}
    }

    // Let in-flight messages finish
    while tasks.join_next().await.is_some() {}
    sweeper.abort();

    info!("Relaybot stopped");
    Ok(())
}
