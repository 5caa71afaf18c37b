//! Troupe platform daemon.
//!
//! Loads brains and the bot roster, connects the database and the agent
//! daemon, registers every bot, and runs ingestion, health polling, and
//! the engagement scheduler until ctrl-c.

mod config;
mod gateway;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_daemon::{AgentClient, DaemonConfig};
use brain_core::BrainStore;
use clap::Parser;
use orchestrator::{
    BotRegistry, ChannelCredentials, ChannelFactory, CommandDispatcher, EngagementScheduler,
    HealthMonitor, IngestProcessor, TurnOrchestrator,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use troupe_database::Database;

use crate::gateway::GatewayChannelFactory;

#[derive(Debug, Parser)]
#[command(name = "botd")]
#[command(about = "Run the Troupe multi-personality bot platform")]
struct Args {
    /// Directory of brain JSON files
    #[arg(long, default_value = "./brains")]
    brains: PathBuf,

    /// Directory of image style profile JSON files
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Bot roster file (JSON)
    #[arg(long, default_value = "./bots.json")]
    bots: PathBuf,

    /// SQLite database URL. Falls back to DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Messaging gateway base URL
    #[arg(long, default_value = "http://localhost:8791")]
    gateway_url: String,

    /// Bot id allowed to serve /restart
    #[arg(long)]
    restart_bot: Option<String>,

    /// Channel liveness poll interval in seconds
    #[arg(long, default_value_t = 60)]
    health_interval_secs: u64,

    /// Engagement scheduler interval in minutes
    #[arg(long, default_value_t = 15)]
    nudge_interval_mins: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut brains = BrainStore::new();
    let loaded = brains.load_dir(&args.brains)?;
    if loaded == 0 {
        return Err(format!("no brains loaded from {}", args.brains.display()).into());
    }
    info!(count = loaded, "brains loaded");
    if let Some(profiles) = &args.profiles {
        let count = brains.load_profiles(profiles)?;
        info!(count, "style profiles loaded");
    }
    let brains = Arc::new(brains);

    let database_url = args
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://troupe.db?mode=rwc".to_string());
    let db = Database::connect(&database_url).await?;
    db.migrate().await?;
    info!(url = %database_url, "database ready");

    let agent = Arc::new(AgentClient::connect(DaemonConfig::from_env()?).await?);
    let factory: Arc<dyn ChannelFactory> =
        Arc::new(GatewayChannelFactory::new(args.gateway_url.clone()));

    let registry = Arc::new(BotRegistry::new());
    let roster = config::load_roster(&args.bots)?;
    for entry in roster {
        if brains.get(&entry.brain_id).is_none() {
            warn!(bot = %entry.bot_id, brain = %entry.brain_id, "unknown brain, skipping bot");
            continue;
        }
        let token = match entry.resolve_token() {
            Ok(token) => token,
            Err(err) => {
                warn!(bot = %entry.bot_id, "skipping bot: {err}");
                continue;
            }
        };
        let credentials = ChannelCredentials {
            identity: entry.identity.clone(),
            token,
        };
        let channel = match factory.create(&credentials).await {
            Ok(channel) => channel,
            Err(err) => {
                warn!(bot = %entry.bot_id, "channel connect failed, skipping bot: {err}");
                continue;
            }
        };
        if let Err(err) = registry
            .register(&entry.bot_id, &entry.brain_id, credentials, channel)
            .await
        {
            warn!(bot = %entry.bot_id, "registration rejected, skipping bot: {err}");
        }
    }

    let bot_ids = registry.bot_ids().await;
    if bot_ids.is_empty() {
        return Err("no bots registered".into());
    }
    info!(count = bot_ids.len(), "bots registered");

    let orchestrator = Arc::new(TurnOrchestrator::new(
        registry.clone(),
        brains.clone(),
        agent.clone(),
        db.clone(),
    ));
    let commands = Arc::new(CommandDispatcher::new(
        registry.clone(),
        brains.clone(),
        db.clone(),
        args.restart_bot.clone(),
    ));

    let mut tasks = Vec::new();
    for bot_id in bot_ids {
        let ingest = IngestProcessor::new(
            registry.clone(),
            orchestrator.clone(),
            commands.clone(),
        );
        tasks.push(tokio::spawn(async move {
            ingest.run(&bot_id).await;
        }));
    }

    let monitor = HealthMonitor::new(
        registry.clone(),
        factory,
        Duration::from_secs(args.health_interval_secs),
    );
    tasks.push(tokio::spawn(async move { monitor.run().await }));

    let scheduler = EngagementScheduler::new(
        registry.clone(),
        brains,
        agent,
        db.clone(),
        Duration::from_secs(args.nudge_interval_mins * 60),
    );
    tasks.push(tokio::spawn(async move { scheduler.run().await }));

    info!("platform running, ctrl-c to stop");
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("signal handling failed: {err}");
    }

    info!("shutting down");
    registry.shutdown().await;
    for task in tasks {
        task.abort();
    }
    db.close().await;

    Ok(())
}
