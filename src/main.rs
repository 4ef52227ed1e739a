mod bridge;
mod config;
mod dedup;
mod filter;
mod platform;
mod registry;
mod relay;
mod scheduler;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dedup::DedupTracker;
use crate::filter::KeywordFilter;
use crate::platform::account::TelegramAccount;
use crate::platform::telegram::TelegramBot;
use crate::platform::AccountClient;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hybrid_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".env"));

    info!("Loading configuration from: {}", env_path.display());
    let config = Config::load(&env_path)
        .with_context(|| format!("Failed to load config from {}", env_path.display()))?;

    info!("Starting hybrid Telegram monitor...");

    let (account, created) = TelegramAccount::connect(&config).await?;
    info!("Client connected.");

    let operator_id = account.me().await?;
    info!("Your chat ID: {}", operator_id);

    if config::should_persist(created, &config) {
        config::persist_session(&config.env_path, &account.session_string())?;
        info!("✓ Session string saved to {}", config.env_path.display());
    }

    let account = Arc::new(account);
    let bot = TelegramBot::new(&config.bot_token);
    let dedup = Arc::new(DedupTracker::new(config.dedup.max_entries));

    let relay = match bridge::assemble(
        operator_id,
        &config.monitored_chats,
        KeywordFilter::new(&config.filter_keywords),
        dedup.clone(),
        account.clone(),
        Arc::new(bot.clone()),
    )
    .await
    {
        Ok(relay) => Arc::new(relay),
        Err(e) => {
            error!("✗ {:#}", e);
            std::process::exit(1);
        }
    };

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_dedup_sweep(&scheduler, &config.dedup.sweep_schedule, dedup)
        .await?;
    scheduler.start().await?;

    let (bot_tx, bot_rx) = mpsc::unbounded_channel();
    let (account_tx, account_rx) = mpsc::unbounded_channel();
    tokio::spawn(relay::run_bot_flow(relay.clone(), bot_rx));
    tokio::spawn(relay::run_account_flow(relay.clone(), account_rx));

    let chats: HashSet<i64> = relay.monitored.ids().collect();
    let pump_account = account.clone();
    let pump = tokio::spawn(async move {
        pump_account.pump_updates(chats, account_tx).await;
    });
    let (polling, _polling_task) = bot.start_polling(bot_tx);

    info!("Bot and monitor running... Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Stopping...");

    if polling.shutdown().is_err() {
        warn!("Bot polling was not running");
    }
    pump.abort();
    if let Err(e) = scheduler.shutdown().await {
        warn!("{:#}", e);
    }

    Ok(())
}
