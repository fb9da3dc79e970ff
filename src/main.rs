use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;

use queuebot::cli::{Cli, Commands};
use queuebot::core::config::{self, Config};
use queuebot::core::disk::{DiskGuard, start_reconcile_task};
use queuebot::core::init_logger;
use queuebot::core::logging::{check_external_tools, log_startup_configuration};
use queuebot::download::extractor::Extractor;
use queuebot::download::progress::Messenger;
use queuebot::download::uploader::Uploader;
use queuebot::download::{ProxyRotator, QueueProcessor, YtDlpExtractor};
use queuebot::storage::{SettingsStore, SubscriptionStore, create_pool};
use queuebot::telegram::{
    HandlerDeps, TelegramMessenger, TelegramUploader, create_bot, schema, setup_bot_commands,
};
use queuebot::watcher::{SubscriptionMonitor, start_monitor};

/// Main entry point for the Telegram bot
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
/// A malformed configuration is logged before the process exits.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let loaded = Config::from_env();
    let log_path = loaded
        .as_ref()
        .map(|c| c.log_file_path.clone())
        .unwrap_or_else(|_| PathBuf::from(config::DEFAULT_LOG_FILE));
    init_logger(&log_path)?;

    let config = match loaded {
        Ok(config) => Arc::new(config),
        Err(e) => {
            log::error!("❌ Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Some(Commands::CheckConfig) => {
            log_startup_configuration(&config);
            check_external_tools(&config);
            log::info!("✅ Configuration is valid");
            Ok(())
        }
        Some(Commands::Run) | None => run_bot(config).await,
    }
}

async fn run_bot(config: Arc<Config>) -> Result<()> {
    log::info!("Starting bot...");
    log_startup_configuration(&config);
    check_external_tools(&config);

    let pool = create_pool(&config.database_path)?;

    let disk = Arc::new(DiskGuard::new(config.download_root.clone(), config.disk_limit_bytes));
    std::fs::create_dir_all(disk.root())?;
    match disk.purge_stale_jobs() {
        Ok(0) => {}
        Ok(n) => log::info!("🧹 Removed {} leftover job directories", n),
        Err(e) => log::warn!("Failed to purge leftover job directories: {}", e),
    }
    if let Err(e) = disk.reconcile() {
        log::warn!("Failed to measure download directory: {}", e);
    }
    let reconcile_task = start_reconcile_task(Arc::clone(&disk), config.disk_reconcile_interval);

    let proxies = ProxyRotator::from_urls(&config.proxies)?;
    log::info!("🌐 {} proxy option(s) in rotation", proxies.len());

    let bot = create_bot(&config)?;
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot.clone()));
    let uploader: Arc<dyn Uploader> = Arc::new(TelegramUploader::from_config(bot.clone(), &config));
    let extractor: Arc<dyn Extractor> = Arc::new(YtDlpExtractor::from_config(&config));

    let shutdown = CancellationToken::new();

    let queue = Arc::new(
        QueueProcessor::new(
            Arc::clone(&disk),
            proxies,
            Arc::clone(&extractor),
            uploader,
            Arc::clone(&messenger),
        )
        .with_progress_settings(config.progress),
    );
    let worker = queue.start(shutdown.clone());

    let monitor = Arc::new(SubscriptionMonitor::from_config(
        &config,
        SubscriptionStore::new(pool.clone()),
        extractor,
        Arc::clone(&queue),
        messenger,
    ));
    let monitor_task = start_monitor(
        Arc::clone(&monitor),
        config.subscription_poll_interval,
        config::subscription::initial_delay(),
        shutdown.clone(),
    );

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let deps = HandlerDeps::new(
        Arc::clone(&config),
        Arc::clone(&queue),
        monitor,
        SettingsStore::new(pool),
    );

    log::info!("🚀 Bot is up, waiting for updates");
    Dispatcher::builder(bot, schema(deps))
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Shutting down: cancelling the active job and stopping background tasks");
    shutdown.cancel();
    if let Err(e) = worker.await {
        log::error!("Queue worker ended abnormally: {}", e);
    }
    if let Err(e) = monitor_task.await {
        log::error!("Subscription monitor ended abnormally: {}", e);
    }
    reconcile_task.abort();

    log::info!("Bye");
    Ok(())
}
