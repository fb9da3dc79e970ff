//! Logging initialization and startup diagnostics

use std::fs::File;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use simplelog::*;

use crate::core::config::Config;
use crate::core::utils::format_bytes;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file (parent directories are created)
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to create the file or install the logger
pub fn init_logger(log_file_path: &Path) -> Result<()> {
    if let Some(parent) = log_file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            simplelog::Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, simplelog::Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective configuration at startup. Secrets are never printed.
pub fn log_startup_configuration(config: &Config) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("⚙️  Configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    match &config.bot_api_url {
        Some(url) => log::info!("🌐 Bot API: {} (local: {})", url, config.uses_local_bot_api()),
        None => log::info!("🌐 Bot API: public"),
    }
    log::info!("📦 Upload limit: {}", format_bytes(config.upload_limit_bytes));

    if config.allowed_chat_ids.is_empty() {
        log::warn!("🔓 ALLOWED_CHAT_IDS is empty, every chat may use the bot");
    } else {
        log::info!("🔒 Allowed chats: {}", config.allowed_chat_ids.len());
    }

    if config.proxies.is_empty() {
        log::info!("🔌 Proxies: none, direct connection only");
    } else {
        log::info!("🔌 Proxies: {} configured", config.proxies.len());
    }

    if config.disk_limit_bytes == 0 {
        log::info!("💾 Disk ceiling: unlimited ({})", config.download_root.display());
    } else {
        log::info!(
            "💾 Disk ceiling: {} ({})",
            format_bytes(config.disk_limit_bytes),
            config.download_root.display()
        );
    }

    log::info!(
        "🔔 Subscription poll every {}s, {} latest videos per channel",
        config.subscription_poll_interval.as_secs(),
        config.subscription_scan_depth
    );
}

/// Warns early when the external tools are missing from PATH.
///
/// The bot still starts; every download will then fail with a readable reason.
pub fn check_external_tools(config: &Config) {
    let tools = [
        ("yt-dlp", &config.ytdlp_bin, "--version"),
        ("ffmpeg", &config.ffmpeg_bin, "-version"),
    ];
    for (name, bin, flag) in tools {
        match Command::new(bin).arg(flag).output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                log::info!("✅ {}: {}", name, version.lines().next().unwrap_or("unknown").trim());
            }
            Ok(output) => log::warn!("⚠️  {} ({}) exited with {}", name, bin, output.status),
            Err(e) => log::error!("❌ {} ({}) is not runnable: {}", name, bin, e),
        }
    }
}
