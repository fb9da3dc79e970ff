//! Command and plain-message handlers

use std::fmt;

use indoc::formatdoc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, Message, ReplyParameters};
use teloxide::utils::command::BotCommands;
use url::Url;

use super::types::{HandlerDeps, HandlerError};
use crate::core::error::AppError;
use crate::download::job::{JobId, JobRequest, Quality};
use crate::download::queue::Enqueued;
use crate::download::ytdlp::is_playlist_url;
use crate::storage::settings::{DownloadMode, UserSettings};
use crate::telegram::bot::Command;
use crate::telegram::callbacks::CallbackAction;

/// Quality used by /subscribe and /playlist without an explicit one
const DEFAULT_LIST_QUALITY: Quality = Quality::P720;

/// Why command arguments were rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    MissingUrl,
    UnknownQuality(String),
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgError::MissingUrl => write!(f, "Please add a link, e.g. /720 https://youtu.be/..."),
            ArgError::UnknownQuality(q) => {
                write!(f, "Unknown quality '{}'. Use 1080, 720, 480, 360, 240 or audio.", q)
            }
        }
    }
}

/// First http(s) URL in `text`, as typed
pub fn extract_url(text: &str) -> Option<String> {
    text.split_whitespace().find_map(|token| {
        let url = Url::parse(token).ok()?;
        matches!(url.scheme(), "http" | "https").then(|| token.to_string())
    })
}

/// `<url>` for the single-video commands
pub fn parse_download_args(args: &str) -> Result<String, ArgError> {
    extract_url(args).ok_or(ArgError::MissingUrl)
}

/// `<url> [quality]` for /subscribe and /playlist
pub fn parse_subscribe_args(args: &str) -> Result<(String, Quality), ArgError> {
    let mut tokens = args.split_whitespace();
    let url = tokens.next().and_then(extract_url).ok_or(ArgError::MissingUrl)?;
    let quality = match tokens.next() {
        Some(raw) => Quality::parse(raw).ok_or_else(|| ArgError::UnknownQuality(raw.to_string()))?,
        None => DEFAULT_LIST_QUALITY,
    };
    Ok((url, quality))
}

/// Optional job id after /cancel
pub fn parse_cancel_arg(args: &str) -> Option<JobId> {
    args.split_whitespace()
        .next()
        .map(|s| s.trim_start_matches('#'))
        .and_then(|s| s.parse().ok())
        .map(JobId)
}

fn help_text() -> String {
    formatdoc! {"
        {commands}

        Or just send a link: it is downloaded with your /settings.
        Downloads run one at a time; /cancel stops yours.",
        commands = Command::descriptions()
    }
}

/// Inline keyboard for /settings with the current choice ticked
pub(super) fn settings_keyboard(settings: &UserSettings) -> InlineKeyboardMarkup {
    let tick = |selected: bool, label: String| if selected { format!("✅ {}", label) } else { label };

    let modes = vec![
        InlineKeyboardButton::callback(
            tick(settings.download_mode == DownloadMode::Video, "🎬 Video".to_string()),
            CallbackAction::Mode(DownloadMode::Video).to_data(),
        ),
        InlineKeyboardButton::callback(
            tick(settings.download_mode == DownloadMode::Audio, "🎵 Audio".to_string()),
            CallbackAction::Mode(DownloadMode::Audio).to_data(),
        ),
    ];
    let resolutions = Quality::VIDEO
        .iter()
        .filter_map(|q| q.height())
        .map(|h| {
            InlineKeyboardButton::callback(
                tick(settings.resolution == h, format!("{}p", h)),
                CallbackAction::Resolution(h).to_data(),
            )
        })
        .collect();
    InlineKeyboardMarkup::new(vec![modes, resolutions])
}

async fn reply(bot: &Bot, msg: &Message, text: impl Into<String>) -> Result<(), HandlerError> {
    bot.send_message(msg.chat.id, text)
        .reply_parameters(ReplyParameters::new(msg.id).allow_sending_without_reply())
        .await?;
    Ok(())
}

/// Queues a job and sends the acknowledgement the worker will later edit.
pub(super) async fn enqueue_and_ack(deps: &HandlerDeps, request: JobRequest) -> Enqueued {
    deps.queue.enqueue_and_announce(request).await
}

/// Dispatches a parsed command.
pub(super) async fn handle_command(bot: &Bot, msg: &Message, cmd: Command, deps: &HandlerDeps) -> Result<(), HandlerError> {
    log::info!("🎯 Received command: {:?} from chat {}", cmd, msg.chat.id);

    match cmd {
        Command::Start | Command::Help => reply(bot, msg, help_text()).await,
        Command::Q1080(args) => handle_download(bot, msg, deps, &args, Quality::P1080).await,
        Command::Q720(args) => handle_download(bot, msg, deps, &args, Quality::P720).await,
        Command::Q480(args) => handle_download(bot, msg, deps, &args, Quality::P480).await,
        Command::Q360(args) => handle_download(bot, msg, deps, &args, Quality::P360).await,
        Command::Q240(args) => handle_download(bot, msg, deps, &args, Quality::P240).await,
        Command::Music(args) => handle_download(bot, msg, deps, &args, Quality::Audio).await,
        Command::Playlist(args) => handle_playlist(bot, msg, deps, &args).await,
        Command::Subscribe(args) => handle_subscribe(bot, msg, deps, &args).await,
        Command::Unsubscribe(args) => handle_unsubscribe(bot, msg, deps, &args).await,
        Command::Subscriptions | Command::Subs => handle_list_subscriptions(bot, msg, deps).await,
        Command::Settings => handle_settings(bot, msg, deps).await,
        Command::Cancel(args) => handle_cancel(bot, msg, deps, &args).await,
    }
}

async fn handle_download(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    args: &str,
    quality: Quality,
) -> Result<(), HandlerError> {
    let url = match parse_download_args(args) {
        Ok(url) => url,
        Err(e) => return reply(bot, msg, e.to_string()).await,
    };
    let request = if quality.is_audio() {
        JobRequest::audio(msg.chat.id, url)
    } else {
        JobRequest::video(msg.chat.id, url, quality)
    };
    enqueue_and_ack(deps, request.reply_to(msg.id.0)).await;
    Ok(())
}

async fn handle_playlist(bot: &Bot, msg: &Message, deps: &HandlerDeps, args: &str) -> Result<(), HandlerError> {
    let (url, quality) = match parse_subscribe_args(args) {
        Ok(parsed) => parsed,
        Err(e) => return reply(bot, msg, e.to_string()).await,
    };
    enqueue_and_ack(deps, JobRequest::playlist(msg.chat.id, url, quality).reply_to(msg.id.0)).await;
    Ok(())
}

async fn handle_subscribe(bot: &Bot, msg: &Message, deps: &HandlerDeps, args: &str) -> Result<(), HandlerError> {
    let (url, quality) = match parse_subscribe_args(args) {
        Ok(parsed) => parsed,
        Err(ArgError::MissingUrl) => {
            return reply(bot, msg, "Usage: /subscribe <channel url> [quality]").await;
        }
        Err(e) => return reply(bot, msg, e.to_string()).await,
    };

    let text = match deps.monitor.subscribe(msg.chat.id.0, &url, quality).await {
        Ok(sub) => format!(
            "✅ Subscribed to {}. New videos will be downloaded in {}.",
            sub.channel_name, sub.quality
        ),
        Err(AppError::AlreadySubscribed(name)) => format!("ℹ️ You are already subscribed to {}.", name),
        Err(AppError::SubscriptionList { reason, .. }) => {
            format!("❌ Could not read that channel: {}", reason.lines().next().unwrap_or_default())
        }
        Err(e) => {
            log::error!("Subscribe failed for chat {}: {}", msg.chat.id, e);
            "❌ Something went wrong, please try again later.".to_string()
        }
    };
    reply(bot, msg, text).await
}

async fn handle_unsubscribe(bot: &Bot, msg: &Message, deps: &HandlerDeps, args: &str) -> Result<(), HandlerError> {
    let Some(target) = args.split_whitespace().next() else {
        return reply(bot, msg, "Usage: /unsubscribe <channel url>").await;
    };
    let text = match deps.monitor.unsubscribe(msg.chat.id.0, target).await? {
        Some(sub) => format!("🗑 Unsubscribed from {}.", sub.channel_name),
        None => "You are not subscribed to that channel. See /subscriptions.".to_string(),
    };
    reply(bot, msg, text).await
}

async fn handle_list_subscriptions(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let subs = deps.monitor.store().list_for_chat(msg.chat.id.0)?;
    if subs.is_empty() {
        return reply(bot, msg, "You have no subscriptions. Use /subscribe <channel url>.").await;
    }
    let mut text = String::from("📺 Your subscriptions:\n");
    for (i, sub) in subs.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} ({}, since {})\n{}",
            i + 1,
            sub.channel_name,
            sub.quality,
            sub.created_at.format("%Y-%m-%d"),
            sub.channel_url
        ));
    }
    reply(bot, msg, text).await
}

async fn handle_settings(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let settings = deps.settings.get(msg.chat.id.0)?;
    bot.send_message(msg.chat.id, "⚙️ Plain links are downloaded as:")
        .reply_markup(settings_keyboard(&settings))
        .await?;
    Ok(())
}

async fn handle_cancel(bot: &Bot, msg: &Message, deps: &HandlerDeps, args: &str) -> Result<(), HandlerError> {
    let cancelled = match parse_cancel_arg(args) {
        Some(id) if deps.queue.owner_of(id).await == Some(msg.chat.id) => deps.queue.cancel(id).await.then_some(id),
        Some(_) => None,
        None => deps.queue.cancel_latest_for_chat(msg.chat.id).await,
    };
    let text = match cancelled {
        Some(id) => format!("🛑 Cancelling download #{}.", id),
        None => "Nothing to cancel.".to_string(),
    };
    reply(bot, msg, text).await
}

/// A message that is not a command: download the first link in it.
pub(super) async fn handle_text_message(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(url) = extract_url(text) else {
        if msg.chat.is_private() {
            reply(bot, msg, "Send me a link to a video, or see /help.").await?;
        }
        return Ok(());
    };

    let settings = deps.settings.get(msg.chat.id.0).unwrap_or_else(|e| {
        log::warn!("Failed to load settings for {}: {}", msg.chat.id, e);
        UserSettings::default()
    });
    let quality = settings.quality();
    let request = if is_playlist_url(&url) {
        JobRequest::playlist(msg.chat.id, url, quality)
    } else if quality.is_audio() {
        JobRequest::audio(msg.chat.id, url)
    } else {
        JobRequest::video(msg.chat.id, url, quality)
    };
    enqueue_and_ack(deps, request.reply_to(msg.id.0)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_url() {
        assert_eq!(
            extract_url("look at this https://youtu.be/abc please"),
            Some("https://youtu.be/abc".to_string())
        );
        assert_eq!(extract_url("ftp://example.com/file"), None);
        assert_eq!(extract_url("no links here"), None);
    }

    #[test]
    fn test_parse_subscribe_args() {
        assert_eq!(
            parse_subscribe_args("https://www.youtube.com/@chan 480"),
            Ok(("https://www.youtube.com/@chan".to_string(), Quality::P480))
        );
        assert_eq!(
            parse_subscribe_args("https://www.youtube.com/@chan"),
            Ok(("https://www.youtube.com/@chan".to_string(), Quality::P720))
        );
        assert_eq!(
            parse_subscribe_args("https://www.youtube.com/@chan 4k"),
            Err(ArgError::UnknownQuality("4k".to_string()))
        );
        assert_eq!(parse_subscribe_args(""), Err(ArgError::MissingUrl));
    }

    #[test]
    fn test_parse_cancel_arg() {
        assert_eq!(parse_cancel_arg("12"), Some(JobId(12)));
        assert_eq!(parse_cancel_arg("#7"), Some(JobId(7)));
        assert_eq!(parse_cancel_arg(""), None);
        assert_eq!(parse_cancel_arg("abc"), None);
    }

    #[test]
    fn test_settings_keyboard_ticks_current_choice() {
        let keyboard = settings_keyboard(&UserSettings {
            download_mode: DownloadMode::Audio,
            resolution: 480,
        });
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0][1].text, "✅ 🎵 Audio");
        assert_eq!(keyboard.inline_keyboard[0][0].text, "🎬 Video");
        assert!(keyboard.inline_keyboard[1].iter().any(|b| b.text == "✅ 480p"));
        assert_eq!(keyboard.inline_keyboard[1].len(), 5);
    }

    #[test]
    fn test_help_lists_commands() {
        let help = help_text();
        assert!(help.contains("/playlist"));
        assert!(help.contains("/settings"));
    }
}
