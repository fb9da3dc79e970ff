//! Bot initialization and the command list
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Registration of the command menu

use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use teloxide::utils::command::BotCommands;

use crate::core::config::{self, Config};

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "I can do:")]
pub enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(rename = "1080", description = "download a video in 1080p")]
    Q1080(String),
    #[command(rename = "720", description = "download a video in 720p")]
    Q720(String),
    #[command(rename = "480", description = "download a video in 480p")]
    Q480(String),
    #[command(rename = "360", description = "download a video in 360p")]
    Q360(String),
    #[command(rename = "240", description = "download a video in 240p")]
    Q240(String),
    #[command(description = "download audio only")]
    Music(String),
    #[command(description = "download a whole playlist: /playlist <url> [quality]")]
    Playlist(String),
    #[command(description = "follow a channel: /subscribe <url> [quality]")]
    Subscribe(String),
    #[command(description = "stop following a channel")]
    Unsubscribe(String),
    #[command(description = "list followed channels")]
    Subscriptions,
    #[command(description = "list followed channels")]
    Subs,
    #[command(description = "default mode and resolution for plain links")]
    Settings,
    #[command(description = "cancel your current or last queued download")]
    Cancel(String),
}

/// Creates a Bot instance with custom or default API URL
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to build the HTTP client
pub fn create_bot(config: &Config) -> anyhow::Result<Bot> {
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    let bot = Bot::with_client(config.bot_token.expose_secret(), client);

    let bot = match &config.bot_api_url {
        Some(url) => {
            log::info!("Using custom Bot API URL: {}", url);
            bot.set_api_url(url.clone())
        }
        None => bot,
    };
    Ok(bot)
}

/// Sets up bot commands in Telegram UI
///
/// # Arguments
/// * `bot` - Bot instance to configure
///
/// # Returns
/// * `Ok(())` - Commands set successfully
/// * `Err(RequestError)` - Failed to set commands
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    // /subs is an alias and stays out of the menu
    let commands: Vec<BotCommand> = Command::bot_commands()
        .into_iter()
        .filter(|c| c.command != "/subs" && c.command != "subs")
        .collect();
    bot.set_my_commands(commands).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_descriptions() {
        let command_list = Command::descriptions().to_string();
        assert!(command_list.contains("I can do"));
        assert!(command_list.contains("/720"));
        assert!(command_list.contains("/subscribe"));
        assert!(command_list.contains("/cancel"));
    }

    #[test]
    fn test_parse_quality_commands() {
        assert_eq!(
            Command::parse("/720 https://youtu.be/abc", "queuebot").unwrap(),
            Command::Q720("https://youtu.be/abc".to_string())
        );
        assert_eq!(
            Command::parse("/music https://youtu.be/abc", "queuebot").unwrap(),
            Command::Music("https://youtu.be/abc".to_string())
        );
        assert_eq!(Command::parse("/subs", "queuebot").unwrap(), Command::Subs);
        assert_eq!(Command::parse("/cancel", "queuebot").unwrap(), Command::Cancel(String::new()));
    }
}
