//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, Message};

use super::callbacks::handle_callback;
use super::commands::{handle_command, handle_text_message};
use super::types::{HandlerDeps, HandlerError};
use crate::telegram::bot::Command;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// Updates from chats outside the allow-list are dropped before any branch
/// runs. The same schema is used in production and in tests.
///
/// # Arguments
/// * `deps` - Handler dependencies (queue, monitor, settings store, etc.)
///
/// # Returns
/// The complete handler tree for the bot
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_filter = deps.clone();
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        .filter(move |update: Update| is_update_allowed(&deps_filter, &update))
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
        .branch(callback_handler(deps_callback))
}

fn is_update_allowed(deps: &HandlerDeps, update: &Update) -> bool {
    match update.chat() {
        Some(chat) if deps.is_chat_allowed(chat.id.0) => true,
        Some(chat) => {
            log::debug!("Dropping update {} from chat {} (not allowed)", update.id.0, chat.id);
            false
        }
        None => false,
    }
}

/// Handler for bot commands
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                if let Err(e) = handle_command(&bot, &msg, cmd, &deps).await {
                    log::error!("❌ Command handler failed in chat {}: {}", msg.chat.id, e);
                }
                Ok(())
            }
        },
    ))
}

/// Handler for plain text messages (links)
fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().is_some_and(|text| !text.starts_with('/')))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                if let Err(e) = handle_text_message(&bot, &msg, &deps).await {
                    log::error!("❌ Message handler failed in chat {}: {}", msg.chat.id, e);
                }
                Ok(())
            }
        })
}

/// Handler for inline keyboard buttons
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            if let Err(e) = handle_callback(&bot, &q, &deps).await {
                log::error!("❌ Callback handler failed for {:?}: {}", q.data, e);
            }
            Ok(())
        }
    })
}
