//! [`Messenger`] over the Bot API

use std::time::Duration;

use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ReplyParameters};

use crate::core::error::AppResult;
use crate::download::job::JobId;
use crate::download::progress::{MessageOptions, Messenger};
use crate::telegram::callbacks::CallbackAction;

/// How often a request hit by flood control is retried
const MAX_RETRY_AFTER_ATTEMPTS: usize = 3;

/// Inline keyboard with a single cancel button for `job_id`
pub fn cancel_keyboard(job_id: JobId) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "❌ Cancel",
        CallbackAction::Cancel(job_id).to_data(),
    )]])
}

pub fn is_not_modified(error: &RequestError) -> bool {
    error.to_string().contains("message is not modified")
}

/// Flood-control delay requested by Telegram, if any
fn retry_after(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(seconds) => Some(seconds.duration()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str, options: MessageOptions) -> AppResult<i32> {
        let mut attempt = 0;
        loop {
            let mut request = self.bot.send_message(chat_id, text);
            if let Some(reply_to) = options.reply_to {
                request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to)).allow_sending_without_reply());
            }
            if let Some(job_id) = options.cancel_for {
                request = request.reply_markup(cancel_keyboard(job_id));
            }

            match request.await {
                Ok(message) => return Ok(message.id.0),
                Err(e) => match retry_after(&e) {
                    Some(delay) if attempt < MAX_RETRY_AFTER_ATTEMPTS => {
                        attempt += 1;
                        log::warn!("Flood control on send to {}, waiting {}s", chat_id, delay.as_secs());
                        tokio::time::sleep(delay).await;
                    }
                    _ => return Err(e.into()),
                },
            }
        }
    }

    async fn edit_text(&self, chat_id: ChatId, message_id: i32, text: &str, cancel_for: Option<JobId>) -> AppResult<()> {
        let mut attempt = 0;
        loop {
            let mut request = self.bot.edit_message_text(chat_id, MessageId(message_id), text);
            if let Some(job_id) = cancel_for {
                request = request.reply_markup(cancel_keyboard(job_id));
            }

            match request.await {
                Ok(_) => return Ok(()),
                Err(e) if is_not_modified(&e) => return Ok(()),
                Err(e) => match retry_after(&e) {
                    Some(delay) if attempt < MAX_RETRY_AFTER_ATTEMPTS => {
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                    }
                    _ => return Err(e.into()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_keyboard_carries_job_id() {
        let keyboard = cancel_keyboard(JobId(42));
        let button = &keyboard.inline_keyboard[0][0];
        assert_eq!(button.text, "❌ Cancel");
        assert!(format!("{:?}", button.kind).contains("cancel:42"));
    }
}
