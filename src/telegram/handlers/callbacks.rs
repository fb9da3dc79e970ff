//! Inline button handler

use teloxide::prelude::*;
use teloxide::types::CallbackQuery;

use super::commands::{enqueue_and_ack, settings_keyboard};
use super::types::{HandlerDeps, HandlerError};
use crate::download::job::JobRequest;
use crate::telegram::callbacks::CallbackAction;

pub(super) async fn handle_callback(bot: &Bot, q: &CallbackQuery, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let action = q.data.as_deref().and_then(CallbackAction::parse);
    let origin = q.message.as_ref().map(|m| (m.chat().id, m.id()));

    let (Some(action), Some((chat_id, message_id))) = (action, origin) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    log::debug!("Callback {:?} from chat {}", action, chat_id);

    let notice = match action {
        CallbackAction::Cancel(job_id) => {
            if deps.queue.owner_of(job_id).await == Some(chat_id) && deps.queue.cancel(job_id).await {
                "🛑 Cancelling…"
            } else {
                "This download already finished."
            }
        }
        CallbackAction::Audio(url) => {
            enqueue_and_ack(deps, JobRequest::audio(chat_id, url).reply_to(message_id.0)).await;
            "🎵 Audio download queued"
        }
        CallbackAction::Mode(mode) => {
            deps.settings.set_mode(chat_id.0, mode)?;
            let settings = deps.settings.get(chat_id.0)?;
            bot.edit_message_reply_markup(chat_id, message_id)
                .reply_markup(settings_keyboard(&settings))
                .await?;
            "Saved"
        }
        CallbackAction::Resolution(height) => {
            deps.settings.set_resolution(chat_id.0, height)?;
            let settings = deps.settings.get(chat_id.0)?;
            bot.edit_message_reply_markup(chat_id, message_id)
                .reply_markup(settings_keyboard(&settings))
                .await?;
            "Saved"
        }
    };

    bot.answer_callback_query(q.id.clone()).text(notice).await?;
    Ok(())
}
