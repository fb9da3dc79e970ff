//! [`Uploader`] over the Bot API
//!
//! Files above the API limit (49 MiB on the public server, ~1.9 GiB on a local
//! Bot API server) are cut with ffmpeg and sent as numbered parts.

use std::path::Path;

use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ReplyParameters};

use crate::core::config::Config;
use crate::download::job::{JobControl, JobKind};
use crate::download::split::split_into_parts;
use crate::download::uploader::{UploadError, UploadReceipt, UploadRequest, Uploader, part_caption};
use crate::telegram::callbacks::CallbackAction;

const MAX_RETRY_AFTER_ATTEMPTS: usize = 3;

pub struct TelegramUploader {
    bot: Bot,
    ffmpeg_bin: String,
    /// Largest single file the API accepts
    limit_bytes: u64,
}

impl TelegramUploader {
    pub fn new(bot: Bot, ffmpeg_bin: impl Into<String>, limit_bytes: u64) -> Self {
        Self {
            bot,
            ffmpeg_bin: ffmpeg_bin.into(),
            limit_bytes,
        }
    }

    pub fn from_config(bot: Bot, config: &Config) -> Self {
        Self::new(bot, config.ffmpeg_bin.clone(), config.upload_limit_bytes)
    }

    async fn send_part(
        &self,
        request: &UploadRequest,
        path: &Path,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), RequestError> {
        let reply = request
            .reply_to
            .map(|id| ReplyParameters::new(MessageId(id)).allow_sending_without_reply());
        let mut attempt = 0;

        loop {
            let result = match request.kind {
                JobKind::Audio => {
                    let mut send = self
                        .bot
                        .send_audio(request.chat_id, InputFile::file(path.to_path_buf()))
                        .caption(caption);
                    if let Some(reply) = reply.clone() {
                        send = send.reply_parameters(reply);
                    }
                    if let Some(keyboard) = keyboard.clone() {
                        send = send.reply_markup(keyboard);
                    }
                    send.await
                }
                JobKind::Video | JobKind::Playlist => {
                    let mut send = self
                        .bot
                        .send_video(request.chat_id, InputFile::file(path.to_path_buf()))
                        .caption(caption)
                        .supports_streaming(true);
                    if let Some(reply) = reply.clone() {
                        send = send.reply_parameters(reply);
                    }
                    if let Some(keyboard) = keyboard.clone() {
                        send = send.reply_markup(keyboard);
                    }
                    send.await
                }
            };

            match result {
                Ok(_) => return Ok(()),
                Err(RequestError::RetryAfter(seconds)) if attempt < MAX_RETRY_AFTER_ATTEMPTS => {
                    attempt += 1;
                    log::warn!("Flood control while uploading, waiting {}s", seconds.duration().as_secs());
                    tokio::time::sleep(seconds.duration()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// "Audio only" button for a delivered video, when the URL fits the callback data
fn audio_keyboard(request: &UploadRequest) -> Option<InlineKeyboardMarkup> {
    if request.kind == JobKind::Audio {
        return None;
    }
    let data = CallbackAction::Audio(request.source_url.clone()).fitting_data()?;
    Some(InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🎵 Audio only",
        data,
    )]]))
}

#[async_trait]
impl Uploader for TelegramUploader {
    async fn send(&self, request: &UploadRequest, control: &JobControl) -> Result<UploadReceipt, UploadError> {
        let parts = split_into_parts(&self.ffmpeg_bin, &request.file_path, self.limit_bytes)
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;
        let total = parts.len();

        for (i, part) in parts.iter().enumerate() {
            if control.is_cancelled() {
                return Err(UploadError::Cancelled);
            }
            let caption = part_caption(&request.caption, i + 1, total);
            let keyboard = if i + 1 == total { audio_keyboard(request) } else { None };

            log::info!("📤 Sending {} ({}/{}) to {}", part.display(), i + 1, total, request.chat_id);
            self.send_part(request, part, &caption, keyboard)
                .await
                .map_err(|e| UploadError::Failed(e.to_string()))?;
        }

        Ok(UploadReceipt { parts: total })
    }
}
