//! Status messages for running jobs
//!
//! One message per job is created (or taken over from the queue
//! acknowledgement) and then edited in place until the job ends. Edits are
//! throttled; only the final edit is guaranteed.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use teloxide::types::ChatId;

use crate::core::config::ProgressSettings;
use crate::core::error::AppResult;
use crate::core::utils::format_bytes;
use crate::download::job::{JobId, Quality};

/// Extra options for an outgoing text message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageOptions {
    pub reply_to: Option<i32>,
    /// Attach a cancel button for this job
    pub cancel_for: Option<JobId>,
}

/// Text side of the messaging transport.
///
/// Implementations treat "message is not modified" as success and deal with
/// flood control themselves.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a new message and returns its id
    async fn send_text(&self, chat_id: ChatId, text: &str, options: MessageOptions) -> AppResult<i32>;

    /// Replaces the text (and keyboard) of an existing message
    async fn edit_text(&self, chat_id: ChatId, message_id: i32, text: &str, cancel_for: Option<JobId>) -> AppResult<()>;
}

/// What a status message currently says.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadStatus {
    Queued {
        position: usize,
    },
    Starting,
    Downloading {
        percent: Option<u8>,
        downloaded: u64,
        total: Option<u64>,
        speed: Option<f64>,
        eta_secs: Option<u64>,
    },
    /// A geo-restricted attempt failed and the next proxy is being tried
    Retrying {
        attempt: usize,
        of: usize,
    },
    /// Playlist progress header
    PlaylistItem {
        index: usize,
        total: usize,
        title: String,
    },
    Uploading {
        title: String,
    },
    Done {
        title: String,
    },
    Failed {
        reason: String,
    },
    Cancelled,
}

impl DownloadStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Done { .. } | DownloadStatus::Failed { .. } | DownloadStatus::Cancelled
        )
    }

    /// Plain-text rendering. `quality` decides the emoji and the tag.
    pub fn to_message(&self, quality: Quality) -> String {
        let emoji = if quality.is_audio() { "🎵" } else { "🎬" };
        match self {
            DownloadStatus::Queued { position } => {
                format!("📥 Added to queue ({}). Position: {}", quality.label(), position)
            }
            DownloadStatus::Starting => format!("{} Starting download ({})…", emoji, quality.label()),
            DownloadStatus::Downloading {
                percent,
                downloaded,
                total,
                speed,
                eta_secs,
            } => {
                let mut s = format!("{} Downloading ({})", emoji, quality.label());
                match (percent, total) {
                    (Some(p), Some(t)) => {
                        s.push_str(&format!(": {}%\n{}\n{} / {}", p, progress_bar(*p), format_bytes(*downloaded), format_bytes(*t)));
                    }
                    _ => s.push_str(&format!(": {}", format_bytes(*downloaded))),
                }
                if let Some(speed) = speed {
                    s.push_str(&format!("\n⚡ {}/s", format_bytes(*speed as u64)));
                }
                if let Some(eta) = eta_secs {
                    s.push_str(&format!("\n⏱ {}", format_eta(*eta)));
                }
                s
            }
            DownloadStatus::Retrying { attempt, of } => {
                format!("🌍 Geo-restricted, retrying through proxy {}/{}…", attempt, of)
            }
            DownloadStatus::PlaylistItem { index, total, title } => {
                format!("📃 Playlist item {}/{}\n{}", index, total, title)
            }
            DownloadStatus::Uploading { title } => format!("📤 Uploading\n{}", title),
            DownloadStatus::Done { title } => format!("✅ Done\n{}", title),
            DownloadStatus::Failed { reason } => format!("❌ {}", reason),
            DownloadStatus::Cancelled => "🚫 Download cancelled.".to_string(),
        }
    }
}

fn progress_bar(percent: u8) -> String {
    const WIDTH: usize = 10;
    let filled = (percent.min(100) as usize * WIDTH) / 100;
    format!("{}{}", "▰".repeat(filled), "▱".repeat(WIDTH - filled))
}

fn format_eta(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Decides whether a progress update is worth an edit.
///
/// An edit goes out only when both the minimum interval has elapsed and the
/// percentage moved by at least the minimum step, whichever is coarser.
/// With an unknown total only the interval applies.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_interval: Duration,
    min_step: u8,
    last_sent: Option<Instant>,
    last_percent: Option<u8>,
}

impl ProgressThrottle {
    pub fn new(settings: ProgressSettings) -> Self {
        Self {
            min_interval: settings.min_interval,
            min_step: settings.min_step_percent,
            last_sent: None,
            last_percent: None,
        }
    }

    pub fn should_emit(&mut self, percent: Option<u8>, now: Instant) -> bool {
        let interval_ok = self
            .last_sent
            .map(|last| now.duration_since(last) >= self.min_interval)
            .unwrap_or(true);
        if !interval_ok {
            return false;
        }

        let step_ok = match (percent, self.last_percent) {
            (Some(p), Some(last)) => p >= 100 || p.saturating_sub(last) >= self.min_step,
            _ => true,
        };
        if !step_ok {
            return false;
        }

        self.last_sent = Some(now);
        if percent.is_some() {
            self.last_percent = percent;
        }
        true
    }

    /// Forgets history, e.g. when a new attempt or playlist item starts
    pub fn reset(&mut self) {
        self.last_percent = None;
    }
}

/// The status message of one job.
#[derive(Debug, Clone)]
pub struct ProgressMessage {
    pub chat_id: ChatId,
    pub message_id: Option<i32>,
    pub reply_to: Option<i32>,
    job_id: JobId,
    quality: Quality,
}

impl ProgressMessage {
    pub fn new(chat_id: ChatId, job_id: JobId, quality: Quality) -> Self {
        Self {
            chat_id,
            message_id: None,
            reply_to: None,
            job_id,
            quality,
        }
    }

    /// Continue editing an existing message instead of sending a new one
    pub fn with_message(mut self, message_id: Option<i32>) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn with_reply_to(mut self, reply_to: Option<i32>) -> Self {
        self.reply_to = reply_to;
        self
    }

    /// Edits the status message, or sends one if there is none yet
    ///
    /// If editing fails (message deleted, too old) a new message is sent and
    /// becomes the one edited from then on. Non-final states carry a cancel
    /// button.
    pub async fn update(&mut self, messenger: &dyn Messenger, status: &DownloadStatus) -> AppResult<()> {
        let text = status.to_message(self.quality);
        let cancel_for = if status.is_final() { None } else { Some(self.job_id) };

        if let Some(message_id) = self.message_id {
            match messenger.edit_text(self.chat_id, message_id, &text, cancel_for).await {
                Ok(()) => return Ok(()),
                Err(e) => log::warn!("Failed to edit message: {}. Trying to send new one.", e),
            }
        }

        let options = MessageOptions {
            reply_to: self.reply_to,
            cancel_for,
        };
        let message_id = messenger.send_text(self.chat_id, &text, options).await?;
        self.message_id = Some(message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(interval_secs: u64, step: u8) -> ProgressSettings {
        ProgressSettings {
            min_interval: Duration::from_secs(interval_secs),
            min_step_percent: step,
        }
    }

    #[test]
    fn test_throttle_first_update_always_passes() {
        let mut throttle = ProgressThrottle::new(settings(3, 5));
        assert!(throttle.should_emit(Some(1), Instant::now()));
    }

    #[test]
    fn test_throttle_requires_interval_and_step() {
        let mut throttle = ProgressThrottle::new(settings(3, 5));
        let t0 = Instant::now();
        assert!(throttle.should_emit(Some(10), t0));
        // big jump but too soon
        assert!(!throttle.should_emit(Some(50), t0 + Duration::from_secs(1)));
        // late enough but too small a step
        assert!(!throttle.should_emit(Some(12), t0 + Duration::from_secs(10)));
        assert!(throttle.should_emit(Some(15), t0 + Duration::from_secs(10)));
        // 100% always goes out once the interval passed
        assert!(throttle.should_emit(Some(100), t0 + Duration::from_secs(14)));
    }

    #[test]
    fn test_throttle_unknown_total_uses_interval_only() {
        let mut throttle = ProgressThrottle::new(settings(2, 5));
        let t0 = Instant::now();
        assert!(throttle.should_emit(None, t0));
        assert!(!throttle.should_emit(None, t0 + Duration::from_millis(500)));
        assert!(throttle.should_emit(None, t0 + Duration::from_secs(2)));
    }

    #[test]
    fn test_render_downloading() {
        let status = DownloadStatus::Downloading {
            percent: Some(50),
            downloaded: 5 * 1024 * 1024,
            total: Some(10 * 1024 * 1024),
            speed: Some(1024.0 * 1024.0),
            eta_secs: Some(75),
        };
        let text = status.to_message(Quality::P720);
        assert!(text.starts_with("🎬 Downloading (720p): 50%"));
        assert!(text.contains("▰▰▰▰▰▱▱▱▱▱"));
        assert!(text.contains("5.0 MB / 10.0 MB"));
        assert!(text.contains("1m 15s"));
    }

    #[test]
    fn test_render_final_states() {
        assert!(DownloadStatus::Cancelled.is_final());
        assert!(!DownloadStatus::Starting.is_final());
        assert_eq!(
            DownloadStatus::Queued { position: 3 }.to_message(Quality::Audio),
            "📥 Added to queue (audio). Position: 3"
        );
    }
}
