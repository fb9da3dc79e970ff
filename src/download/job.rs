//! Job value object and its state machine

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use teloxide::types::ChatId;

/// Identifier assigned by the queue at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Video,
    Audio,
    Playlist,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Video => "video",
            JobKind::Audio => "audio",
            JobKind::Playlist => "playlist",
        }
    }
}

/// Target quality. `Audio` means no video stream at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    P1080,
    P720,
    P480,
    P360,
    P240,
    Audio,
}

impl Quality {
    /// All video qualities, best first
    pub const VIDEO: [Quality; 5] = [
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::P360,
        Quality::P240,
    ];

    /// Maximum frame height, `None` for audio
    pub fn height(&self) -> Option<u32> {
        match self {
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::P360 => Some(360),
            Quality::P240 => Some(240),
            Quality::Audio => None,
        }
    }

    pub fn from_height(height: u32) -> Option<Self> {
        Self::VIDEO.into_iter().find(|q| q.height() == Some(height))
    }

    /// Parses "720", "720p" or "audio".
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw == "audio" || raw == "music" {
            return Some(Quality::Audio);
        }
        let digits = raw.strip_suffix('p').unwrap_or(&raw);
        digits.parse::<u32>().ok().and_then(Self::from_height)
    }

    /// Label shown to users and stored in the database ("720p", "audio")
    pub fn label(&self) -> String {
        match self.height() {
            Some(h) => format!("{}p", h),
            None => "audio".to_string(),
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Quality::Audio)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Downloading,
    Uploading,
    Cancelled,
    Failed,
    Done,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Cancelled | JobStatus::Failed | JobStatus::Done)
    }

    /// Whether `self -> next` is a legal edge of the state machine.
    ///
    /// `Uploading -> Downloading` exists for playlists, which alternate
    /// between the two for every item.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Cancelled) | (_, Failed) => true,
            (Queued, Downloading) => true,
            (Downloading, Downloading) => true,
            (Downloading, Uploading) => true,
            (Uploading, Downloading) => true,
            (Uploading, Done) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Uploading => "uploading",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
            JobStatus::Done => "done",
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Shared, lock-free part of a job: the cancel flag and progress counters.
///
/// The worker, the adapters and the handlers all hold a clone of the same
/// `Arc<JobControl>`. Counters are relaxed; only approximate progress is shown.
#[derive(Debug, Default)]
pub struct JobControl {
    cancel_requested: AtomicBool,
    bytes_done: AtomicU64,
    bytes_expected: AtomicU64,
}

impl JobControl {
    /// Sets the cancel flag. Returns true the first time only.
    pub fn request_cancel(&self) -> bool {
        !self.cancel_requested.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn set_progress(&self, done: u64, expected: Option<u64>) {
        self.bytes_done.store(done, Ordering::Relaxed);
        if let Some(expected) = expected {
            self.bytes_expected.store(expected, Ordering::Relaxed);
        }
    }

    pub fn reset_progress(&self) {
        self.bytes_done.store(0, Ordering::Relaxed);
        self.bytes_expected.store(0, Ordering::Relaxed);
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    pub fn bytes_expected(&self) -> u64 {
        self.bytes_expected.load(Ordering::Relaxed)
    }
}

/// Everything needed to create a job, before it has an id.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub chat_id: ChatId,
    pub url: String,
    pub kind: JobKind,
    pub quality: Quality,
    /// Message the bot should reply to
    pub reply_to: Option<i32>,
    /// Prepended to upload captions, e.g. the channel name for subscription jobs
    pub caption_prefix: Option<String>,
}

impl JobRequest {
    pub fn new(chat_id: ChatId, url: impl Into<String>, kind: JobKind, quality: Quality) -> Self {
        Self {
            chat_id,
            url: url.into(),
            kind,
            quality,
            reply_to: None,
            caption_prefix: None,
        }
    }

    pub fn video(chat_id: ChatId, url: impl Into<String>, quality: Quality) -> Self {
        Self::new(chat_id, url, JobKind::Video, quality)
    }

    pub fn audio(chat_id: ChatId, url: impl Into<String>) -> Self {
        Self::new(chat_id, url, JobKind::Audio, Quality::Audio)
    }

    pub fn playlist(chat_id: ChatId, url: impl Into<String>, quality: Quality) -> Self {
        Self::new(chat_id, url, JobKind::Playlist, quality)
    }

    pub fn reply_to(mut self, message_id: i32) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn caption_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.caption_prefix = Some(prefix.into());
        self
    }
}

/// One download/upload unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub chat_id: ChatId,
    pub url: String,
    pub kind: JobKind,
    pub quality: Quality,
    pub reply_to: Option<i32>,
    pub caption_prefix: Option<String>,
    /// Message the worker edits in place for progress and the final status
    pub status_message: Option<i32>,
    /// Cursor into the proxy list, local to this job
    pub proxy_attempt_index: usize,
    status: JobStatus,
    control: Arc<JobControl>,
}

impl Job {
    pub fn new(id: JobId, request: JobRequest) -> Self {
        Self {
            id,
            chat_id: request.chat_id,
            url: request.url,
            kind: request.kind,
            quality: request.quality,
            reply_to: request.reply_to,
            caption_prefix: request.caption_prefix,
            status_message: None,
            proxy_attempt_index: 0,
            status: JobStatus::Queued,
            control: Arc::new(JobControl::default()),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn control(&self) -> &Arc<JobControl> {
        &self.control
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the job along the state machine. Terminal jobs never move again.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Sets the cancel flag unless the job already finished.
    ///
    /// Returns true if the job was live, even when the flag had been set before.
    pub fn request_cancel(&self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.control.request_cancel();
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Caption prefix followed by the title
    pub fn caption_for(&self, title: &str) -> String {
        match &self.caption_prefix {
            Some(prefix) => format!("{}\n{}", prefix, title),
            None => title.to_string(),
        }
    }
}
