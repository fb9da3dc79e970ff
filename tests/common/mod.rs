//! Common test utilities
//!
//! In-memory stand-ins for the extraction, upload and messaging adapters so
//! the queue and the subscription monitor can run without network access.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use teloxide::types::ChatId;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use queuebot::core::disk::DiskGuard;
use queuebot::core::error::AppResult;
use queuebot::download::error::{ExtractionFailure, FailureKind};
use queuebot::download::extractor::{
    ChannelInfo, ChannelListing, Checkpoint, Extractor, FetchError, FetchRequest, ListingOrder, MediaResult,
    Playlist, ProgressSink, ProgressUpdate, VideoEntry,
};
use queuebot::download::job::{JobControl, JobId, JobKind, Quality};
use queuebot::download::progress::{MessageOptions, Messenger};
use queuebot::download::proxy::ProxyRotator;
use queuebot::download::queue::{JobEvent, QueueProcessor};
use queuebot::download::uploader::{UploadError, UploadReceipt, UploadRequest, Uploader};

pub const CHAT: ChatId = ChatId(42);
pub const OTHER_CHAT: ChatId = ChatId(77);

const WAIT: Duration = Duration::from_secs(10);

// ============================================================================
// Extractor
// ============================================================================

/// What the mock extractor does for a URL
#[derive(Debug, Clone)]
pub enum Script {
    /// Writes `size` bytes and succeeds
    Media { title: String, size: u64 },
    Fail(FailureKind, String),
    /// Geo-restricted unless fetched through `via`
    GeoBlocked { via: Option<String> },
    /// Runs until the job is cancelled
    Hang,
}

impl Script {
    pub fn media(title: &str, size: u64) -> Self {
        Script::Media {
            title: title.to_string(),
            size,
        }
    }
}

#[derive(Default)]
pub struct MockExtractor {
    scripts: Mutex<HashMap<String, Script>>,
    estimates: Mutex<HashMap<String, u64>>,
    playlists: Mutex<HashMap<String, Playlist>>,
    channels: Mutex<HashMap<String, ChannelInfo>>,
    /// Newest first, like a channel page
    channel_videos: Mutex<HashMap<String, Vec<VideoEntry>>>,
    failing_channels: Mutex<HashSet<String>>,
    /// (url, proxy url) per fetch attempt
    fetches: Mutex<Vec<(String, Option<String>)>>,
}

impl MockExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub fn estimate(&self, url: &str, bytes: u64) {
        self.estimates.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn playlist(&self, url: &str, title: &str, items: &[&str]) {
        let playlist = Playlist {
            title: title.to_string(),
            entries: items.iter().map(|id| entry(id)).collect(),
        };
        self.playlists.lock().unwrap().insert(url.to_string(), playlist);
    }

    /// Registers a channel reachable at `url` with `ids` listed newest first
    pub fn channel(&self, url: &str, id: &str, name: &str, ids: &[&str]) {
        self.channels.lock().unwrap().insert(
            url.to_string(),
            ChannelInfo {
                id: id.to_string(),
                name: name.to_string(),
                url: url.to_string(),
            },
        );
        self.set_channel_videos(url, ids);
    }

    pub fn set_channel_videos(&self, url: &str, ids: &[&str]) {
        self.channel_videos
            .lock()
            .unwrap()
            .insert(url.to_string(), ids.iter().map(|id| entry(id)).collect());
    }

    pub fn fail_channel(&self, url: &str) {
        self.failing_channels.lock().unwrap().insert(url.to_string());
    }

    pub fn fetches(&self) -> Vec<(String, Option<String>)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetches().into_iter().map(|(url, _)| url).collect()
    }
}

pub fn entry(id: &str) -> VideoEntry {
    VideoEntry {
        id: id.to_string(),
        title: format!("Video {}", id),
        url: video_url(id),
    }
}

pub fn video_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

async fn write_media(request: &FetchRequest, sink: &ProgressSink, title: &str, size: u64) -> Result<MediaResult, FetchError> {
    let update = ProgressUpdate {
        downloaded: size,
        total: Some(size),
        ..Default::default()
    };
    if let Checkpoint::Stop(interrupt) = sink.report(update) {
        return Err(FetchError::Interrupted(interrupt));
    }
    let file_path = request.output_dir.join("media.mp4");
    tokio::fs::write(&file_path, vec![0u8; size as usize])
        .await
        .map_err(|e| FetchError::Failed(ExtractionFailure::other(e.to_string())))?;
    Ok(MediaResult {
        file_path,
        size_bytes: size,
        title: title.to_string(),
        video_id: None,
        quality: request.quality,
    })
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn estimate_size(
        &self,
        url: &str,
        _quality: Quality,
        _proxy: &queuebot::download::proxy::ProxyDescriptor,
    ) -> Option<u64> {
        self.estimates.lock().unwrap().get(url).copied()
    }

    async fn fetch(&self, request: FetchRequest, sink: ProgressSink) -> Result<MediaResult, FetchError> {
        self.fetches
            .lock()
            .unwrap()
            .push((request.url.clone(), request.proxy.url().map(str::to_string)));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Script::media(&request.url, 1024));

        match script {
            Script::Media { title, size } => write_media(&request, &sink, &title, size).await,
            Script::Fail(kind, message) => Err(FetchError::Failed(ExtractionFailure::new(kind, message))),
            Script::GeoBlocked { via } if via.is_some() && request.proxy.url() == via.as_deref() => {
                write_media(&request, &sink, "Unblocked", 2048).await
            }
            Script::GeoBlocked { .. } => Err(FetchError::Failed(ExtractionFailure::new(
                FailureKind::GeoRestricted,
                "ERROR: The uploader has not made this video available in your country",
            ))),
            Script::Hang => loop {
                if let Checkpoint::Stop(interrupt) = sink.checkpoint(0) {
                    return Err(FetchError::Interrupted(interrupt));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            },
        }
    }

    async fn list_playlist(
        &self,
        url: &str,
        _proxy: &queuebot::download::proxy::ProxyDescriptor,
    ) -> Result<Playlist, ExtractionFailure> {
        self.playlists
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ExtractionFailure::new(FailureKind::NotFound, "no such playlist"))
    }

    async fn resolve_channel(&self, url: &str) -> Result<ChannelInfo, ExtractionFailure> {
        if self.failing_channels.lock().unwrap().contains(url) {
            return Err(ExtractionFailure::other("HTTP Error 503: Service Unavailable"));
        }
        self.channels
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| ExtractionFailure::new(FailureKind::NotFound, "channel does not exist"))
    }

    async fn list_channel_videos(&self, channel_url: &str, limit: usize) -> Result<ChannelListing, ExtractionFailure> {
        if self.failing_channels.lock().unwrap().contains(channel_url) {
            return Err(ExtractionFailure::other("HTTP Error 503: Service Unavailable"));
        }
        let videos = self
            .channel_videos
            .lock()
            .unwrap()
            .get(channel_url)
            .map(|v| v.iter().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(ChannelListing {
            videos,
            order: ListingOrder::NewestFirst,
        })
    }
}

// ============================================================================
// Uploader
// ============================================================================

#[derive(Debug, Clone)]
pub struct Uploaded {
    pub chat_id: ChatId,
    pub caption: String,
    pub kind: JobKind,
    pub quality: Quality,
    pub source_url: String,
    pub bytes_on_disk: u64,
}

#[derive(Default)]
pub struct MockUploader {
    uploads: Mutex<Vec<Uploaded>>,
    failure: Mutex<Option<String>>,
}

impl MockUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn uploads(&self) -> Vec<Uploaded> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn send(&self, request: &UploadRequest, control: &JobControl) -> Result<UploadReceipt, UploadError> {
        if control.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(UploadError::Failed(message));
        }
        let bytes_on_disk = std::fs::metadata(&request.file_path).map(|m| m.len()).unwrap_or(0);
        self.uploads.lock().unwrap().push(Uploaded {
            chat_id: request.chat_id,
            caption: request.caption.clone(),
            kind: request.kind,
            quality: request.quality,
            source_url: request.source_url.clone(),
            bytes_on_disk,
        });
        Ok(UploadReceipt { parts: 1 })
    }
}

// ============================================================================
// Messenger
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub chat_id: ChatId,
    pub message_id: i32,
    pub text: String,
    pub edit: bool,
    pub cancel_for: Option<JobId>,
}

pub struct MockMessenger {
    records: Mutex<Vec<Recorded>>,
    next_id: AtomicI32,
    /// Holds back messages that carry a cancel button
    ack_delay: Mutex<Option<Duration>>,
}

impl MockMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(100),
            ack_delay: Mutex::new(None),
        })
    }

    pub fn delay_acks(&self, delay: Duration) {
        *self.ack_delay.lock().unwrap() = Some(delay);
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.records.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.text).collect()
    }

    /// Every text a message went through, in order
    pub fn history(&self, message_id: i32) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.message_id == message_id)
            .map(|r| r.text)
            .collect()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str, options: MessageOptions) -> AppResult<i32> {
        let delay = *self.ack_delay.lock().unwrap();
        if let Some(delay) = delay.filter(|_| options.cancel_for.is_some()) {
            tokio::time::sleep(delay).await;
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().push(Recorded {
            chat_id,
            message_id,
            text: text.to_string(),
            edit: false,
            cancel_for: options.cancel_for,
        });
        Ok(message_id)
    }

    async fn edit_text(&self, chat_id: ChatId, message_id: i32, text: &str, cancel_for: Option<JobId>) -> AppResult<()> {
        self.records.lock().unwrap().push(Recorded {
            chat_id,
            message_id,
            text: text.to_string(),
            edit: true,
            cancel_for,
        });
        Ok(())
    }
}

/// Final status texts start with one of these
pub fn is_final_text(text: &str) -> bool {
    text.starts_with("✅") || text.starts_with("❌") || text.starts_with("🚫")
}

// ============================================================================
// Queue harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub disk: Arc<DiskGuard>,
    pub queue: Arc<QueueProcessor>,
    pub extractor: Arc<MockExtractor>,
    pub uploader: Arc<MockUploader>,
    pub messenger: Arc<MockMessenger>,
    pub shutdown: CancellationToken,
}

impl Harness {
    /// Direct connection, no disk ceiling
    pub fn new() -> Self {
        Self::with(ProxyRotator::direct(), 0)
    }

    pub fn with(proxies: ProxyRotator, disk_limit: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskGuard::new(dir.path().join("downloads"), disk_limit));
        std::fs::create_dir_all(disk.root()).unwrap();
        let extractor = MockExtractor::new();
        let uploader = MockUploader::new();
        let messenger = MockMessenger::new();
        let queue = Arc::new(QueueProcessor::new(
            Arc::clone(&disk),
            proxies,
            extractor.clone() as Arc<dyn Extractor>,
            uploader.clone() as Arc<dyn Uploader>,
            messenger.clone() as Arc<dyn Messenger>,
        ));
        Self {
            dir,
            disk,
            queue,
            extractor,
            uploader,
            messenger,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        self.queue.start(self.shutdown.clone())
    }

    /// Entries left in the download root
    pub fn leftovers(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.disk.root())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

pub async fn wait_started(events: &mut broadcast::Receiver<JobEvent>, id: JobId) {
    tokio::time::timeout(WAIT, async {
        loop {
            if let JobEvent::Started { id: started } = events.recv().await.unwrap() {
                if started == id {
                    return;
                }
            }
        }
    })
    .await
    .expect("job did not start in time")
}

/// Waits until the mock extractor has been asked to fetch `url`
pub async fn wait_fetched(extractor: &MockExtractor, url: &str) {
    tokio::time::timeout(WAIT, async {
        while !extractor.fetched_urls().iter().any(|fetched| fetched == url) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("fetch did not start in time")
}

pub async fn wait_finished(events: &mut broadcast::Receiver<JobEvent>, id: JobId) -> JobEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.unwrap();
            if matches!(&event, JobEvent::Finished { id: finished, .. } if *finished == id) {
                return event;
            }
        }
    })
    .await
    .expect("job did not finish in time")
}
