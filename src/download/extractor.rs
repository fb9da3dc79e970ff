//! Extraction adapter boundary
//!
//! The queue never talks to yt-dlp directly. It goes through the [`Extractor`]
//! trait, hands it a [`ProgressSink`] and reacts to the typed outcome.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::disk::{DiskGuard, Reservation};
use crate::download::error::ExtractionFailure;
use crate::download::job::{JobControl, Quality};
use crate::download::proxy::ProxyDescriptor;

/// One extraction attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub quality: Quality,
    /// Directory owned by the job; the adapter writes only here
    pub output_dir: PathBuf,
    pub proxy: ProxyDescriptor,
}

/// Successfully downloaded media.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaResult {
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub title: String,
    pub video_id: Option<String>,
    pub quality: Quality,
}

/// Why the adapter stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DiskLimit { used: u64, requested: u64, limit: u64 },
}

/// Outcome of a failed fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The tool failed on its own
    Failed(ExtractionFailure),
    /// The sink asked the adapter to stop
    Interrupted(Interrupt),
}

impl From<ExtractionFailure> for FetchError {
    fn from(e: ExtractionFailure) -> Self {
        FetchError::Failed(e)
    }
}

/// A video as seen in a channel or playlist listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEntry {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Order of a listing; consistent within one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOrder {
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListing {
    pub videos: Vec<VideoEntry>,
    pub order: ListingOrder,
}

impl ChannelListing {
    /// Videos oldest first, whatever order the source used.
    pub fn chronological(self) -> Vec<VideoEntry> {
        match self.order {
            ListingOrder::OldestFirst => self.videos,
            ListingOrder::NewestFirst => self.videos.into_iter().rev().collect(),
        }
    }
}

/// Canonical identity of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    /// URL the monitor lists from
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub title: String,
    pub entries: Vec<VideoEntry>,
}

/// Raw progress as parsed from the tool's output
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressUpdate {
    pub downloaded: u64,
    pub total: Option<u64>,
    /// Bytes per second, when the tool reports it
    pub speed: Option<f64>,
    pub eta_secs: Option<u64>,
}

impl ProgressUpdate {
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(total) if total > 0 => Some(((self.downloaded.min(total) * 100) / total) as u8),
            _ => None,
        }
    }
}

/// Verdict returned to the adapter at each checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Stop(Interrupt),
}

/// Progress channel from an adapter back to the queue.
///
/// Every call is a cancellation checkpoint: the adapter must stop and return
/// [`FetchError::Interrupted`] as soon as it gets [`Checkpoint::Stop`]. The
/// sink is cheap to clone and safe to use from blocking threads.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    control: Arc<JobControl>,
    disk: Option<Arc<DiskGuard>>,
    /// Bytes already reserved in the disk guard for this attempt
    reserved: u64,
    updates: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl ProgressSink {
    pub fn new(
        control: Arc<JobControl>,
        disk: Arc<DiskGuard>,
        reserved: u64,
        updates: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Self {
        Self {
            control,
            disk: Some(disk),
            reserved,
            updates: Some(updates),
        }
    }

    /// Sink that only carries the cancel flag (listings, tests)
    pub fn detached(control: Arc<JobControl>) -> Self {
        Self {
            control,
            disk: None,
            reserved: 0,
            updates: None,
        }
    }

    /// Records progress, forwards it for display and checks whether to go on.
    pub fn report(&self, update: ProgressUpdate) -> Checkpoint {
        self.control.set_progress(update.downloaded, update.total);
        if let Some(tx) = &self.updates {
            // The receiver disappears once the job is finishing; nothing to do then
            let _ = tx.send(update);
        }
        self.checkpoint(update.downloaded)
    }

    /// Pure checkpoint: cancel flag and disk ceiling, no display update.
    pub fn checkpoint(&self, downloaded: u64) -> Checkpoint {
        if self.control.is_cancelled() {
            return Checkpoint::Stop(Interrupt::Cancelled);
        }
        if let Some(disk) = &self.disk {
            let unreserved = downloaded.saturating_sub(self.reserved);
            if unreserved > 0 {
                if let Reservation::Denied { used, requested, limit } = disk.check(unreserved) {
                    return Checkpoint::Stop(Interrupt::DiskLimit { used, requested, limit });
                }
            }
        }
        Checkpoint::Continue
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }
}

/// Wraps the external download tool.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Adapter name for logs
    fn name(&self) -> &str;

    /// Best-effort size estimate for the requested quality. `None` if unknown.
    async fn estimate_size(&self, url: &str, quality: Quality, proxy: &ProxyDescriptor) -> Option<u64>;

    /// Downloads `request.url` into `request.output_dir`.
    async fn fetch(&self, request: FetchRequest, sink: ProgressSink) -> Result<MediaResult, FetchError>;

    /// Lists the entries of a playlist URL
    async fn list_playlist(&self, url: &str, proxy: &ProxyDescriptor) -> Result<Playlist, ExtractionFailure>;

    /// Resolves any channel URL (handle, /channel/, /c/, video page) to its identity
    async fn resolve_channel(&self, url: &str) -> Result<ChannelInfo, ExtractionFailure>;

    /// Latest `limit` videos of a channel
    async fn list_channel_videos(&self, channel_url: &str, limit: usize) -> Result<ChannelListing, ExtractionFailure>;
}
