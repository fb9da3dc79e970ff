//! Single-worker FIFO download queue
//!
//! Handlers and the subscription monitor call [`QueueProcessor::enqueue`] and
//! [`QueueProcessor::cancel`]; both return immediately. One worker task pulls
//! jobs in enqueue order and drives each through extraction, the disk check
//! and upload before touching the next one.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::info;
use teloxide::types::ChatId;
use tokio::sync::{Mutex, Notify, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::core::config::ProgressSettings;
use crate::core::disk::{DiskGuard, JOB_DIR_PREFIX, Reservation};
use crate::core::utils::{CAPTION_MAX_CHARS, truncate_chars};
use crate::download::error::{ExtractionFailure, FailureKind, JobFailure};
use crate::download::extractor::{
    Extractor, FetchError, FetchRequest, Interrupt, MediaResult, Playlist, ProgressSink, ProgressUpdate,
};
use crate::download::job::{Job, JobId, JobKind, JobRequest, JobStatus, Quality};
use crate::download::progress::{DownloadStatus, MessageOptions, Messenger, ProgressMessage, ProgressThrottle};
use crate::download::proxy::{ProxyRotator, Rotation};
use crate::download::uploader::{UploadError, UploadRequest, Uploader};

/// Room left in captions for the " (Part i/n)" suffix
const CAPTION_PART_RESERVE: usize = 20;

/// Capacity of the lifecycle event channel. Slow subscribers lose old events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of [`QueueProcessor::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub id: JobId,
    /// 1-based position among waiting jobs
    pub position: usize,
}

/// Lifecycle notifications, mostly for logging and tests
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started {
        id: JobId,
    },
    Finished {
        id: JobId,
        chat_id: ChatId,
        status: JobStatus,
        /// `None` for done and cancelled jobs
        failure: Option<JobFailure>,
    },
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Job>,
    active: Option<Job>,
}

/// Disk accounting held by one job, released on every exit path
#[derive(Debug, Default)]
struct DiskLedger {
    reserved: u64,
    committed: u64,
}

/// The download scheduler.
pub struct QueueProcessor {
    state: Mutex<QueueState>,
    wake: Notify,
    next_id: AtomicU64,
    events: broadcast::Sender<JobEvent>,
    disk: Arc<DiskGuard>,
    proxies: ProxyRotator,
    extractor: Arc<dyn Extractor>,
    uploader: Arc<dyn Uploader>,
    messenger: Arc<dyn Messenger>,
    progress: ProgressSettings,
}

impl QueueProcessor {
    pub fn new(
        disk: Arc<DiskGuard>,
        proxies: ProxyRotator,
        extractor: Arc<dyn Extractor>,
        uploader: Arc<dyn Uploader>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            next_id: AtomicU64::new(0),
            events,
            disk,
            proxies,
            extractor,
            uploader,
            messenger,
            progress: ProgressSettings::default(),
        }
    }

    pub fn with_progress_settings(mut self, settings: ProgressSettings) -> Self {
        self.progress = settings;
        self
    }

    pub fn disk(&self) -> &Arc<DiskGuard> {
        &self.disk
    }

    /// Receives [`JobEvent`]s emitted after subscribing
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Adds a job at the back of the queue
    ///
    /// # Arguments
    /// * `request` - What to download and for whom
    ///
    /// # Returns
    /// The assigned id and the 1-based position among waiting jobs
    pub async fn enqueue(&self, request: JobRequest) -> Enqueued {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let job = Job::new(id, request);
        info!(
            "📥 Job {} queued: {} {} {} for chat {}",
            id,
            job.kind.as_str(),
            job.quality,
            job.url,
            job.chat_id
        );

        let position = {
            let mut state = self.state.lock().await;
            state.pending.push_back(job);
            state.pending.len()
        };
        self.wake.notify_one();
        Enqueued { id, position }
    }

    /// Cancels a job.
    ///
    /// A waiting job is removed and becomes `cancelled` right away, without
    /// ever reaching the extractor. The active job gets its cancel flag set
    /// and stops at its next checkpoint.
    ///
    /// # Returns
    /// `true` if the job existed and was not terminal yet
    pub async fn cancel(&self, id: JobId) -> bool {
        let mut state = self.state.lock().await;

        if let Some(active) = state.active.as_ref().filter(|job| job.id == id) {
            let live = active.request_cancel();
            if live {
                info!("🛑 Cancel requested for active job {}", id);
            }
            return live;
        }

        let Some(index) = state.pending.iter().position(|job| job.id == id) else {
            return false;
        };
        let Some(mut job) = state.pending.remove(index) else {
            return false;
        };
        drop(state);

        job.request_cancel();
        if let Err(e) = job.transition(JobStatus::Cancelled) {
            log::error!("Job {}: {}", id, e);
        }
        info!("🛑 Job {} cancelled while queued", id);
        let _ = self.events.send(JobEvent::Finished {
            id,
            chat_id: job.chat_id,
            status: JobStatus::Cancelled,
            failure: None,
        });

        let messenger = Arc::clone(&self.messenger);
        tokio::spawn(async move {
            let mut progress = ProgressMessage::new(job.chat_id, job.id, job.quality)
                .with_message(job.status_message)
                .with_reply_to(job.reply_to);
            if let Err(e) = progress.update(&*messenger, &DownloadStatus::Cancelled).await {
                log::warn!("Failed to report cancellation of job {}: {}", job.id, e);
            }
        });
        true
    }

    /// Cancels the chat's active job, or its most recently queued one.
    pub async fn cancel_latest_for_chat(&self, chat_id: ChatId) -> Option<JobId> {
        let target = {
            let state = self.state.lock().await;
            state
                .active
                .iter()
                .filter(|job| job.chat_id == chat_id && !job.is_cancel_requested())
                .chain(state.pending.iter().rev().filter(|job| job.chat_id == chat_id))
                .map(|job| job.id)
                .next()
        };
        match target {
            Some(id) if self.cancel(id).await => Some(id),
            _ => None,
        }
    }

    /// Chat that owns a live job
    pub async fn owner_of(&self, id: JobId) -> Option<ChatId> {
        let state = self.state.lock().await;
        state
            .active
            .iter()
            .chain(state.pending.iter())
            .find(|job| job.id == id)
            .map(|job| job.chat_id)
    }

    /// The job currently downloading or uploading
    pub async fn current(&self) -> Option<Job> {
        self.state.lock().await.active.clone()
    }

    /// Snapshot of waiting jobs in service order
    pub async fn pending(&self) -> Vec<Job> {
        self.state.lock().await.pending.iter().cloned().collect()
    }

    /// Number of waiting jobs
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Lets the worker edit the handler's "added to queue" message instead of
    /// sending a new one. Returns false if the job already left the queue.
    pub async fn attach_status_message(&self, id: JobId, message_id: i32) -> bool {
        let mut state = self.state.lock().await;
        match state.pending.iter_mut().find(|job| job.id == id) {
            Some(job) => {
                job.status_message = Some(message_id);
                true
            }
            None => false,
        }
    }

    /// Enqueues a job and sends the "added to queue" message with its cancel
    /// button, which the worker then edits in place.
    ///
    /// If the worker picked the job up before the message went out, it is
    /// already reporting in a message of its own; the acknowledgement is then
    /// turned into a plain note without the button.
    pub async fn enqueue_and_announce(&self, request: JobRequest) -> Enqueued {
        let chat_id = request.chat_id;
        let quality = request.quality;
        let reply_to = request.reply_to;
        let enqueued = self.enqueue(request).await;

        let text = DownloadStatus::Queued {
            position: enqueued.position,
        }
        .to_message(quality);
        let options = MessageOptions {
            reply_to,
            cancel_for: Some(enqueued.id),
        };
        let message_id = match self.messenger.send_text(chat_id, &text, options).await {
            Ok(message_id) => message_id,
            Err(e) => {
                log::warn!("Failed to acknowledge job {} in chat {}: {}", enqueued.id, chat_id, e);
                return enqueued;
            }
        };
        if !self.attach_status_message(enqueued.id, message_id).await {
            let note = format!("📥 Taken from the queue ({})", quality.label());
            if let Err(e) = self.messenger.edit_text(chat_id, message_id, &note, None).await {
                log::warn!("Failed to update acknowledgement of job {}: {}", enqueued.id, e);
            }
        }
        enqueued
    }

    /// Spawns the worker on the current runtime
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.run(shutdown).await })
    }

    /// Worker loop. Returns once `shutdown` fires and the active job wound down.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("⚙️  Queue worker started");
        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = self.next_job() => job,
            };

            let id = job.id;
            let chat_id = job.chat_id;
            let control = Arc::clone(job.control());
            let worker = Arc::clone(&self);
            let mut handle = tokio::spawn(async move { worker.process(job).await });

            let joined = tokio::select! {
                joined = &mut handle => joined,
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, cancelling job {}", id);
                    control.request_cancel();
                    handle.await
                }
            };
            if let Err(e) = joined {
                log::error!("💥 Job {} crashed: {}", id, e);
                self.recover_crashed(id, chat_id).await;
            }
        }
        info!("⚙️  Queue worker stopped");
    }

    async fn next_job(&self) -> Job {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(job) = state.pending.pop_front() {
                    state.active = Some(job.clone());
                    return job;
                }
            }
            self.wake.notified().await;
        }
    }

    fn job_dir(&self, id: JobId) -> PathBuf {
        self.disk.root().join(format!("{}{}", JOB_DIR_PREFIX, id))
    }

    async fn process(&self, mut job: Job) {
        let id = job.id;
        let started = Instant::now();
        info!("▶️  Job {} started: {} {}", id, job.kind.as_str(), job.url);
        let _ = self.events.send(JobEvent::Started { id });

        let workdir = self.job_dir(id);
        let mut progress = ProgressMessage::new(job.chat_id, id, job.quality)
            .with_message(job.status_message)
            .with_reply_to(job.reply_to);
        let mut ledger = DiskLedger::default();

        let outcome = self.execute(&mut job, &workdir, &mut progress, &mut ledger).await;

        // Cleanup runs on every path before the final message goes out
        if let Err(e) = remove_dir(&workdir).await {
            log::error!("Failed to remove {}: {}", workdir.display(), e);
        }
        self.disk.release_reservation(ledger.reserved);
        self.disk.release(ledger.committed);

        let (status, final_status, failure) = match outcome {
            Ok(title) => (JobStatus::Done, DownloadStatus::Done { title }, None),
            Err(JobFailure::Cancelled) => (JobStatus::Cancelled, DownloadStatus::Cancelled, None),
            Err(failure) => (
                JobStatus::Failed,
                DownloadStatus::Failed {
                    reason: failure.user_message(),
                },
                Some(failure),
            ),
        };

        self.finish_active(&mut job, status).await;
        match &failure {
            Some(f) => log::warn!(
                "❌ Job {} failed [{}] after {:.1}s: {}",
                id,
                f.subcategory(),
                started.elapsed().as_secs_f64(),
                f
            ),
            None => info!("🏁 Job {} {} after {:.1}s", id, status.as_str(), started.elapsed().as_secs_f64()),
        }

        if let Err(e) = progress.update(&*self.messenger, &final_status).await {
            log::error!("Failed to send final status for job {}: {}", id, e);
        }
        let _ = self.events.send(JobEvent::Finished {
            id,
            chat_id: job.chat_id,
            status,
            failure,
        });
    }

    async fn execute(
        &self,
        job: &mut Job,
        workdir: &Path,
        progress: &mut ProgressMessage,
        ledger: &mut DiskLedger,
    ) -> Result<String, JobFailure> {
        if job.is_cancel_requested() {
            return Err(JobFailure::Cancelled);
        }
        self.transition(job, JobStatus::Downloading).await;
        self.show(progress, &DownloadStatus::Starting).await;

        tokio::fs::create_dir_all(workdir)
            .await
            .map_err(|e| JobFailure::Extraction(ExtractionFailure::other(format!("cannot create work dir: {}", e))))?;

        match job.kind {
            JobKind::Playlist => self.run_playlist(job, workdir, progress, ledger).await,
            JobKind::Video | JobKind::Audio => {
                let url = job.url.clone();
                self.deliver(job, &url, workdir, progress, ledger).await
            }
        }
    }

    /// Fetches one URL and uploads the result. Returns the media title.
    async fn deliver(
        &self,
        job: &mut Job,
        url: &str,
        workdir: &Path,
        progress: &mut ProgressMessage,
        ledger: &mut DiskLedger,
    ) -> Result<String, JobFailure> {
        let media = self.fetch_with_rotation(job, url, workdir, progress, ledger).await?;
        if job.is_cancel_requested() {
            return Err(JobFailure::Cancelled);
        }

        self.transition(job, JobStatus::Uploading).await;
        self.show(
            progress,
            &DownloadStatus::Uploading {
                title: media.title.clone(),
            },
        )
        .await;

        let request = UploadRequest {
            chat_id: job.chat_id,
            file_path: media.file_path.clone(),
            caption: truncate_chars(&job.caption_for(&media.title), CAPTION_MAX_CHARS - CAPTION_PART_RESERVE),
            kind: if media.quality.is_audio() {
                JobKind::Audio
            } else {
                JobKind::Video
            },
            quality: media.quality,
            reply_to: job.reply_to,
            source_url: url.to_string(),
        };

        match self.uploader.send(&request, job.control()).await {
            Ok(receipt) => {
                info!("📤 Job {} uploaded {} in {} part(s)", job.id, media.file_path.display(), receipt.parts);
                Ok(media.title)
            }
            Err(UploadError::Cancelled) => Err(JobFailure::Cancelled),
            Err(UploadError::Failed(msg)) => Err(JobFailure::Upload(msg)),
        }
    }

    /// Runs extraction, walking the proxy list on geo-restriction.
    ///
    /// The attempt's reservation is either committed or released before this
    /// returns, so a skipped playlist item holds nothing against the ceiling.
    async fn fetch_with_rotation(
        &self,
        job: &mut Job,
        url: &str,
        workdir: &Path,
        progress: &mut ProgressMessage,
        ledger: &mut DiskLedger,
    ) -> Result<MediaResult, JobFailure> {
        job.control().reset_progress();
        let mut reserved = 0u64;
        let mut last_geo: Option<ExtractionFailure> = None;

        let outcome = loop {
            if job.is_cancel_requested() {
                break Err(JobFailure::Cancelled);
            }
            let proxy = match self.proxies.next(job) {
                Rotation::Next(proxy) => proxy,
                Rotation::Exhausted { attempts } => {
                    break Err(JobFailure::AllProxiesExhausted {
                        attempts,
                        last: last_geo
                            .take()
                            .unwrap_or_else(|| ExtractionFailure::new(FailureKind::GeoRestricted, "geo-restricted")),
                    });
                }
            };
            let attempt = job.proxy_attempt_index;
            if attempt > 1 {
                self.show(
                    progress,
                    &DownloadStatus::Retrying {
                        attempt,
                        of: self.proxies.len(),
                    },
                )
                .await;
            }

            if reserved == 0 {
                if let Some(estimate) = self.extractor.estimate_size(url, job.quality, &proxy).await {
                    match self.disk.reserve(estimate) {
                        Reservation::Allowed => {
                            reserved = estimate;
                            ledger.reserved += estimate;
                        }
                        Reservation::Denied { used, requested, limit } => {
                            break Err(JobFailure::DiskLimitExceeded { used, requested, limit });
                        }
                    }
                }
            }

            info!("⬇️  Job {} attempt {} via {}", job.id, attempt, proxy);
            let (tx, rx) = mpsc::unbounded_channel();
            let sink = ProgressSink::new(Arc::clone(job.control()), Arc::clone(&self.disk), reserved, tx);
            let request = FetchRequest {
                url: url.to_string(),
                quality: job.quality,
                output_dir: workdir.to_path_buf(),
                proxy: proxy.clone(),
            };

            match self.fetch_with_progress(request, sink, rx, progress).await {
                Ok(media) => {
                    ledger.reserved = ledger.reserved.saturating_sub(reserved);
                    let verdict = self.disk.commit(reserved, media.size_bytes);
                    reserved = 0;
                    break match verdict {
                        Reservation::Allowed => {
                            ledger.committed += media.size_bytes;
                            Ok(media)
                        }
                        Reservation::Denied { used, requested, limit } => {
                            Err(JobFailure::DiskLimitExceeded { used, requested, limit })
                        }
                    };
                }
                Err(FetchError::Interrupted(Interrupt::Cancelled)) => break Err(JobFailure::Cancelled),
                Err(FetchError::Interrupted(Interrupt::DiskLimit { used, requested, limit })) => {
                    break Err(JobFailure::DiskLimitExceeded { used, requested, limit });
                }
                Err(FetchError::Failed(failure)) if failure.is_geo_restricted() => {
                    log::warn!("🌍 Job {} geo-restricted via {}: {}", job.id, proxy, failure.message);
                    if let Err(e) = reset_dir(workdir).await {
                        log::error!("Failed to clear partial files in {}: {}", workdir.display(), e);
                    }
                    last_geo = Some(failure);
                }
                Err(FetchError::Failed(failure)) => break Err(JobFailure::Extraction(failure)),
            }
        };

        if reserved > 0 {
            self.disk.release_reservation(reserved);
            ledger.reserved = ledger.reserved.saturating_sub(reserved);
        }
        outcome
    }

    /// Awaits the adapter while turning its progress into throttled edits.
    async fn fetch_with_progress(
        &self,
        request: FetchRequest,
        sink: ProgressSink,
        mut updates: mpsc::UnboundedReceiver<ProgressUpdate>,
        progress: &mut ProgressMessage,
    ) -> Result<MediaResult, FetchError> {
        let mut throttle = ProgressThrottle::new(self.progress);
        let fetch = self.extractor.fetch(request, sink);
        tokio::pin!(fetch);

        loop {
            tokio::select! {
                result = &mut fetch => return result,
                Some(update) = updates.recv() => {
                    if throttle.should_emit(update.percent(), Instant::now()) {
                        let status = DownloadStatus::Downloading {
                            percent: update.percent(),
                            downloaded: update.downloaded,
                            total: update.total,
                            speed: update.speed,
                            eta_secs: update.eta_secs,
                        };
                        self.show(progress, &status).await;
                    }
                }
            }
        }
    }

    /// Fetches and uploads playlist items one after another.
    ///
    /// A failed item is reported and skipped. Cancellation, the disk ceiling
    /// and upload failures abort the whole playlist.
    async fn run_playlist(
        &self,
        job: &mut Job,
        workdir: &Path,
        progress: &mut ProgressMessage,
        ledger: &mut DiskLedger,
    ) -> Result<String, JobFailure> {
        let playlist = self.list_playlist(&job.url).await?;
        if playlist.entries.is_empty() {
            return Err(JobFailure::Extraction(ExtractionFailure::new(
                FailureKind::NotFound,
                "playlist is empty",
            )));
        }

        let total = playlist.entries.len();
        info!("📃 Job {} playlist '{}' with {} items", job.id, playlist.title, total);
        let mut delivered = 0usize;
        let mut last_failure = None;

        for (index, entry) in playlist.entries.iter().enumerate() {
            if job.is_cancel_requested() {
                return Err(JobFailure::Cancelled);
            }
            if job.status() == JobStatus::Uploading {
                self.transition(job, JobStatus::Downloading).await;
            }
            self.show(
                progress,
                &DownloadStatus::PlaylistItem {
                    index: index + 1,
                    total,
                    title: entry.title.clone(),
                },
            )
            .await;

            job.proxy_attempt_index = 0;
            match self.deliver(job, &entry.url, workdir, progress, ledger).await {
                Ok(_) => delivered += 1,
                Err(failure @ (JobFailure::Cancelled | JobFailure::DiskLimitExceeded { .. } | JobFailure::Upload(_))) => {
                    return Err(failure);
                }
                Err(failure) => {
                    log::warn!("⚠️  Job {} skipped playlist item {}: {}", job.id, entry.url, failure);
                    let text = format!("⚠️ Skipped {}: {}", entry.title, failure.user_message());
                    if let Err(e) = self.messenger.send_text(job.chat_id, &text, MessageOptions::default()).await {
                        log::warn!("Failed to report skipped item: {}", e);
                    }
                    last_failure = Some(failure);
                }
            }

            // Free the item before starting the next one
            self.disk.release(ledger.committed);
            ledger.committed = 0;
            if let Err(e) = reset_dir(workdir).await {
                log::error!("Failed to clear {}: {}", workdir.display(), e);
            }
        }

        if delivered == 0 {
            return Err(last_failure.unwrap_or_else(|| {
                JobFailure::Extraction(ExtractionFailure::other("no playlist item could be downloaded"))
            }));
        }
        if job.status() != JobStatus::Uploading {
            self.transition(job, JobStatus::Uploading).await;
        }
        Ok(format!("{} ({}/{} items)", playlist.title, delivered, total))
    }

    async fn list_playlist(&self, url: &str) -> Result<Playlist, JobFailure> {
        let mut cursor = 0usize;
        let mut last_geo = None;
        loop {
            match self.proxies.advance(&mut cursor) {
                Rotation::Next(proxy) => match self.extractor.list_playlist(url, &proxy).await {
                    Ok(playlist) => return Ok(playlist),
                    Err(failure) if failure.is_geo_restricted() => last_geo = Some(failure),
                    Err(failure) => return Err(JobFailure::Extraction(failure)),
                },
                Rotation::Exhausted { attempts } => {
                    return Err(JobFailure::AllProxiesExhausted {
                        attempts,
                        last: last_geo.unwrap_or_else(|| ExtractionFailure::new(FailureKind::GeoRestricted, "geo-restricted")),
                    });
                }
            }
        }
    }

    /// Applies a non-terminal transition to the worker's copy and the shared one.
    async fn transition(&self, job: &mut Job, next: JobStatus) {
        if let Err(e) = job.transition(next) {
            log::error!("Job {}: {}", job.id, e);
            return;
        }
        let mut state = self.state.lock().await;
        if let Some(active) = state.active.as_mut().filter(|active| active.id == job.id) {
            let _ = active.transition(next);
        }
    }

    /// Moves the job to its terminal state and frees the worker slot.
    async fn finish_active(&self, job: &mut Job, status: JobStatus) {
        if let Err(e) = job.transition(status) {
            log::error!("Job {}: {}", job.id, e);
        }
        let mut state = self.state.lock().await;
        if state.active.as_ref().map(|active| active.id) == Some(job.id) {
            state.active = None;
        }
    }

    async fn recover_crashed(&self, id: JobId, chat_id: ChatId) {
        let lost = {
            let mut state = self.state.lock().await;
            if state.active.as_ref().map(|active| active.id) == Some(id) {
                state.active.take()
            } else {
                None
            }
        };
        let workdir = self.job_dir(id);
        if let Err(e) = remove_dir(&workdir).await {
            log::error!("Failed to remove {}: {}", workdir.display(), e);
        }
        // The lost job never released its share
        self.disk.clear_job_usage();
        if let Err(e) = self.disk.reconcile() {
            log::error!("Failed to reconcile disk usage: {}", e);
        }

        let failure = JobFailure::Extraction(ExtractionFailure::other("internal error"));
        let text = DownloadStatus::Failed {
            reason: failure.user_message(),
        };
        let mut progress = match &lost {
            Some(job) => ProgressMessage::new(chat_id, id, job.quality)
                .with_message(job.status_message)
                .with_reply_to(job.reply_to),
            None => ProgressMessage::new(chat_id, id, Quality::P720),
        };
        if let Err(e) = progress.update(&*self.messenger, &text).await {
            log::error!("Failed to report crash of job {}: {}", id, e);
        }
        let _ = self.events.send(JobEvent::Finished {
            id,
            chat_id,
            status: JobStatus::Failed,
            failure: Some(failure),
        });
    }

    async fn show(&self, progress: &mut ProgressMessage, status: &DownloadStatus) {
        if let Err(e) = progress.update(&*self.messenger, status).await {
            log::warn!("Progress update failed: {}", e);
        }
    }
}

async fn remove_dir(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Empties a job directory, keeping the directory itself
async fn reset_dir(path: &Path) -> io::Result<()> {
    remove_dir(path).await?;
    tokio::fs::create_dir_all(path).await
}
