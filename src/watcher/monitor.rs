//! Channel subscription polling.
//!
//! Independent from teloxide: it reads the store, lists channels through the
//! [`Extractor`], feeds new videos into the [`QueueProcessor`] and announces
//! them through the [`Messenger`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use teloxide::types::ChatId;

use crate::core::config::{self, Config};
use crate::core::error::{AppError, AppResult};
use crate::download::extractor::{Extractor, VideoEntry};
use crate::download::job::{JobKind, JobRequest, Quality};
use crate::download::progress::{MessageOptions, Messenger};
use crate::download::queue::QueueProcessor;
use crate::storage::subscriptions::{NewSubscription, Subscription, SubscriptionStore};

/// Outcome of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Subscriptions listed successfully
    pub checked: usize,
    /// Subscriptions skipped because listing or storage failed
    pub failed: usize,
    /// Jobs enqueued for new videos
    pub enqueued: usize,
}

pub struct SubscriptionMonitor {
    store: SubscriptionStore,
    extractor: Arc<dyn Extractor>,
    queue: Arc<QueueProcessor>,
    messenger: Arc<dyn Messenger>,
    scan_depth: usize,
    channel_pause: Duration,
}

impl SubscriptionMonitor {
    pub fn new(
        store: SubscriptionStore,
        extractor: Arc<dyn Extractor>,
        queue: Arc<QueueProcessor>,
        messenger: Arc<dyn Messenger>,
        scan_depth: usize,
    ) -> Self {
        Self {
            store,
            extractor,
            queue,
            messenger,
            scan_depth: scan_depth.max(1),
            channel_pause: config::subscription::channel_pause(),
        }
    }

    pub fn from_config(
        config: &Config,
        store: SubscriptionStore,
        extractor: Arc<dyn Extractor>,
        queue: Arc<QueueProcessor>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self::new(store, extractor, queue, messenger, config.subscription_scan_depth)
    }

    /// Pause between two channels of one cycle; zero disables it
    pub fn with_channel_pause(mut self, pause: Duration) -> Self {
        self.channel_pause = pause;
        self
    }

    pub fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    /// Subscribes a chat to a channel
    ///
    /// The channel URL is resolved to its canonical identity first, and the
    /// current listing becomes the baseline seen-set so only videos published
    /// from now on get downloaded.
    ///
    /// # Arguments
    /// * `chat_id` - Subscribing chat
    /// * `url` - Any URL pointing at the channel
    /// * `quality` - Quality new videos are fetched at
    ///
    /// # Returns
    /// The stored subscription, [`AppError::AlreadySubscribed`] on a duplicate,
    /// [`AppError::SubscriptionList`] if the channel cannot be read
    pub async fn subscribe(&self, chat_id: i64, url: &str, quality: Quality) -> AppResult<Subscription> {
        let channel = self.extractor.resolve_channel(url).await.map_err(|e| AppError::SubscriptionList {
            channel: url.to_string(),
            reason: e.message,
        })?;
        let baseline: Vec<String> = self
            .extractor
            .list_channel_videos(&channel.url, self.scan_depth)
            .await
            .map_err(|e| AppError::SubscriptionList {
                channel: channel.url.clone(),
                reason: e.message,
            })?
            .videos
            .into_iter()
            .map(|v| v.id)
            .collect();

        self.store.add(
            &NewSubscription {
                chat_id,
                channel_id: channel.id,
                channel_url: channel.url,
                channel_name: channel.name,
                quality,
            },
            &baseline,
        )
    }

    /// Removes a subscription given the URL the user typed.
    ///
    /// Tries the stored URL and id first and only resolves the channel when
    /// neither matches.
    pub async fn unsubscribe(&self, chat_id: i64, url: &str) -> AppResult<Option<Subscription>> {
        if let Some(removed) = self.store.remove(chat_id, url)? {
            return Ok(Some(removed));
        }
        match self.extractor.resolve_channel(url).await {
            Ok(channel) => match self.store.remove(chat_id, &channel.id)? {
                Some(removed) => Ok(Some(removed)),
                None => self.store.remove(chat_id, &channel.url),
            },
            Err(e) => {
                log::debug!("Could not resolve {} for unsubscribe: {}", url, e);
                Ok(None)
            }
        }
    }

    /// Polls every subscription once.
    ///
    /// A failing subscription is logged and skipped; the others are still
    /// polled. Only failing to read the subscription list aborts the cycle.
    pub async fn run_poll_cycle(&self) -> AppResult<PollReport> {
        let subscriptions = self.store.all()?;
        let mut report = PollReport::default();
        if subscriptions.is_empty() {
            return Ok(report);
        }
        log::info!("🔎 Subscription cycle: {} subscription(s)", subscriptions.len());

        for (i, sub) in subscriptions.iter().enumerate() {
            if i > 0 && !self.channel_pause.is_zero() {
                tokio::time::sleep(self.channel_pause).await;
            }
            match self.poll_subscription(sub).await {
                Ok(enqueued) => {
                    report.checked += 1;
                    report.enqueued += enqueued;
                }
                Err(e) => {
                    report.failed += 1;
                    log::warn!("⚠️  Skipping {} for chat {} this cycle: {}", sub.channel_name, sub.chat_id, e);
                }
            }
        }

        log::info!(
            "🔎 Subscription cycle done: {} checked, {} failed, {} new video(s)",
            report.checked,
            report.failed,
            report.enqueued
        );
        Ok(report)
    }

    /// Diffs one channel against its seen-set and enqueues the new videos,
    /// oldest first. Returns how many were enqueued.
    pub async fn poll_subscription(&self, sub: &Subscription) -> AppResult<usize> {
        let listing = self
            .extractor
            .list_channel_videos(&sub.channel_url, self.scan_depth)
            .await
            .map_err(|e| AppError::SubscriptionList {
                channel: sub.channel_url.clone(),
                reason: e.message,
            })?;
        let seen = self.store.seen_ids(sub.id)?;
        let fresh = new_videos(listing.chronological(), &seen);

        let mut enqueued = 0;
        for video in fresh {
            // Claiming the id first means a concurrent unsubscribe wins
            if !self.store.mark_seen(sub.id, &video.id)? {
                continue;
            }
            self.deliver(sub, &video).await;
            enqueued += 1;
        }
        Ok(enqueued)
    }

    async fn deliver(&self, sub: &Subscription, video: &VideoEntry) {
        let chat_id = ChatId(sub.chat_id);
        let text = format!("🔔 New video from {}\n{}", sub.channel_name, video.title);
        if let Err(e) = self.messenger.send_text(chat_id, &text, MessageOptions::default()).await {
            log::warn!("Failed to announce {} to chat {}: {}", video.id, sub.chat_id, e);
        }

        let kind = if sub.quality.is_audio() {
            JobKind::Audio
        } else {
            JobKind::Video
        };
        let request = JobRequest::new(chat_id, video.url.clone(), kind, sub.quality)
            .caption_prefix(format!("📺 {}", sub.channel_name));
        let enqueued = self.queue.enqueue(request).await;
        log::info!(
            "📺 New video {} from {} queued as job {} for chat {}",
            video.id,
            sub.channel_name,
            enqueued.id,
            sub.chat_id
        );
    }
}

/// Videos not in `seen`, keeping the given order and dropping repeats
pub fn new_videos(chronological: Vec<VideoEntry>, seen: &HashSet<String>) -> Vec<VideoEntry> {
    let mut taken = HashSet::new();
    chronological
        .into_iter()
        .filter(|v| !seen.contains(&v.id) && taken.insert(v.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> VideoEntry {
        VideoEntry {
            id: id.to_string(),
            title: id.to_string(),
            url: format!("https://www.youtube.com/watch?v={}", id),
        }
    }

    #[test]
    fn test_new_videos_diff_keeps_order() {
        let seen: HashSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        let listing = vec![entry("A"), entry("B"), entry("C"), entry("D")];
        let ids: Vec<String> = new_videos(listing, &seen).into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["C", "D"]);
    }

    #[test]
    fn test_new_videos_drops_repeats_and_seen() {
        let seen: HashSet<String> = ["A"].iter().map(|s| s.to_string()).collect();
        let listing = vec![entry("A"), entry("C"), entry("C")];
        assert_eq!(new_videos(listing, &seen).len(), 1);
        assert!(new_videos(vec![entry("A")], &seen).is_empty());
    }
}
