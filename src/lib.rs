//! Queuebot - Telegram bot that downloads videos one at a time
//!
//! Incoming links become jobs in a FIFO queue served by a single worker.
//! The worker reports progress by editing one status message per job,
//! rotates proxies when a site is geo-restricted, keeps the download
//! directory under a byte budget and uploads the result back to the chat.
//! A background monitor turns new uploads on subscribed channels into jobs.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging and the disk guard
//! - `download`: jobs, the queue worker, proxy rotation and the yt-dlp adapter
//! - `storage`: SQLite pool, subscriptions and per-chat settings
//! - `telegram`: bot setup, handlers and the Bot API adapters
//! - `watcher`: the subscription monitor and its scheduler

#![allow(clippy::too_many_arguments)]

pub mod cli;
pub mod core;
pub mod download;
pub mod storage;
pub mod telegram;
pub mod watcher;

// Re-export commonly used types for convenience
pub use crate::core::{AppError, AppResult, Config, DiskGuard, config};
pub use crate::download::{Job, JobId, JobRequest, JobStatus, QueueProcessor};
pub use crate::storage::{DbConnection, DbPool, create_pool, get_connection};
pub use crate::telegram::{HandlerDeps, schema};
pub use crate::watcher::SubscriptionMonitor;
