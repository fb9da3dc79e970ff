//! Subscription monitor: polls followed channels for new videos.
//!
//! Architecture: the watcher module never talks to teloxide directly. New
//! videos go into the download queue and announcements go through the
//! `Messenger` trait.

pub mod monitor;
pub mod scheduler;

pub use monitor::{PollReport, SubscriptionMonitor};
pub use scheduler::start_monitor;
