//! Handler types and dependencies

use std::sync::Arc;

use crate::core::config::Config;
use crate::download::queue::QueueProcessor;
use crate::storage::settings::SettingsStore;
use crate::watcher::monitor::SubscriptionMonitor;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub config: Arc<Config>,
    pub queue: Arc<QueueProcessor>,
    pub monitor: Arc<SubscriptionMonitor>,
    pub settings: SettingsStore,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(
        config: Arc<Config>,
        queue: Arc<QueueProcessor>,
        monitor: Arc<SubscriptionMonitor>,
        settings: SettingsStore,
    ) -> Self {
        Self {
            config,
            queue,
            monitor,
            settings,
        }
    }

    /// Allow-list check; an empty list admits everyone
    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.config.is_chat_allowed(chat_id)
    }
}
