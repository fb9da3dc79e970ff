//! SQLite persistence: subscriptions, seen-sets and chat settings

pub mod db;
pub mod settings;
pub mod subscriptions;

// Re-exports for convenience
pub use db::{DbConnection, DbPool, create_pool, get_connection};
pub use settings::{DownloadMode, SettingsStore, UserSettings};
pub use subscriptions::{NewSubscription, Subscription, SubscriptionStore};
