//! Telegram bot integration and handlers

pub mod bot;
pub mod callbacks;
pub mod handlers;
pub mod messenger;
pub mod uploader;

// Re-exports for convenience
pub use bot::{Command, create_bot, setup_bot_commands};
pub use callbacks::CallbackAction;
pub use handlers::{HandlerDeps, HandlerError, schema};
pub use messenger::TelegramMessenger;
pub use uploader::TelegramUploader;
