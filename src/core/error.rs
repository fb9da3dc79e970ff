use thiserror::Error;

use crate::core::config::ConfigError;

/// Centralized infrastructure error type.
///
/// Job-level outcomes (disk ceiling, proxy exhaustion, upload failure) live in
/// [`crate::download::error::JobFailure`]; this enum covers everything that
/// can go wrong underneath them.
///
/// # Example
///
/// ```no_run
/// use queuebot::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Channel listing failed for one subscription
    #[error("Subscription listing failed for {channel}: {reason}")]
    SubscriptionList { channel: String, reason: String },

    /// A chat tried to subscribe to a channel twice
    #[error("Already subscribed to {0}")]
    AlreadySubscribed(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
