//! Configuration, errors, logging and the disk guard

pub mod config;
pub mod disk;
pub mod error;
pub mod logging;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use disk::DiskGuard;
pub use error::{AppError, AppResult};
pub use logging::init_logger;
