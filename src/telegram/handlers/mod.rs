//! Telegram bot handler tree configuration
//!
//! This module provides the main dispatcher schema for the Telegram bot.
//! Argument parsing is kept in plain functions so it can be tested without
//! a bot.

mod callbacks;
mod commands;
mod schema;
mod types;

pub use commands::{ArgError, extract_url, parse_cancel_arg, parse_download_args, parse_subscribe_args};
pub use schema::schema;
pub use types::{HandlerDeps, HandlerError};
