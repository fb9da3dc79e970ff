//! Channel subscriptions and their seen-sets.
//!
//! Each statement touches one subscription record (or its seen rows) and is
//! atomic on its own, so a seen-set append racing an unsubscribe either lands
//! before the delete and is cascaded away, or finds no parent row and does
//! nothing.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{ErrorCode, OptionalExtension, TransactionBehavior, params};

use crate::core::error::{AppError, AppResult};
use crate::download::job::Quality;
use crate::storage::db::{DbPool, get_connection};

/// A persisted subscription
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub chat_id: i64,
    pub channel_id: String,
    pub channel_url: String,
    pub channel_name: String,
    /// Quality new videos are downloaded at
    pub quality: Quality,
    pub created_at: DateTime<Utc>,
}

/// Fields of a subscription about to be created
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub chat_id: i64,
    pub channel_id: String,
    pub channel_url: String,
    pub channel_name: String,
    pub quality: Quality,
}

fn parse_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscription> {
    let quality: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(Subscription {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        channel_id: row.get(2)?,
        channel_url: row.get(3)?,
        channel_name: row.get(4)?,
        quality: Quality::parse(&quality).unwrap_or(Quality::P720),
        // SQLite CURRENT_TIMESTAMP is UTC
        created_at: NaiveDateTime::parse_from_str(&created_at, "%Y-%m-%d %H:%M:%S")
            .map(|t| t.and_utc())
            .unwrap_or_default(),
    })
}

fn quality_column(quality: Quality) -> String {
    match quality.height() {
        Some(h) => h.to_string(),
        None => "audio".to_string(),
    }
}

const SELECT_COLUMNS: &str = "SELECT id, chat_id, channel_id, channel_url, channel_name, quality, created_at FROM subscriptions";

/// CRUD over the `subscriptions` and `seen_videos` tables.
#[derive(Clone)]
pub struct SubscriptionStore {
    pool: DbPool,
}

impl SubscriptionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates a subscription and seeds its seen-set with `baseline`.
    ///
    /// # Returns
    /// The new subscription, or [`AppError::AlreadySubscribed`] when the chat
    /// already follows this channel
    pub fn add(&self, new: &NewSubscription, baseline: &[String]) -> AppResult<Subscription> {
        let mut conn = get_connection(&self.pool)?;
        // Takes the write lock up front so the duplicate check and the insert
        // see the same state
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT COUNT(*) FROM subscriptions WHERE chat_id = ?1 AND (channel_url = ?2 OR channel_id = ?3)",
            params![new.chat_id, new.channel_url, new.channel_id],
            |row| Ok(row.get::<_, i64>(0)? > 0),
        )?;
        if exists {
            return Err(AppError::AlreadySubscribed(new.channel_name.clone()));
        }

        tx.execute(
            "INSERT INTO subscriptions (chat_id, channel_id, channel_url, channel_name, quality)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.chat_id,
                new.channel_id,
                new.channel_url,
                new.channel_name,
                quality_column(new.quality)
            ],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => AppError::AlreadySubscribed(new.channel_name.clone()),
            _ => AppError::from(e),
        })?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO seen_videos (subscription_id, video_id) VALUES (?1, ?2)")?;
            for video_id in baseline {
                stmt.execute(params![id, video_id])?;
            }
        }
        let subscription = tx.query_row(&format!("{} WHERE id = ?1", SELECT_COLUMNS), params![id], parse_row)?;
        tx.commit()?;

        log::info!(
            "➕ Chat {} subscribed to {} ({} videos in baseline)",
            new.chat_id,
            new.channel_name,
            baseline.len()
        );
        Ok(subscription)
    }

    /// Deletes a subscription matched by channel URL or channel id, seen-set included.
    ///
    /// # Returns
    /// The removed subscription, `None` if the chat had no such subscription
    pub fn remove(&self, chat_id: i64, channel: &str) -> AppResult<Option<Subscription>> {
        let conn = get_connection(&self.pool)?;
        let existing = conn
            .query_row(
                &format!(
                    "{} WHERE chat_id = ?1 AND (channel_url = ?2 OR channel_id = ?2)",
                    SELECT_COLUMNS
                ),
                params![chat_id, channel],
                parse_row,
            )
            .optional()?;
        if let Some(sub) = &existing {
            conn.execute("DELETE FROM subscriptions WHERE id = ?1", params![sub.id])?;
            log::info!("➖ Chat {} unsubscribed from {}", chat_id, sub.channel_name);
        }
        Ok(existing)
    }

    pub fn get(&self, id: i64) -> AppResult<Option<Subscription>> {
        let conn = get_connection(&self.pool)?;
        Ok(conn
            .query_row(&format!("{} WHERE id = ?1", SELECT_COLUMNS), params![id], parse_row)
            .optional()?)
    }

    /// Subscriptions of one chat, oldest first
    pub fn list_for_chat(&self, chat_id: i64) -> AppResult<Vec<Subscription>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare(&format!("{} WHERE chat_id = ?1 ORDER BY id ASC", SELECT_COLUMNS))?;
        let rows = stmt.query_map(params![chat_id], parse_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every subscription, in creation order
    pub fn all(&self) -> AppResult<Vec<Subscription>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id ASC", SELECT_COLUMNS))?;
        let rows = stmt.query_map([], parse_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn seen_ids(&self, subscription_id: i64) -> AppResult<HashSet<String>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare("SELECT video_id FROM seen_videos WHERE subscription_id = ?1")?;
        let rows = stmt.query_map(params![subscription_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
    }

    /// Appends one id to the seen-set.
    ///
    /// # Returns
    /// `false` if the id was already present or the subscription is gone
    pub fn mark_seen(&self, subscription_id: i64, video_id: &str) -> AppResult<bool> {
        let conn = get_connection(&self.pool)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO seen_videos (subscription_id, video_id)
             SELECT ?1, ?2 WHERE EXISTS (SELECT 1 FROM subscriptions WHERE id = ?1)",
            params![subscription_id, video_id],
        )?;
        Ok(inserted > 0)
    }
}
