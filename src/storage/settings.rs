//! Per-chat defaults for bare links

use rusqlite::{OptionalExtension, params};

use crate::core::error::AppResult;
use crate::download::job::Quality;
use crate::storage::db::{DbPool, get_connection};

/// Default resolution when nothing is stored
pub const DEFAULT_RESOLUTION: u32 = 1080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Video,
    Audio,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadMode::Video => "video",
            DownloadMode::Audio => "audio",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "video" => Some(DownloadMode::Video),
            "audio" => Some(DownloadMode::Audio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSettings {
    pub download_mode: DownloadMode,
    /// Video height in pixels
    pub resolution: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            download_mode: DownloadMode::Video,
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl UserSettings {
    /// Quality a bare link is downloaded at
    pub fn quality(&self) -> Quality {
        match self.download_mode {
            DownloadMode::Audio => Quality::Audio,
            DownloadMode::Video => Quality::from_height(self.resolution).unwrap_or(Quality::P1080),
        }
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    pool: DbPool,
}

impl SettingsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Stored settings, or defaults for chats that never changed anything
    pub fn get(&self, chat_id: i64) -> AppResult<UserSettings> {
        let conn = get_connection(&self.pool)?;
        let row = conn
            .query_row(
                "SELECT download_mode, resolution FROM user_settings WHERE chat_id = ?1",
                params![chat_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((mode, resolution)) => UserSettings {
                download_mode: DownloadMode::parse(&mode).unwrap_or(DownloadMode::Video),
                resolution,
            },
            None => UserSettings::default(),
        })
    }

    pub fn set_mode(&self, chat_id: i64, mode: DownloadMode) -> AppResult<()> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "INSERT INTO user_settings (chat_id, download_mode) VALUES (?1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET download_mode = ?2, updated_at = CURRENT_TIMESTAMP",
            params![chat_id, mode.as_str()],
        )?;
        Ok(())
    }

    pub fn set_resolution(&self, chat_id: i64, resolution: u32) -> AppResult<()> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "INSERT INTO user_settings (chat_id, resolution) VALUES (?1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET resolution = ?2, updated_at = CURRENT_TIMESTAMP",
            params![chat_id, resolution],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::create_memory_pool;

    #[test]
    fn test_defaults_then_updates() {
        let store = SettingsStore::new(create_memory_pool().unwrap());
        assert_eq!(store.get(7).unwrap(), UserSettings::default());
        assert_eq!(store.get(7).unwrap().quality(), Quality::P1080);

        store.set_resolution(7, 480).unwrap();
        assert_eq!(store.get(7).unwrap().quality(), Quality::P480);

        store.set_mode(7, DownloadMode::Audio).unwrap();
        let settings = store.get(7).unwrap();
        assert_eq!(settings.resolution, 480);
        assert_eq!(settings.quality(), Quality::Audio);
    }
}
