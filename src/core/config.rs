//! Process-wide configuration
//!
//! Everything is read once at startup by [`Config::from_env`] and shared as an
//! `Arc<Config>`. Nothing here is mutated afterwards; there is no hot reload.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Bot API calls (in seconds)
    /// Large uploads through a local Bot API server can take a while
    pub const REQUEST_TIMEOUT_SECS: u64 = 900;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Longest a running extraction goes without looking at its cancel flag
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Log file used when LOG_FILE_PATH is unset
pub const DEFAULT_LOG_FILE: &str = "queuebot.log";

/// Bot API upload limits
pub mod limits {
    /// Public Bot API file limit is 50 MiB; keep 1 MiB of headroom for multipart overhead
    pub const STANDARD_API_LIMIT: u64 = 50 * 1024 * 1024 - 1024 * 1024;

    /// Local Bot API server accepts up to 2000 MiB
    pub const LOCAL_API_LIMIT: u64 = 2000 * 1024 * 1024 - 50 * 1024 * 1024;

    /// Returns true if the URL points to a self-hosted Bot API server.
    pub fn is_local_url(url: &str) -> bool {
        !url.contains("api.telegram.org")
    }
}

/// Subscription monitor timing
pub mod subscription {
    use super::Duration;

    /// Delay before the first poll so startup is not slowed by channel listings
    pub const INITIAL_DELAY_SECS: u64 = 30;

    /// Pause between two channels inside one poll cycle
    pub const CHANNEL_PAUSE_MS: u64 = 5000;

    pub fn initial_delay() -> Duration {
        Duration::from_secs(INITIAL_DELAY_SECS)
    }

    pub fn channel_pause() -> Duration {
        Duration::from_millis(CHANNEL_PAUSE_MS)
    }
}

/// Configuration loading failure. Always fatal at startup.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Throttling applied to progress edits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSettings {
    /// Minimum time between two edits of the same status message
    pub min_interval: Duration,
    /// Minimum percentage change between two edits
    pub min_step_percent: u8,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(3),
            min_step_percent: 5,
        }
    }
}

/// Immutable runtime configuration.
#[derive(Debug)]
pub struct Config {
    pub bot_token: SecretString,
    /// Custom Bot API server, `None` for the public API
    pub bot_api_url: Option<Url>,
    /// Chats allowed to use the bot; empty means everyone
    pub allowed_chat_ids: Vec<i64>,
    /// Proxy URLs in rotation order, deduplicated
    pub proxies: Vec<String>,
    /// Disk ceiling for the download root; 0 means unlimited
    pub disk_limit_bytes: u64,
    pub subscription_poll_interval: Duration,
    /// How many of a channel's latest uploads are listed per poll
    pub subscription_scan_depth: usize,
    pub download_root: PathBuf,
    pub database_path: PathBuf,
    pub log_file_path: PathBuf,
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,
    /// Hard limit enforced by the yt-dlp adapter on a single invocation
    pub extract_timeout: Duration,
    /// Largest file the transport accepts in one message
    pub upload_limit_bytes: u64,
    pub progress: ProgressSettings,
    pub disk_reconcile_interval: Duration,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// A `.env` file in the working directory is honored if present.
    ///
    /// # Returns
    /// * `Ok(Config)` - All required settings present and well-formed
    /// * `Err(ConfigError)` - Missing bot token or a malformed value
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `from_env` is a thin wrapper around this; tests pass a map instead of
    /// touching the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = get("BOT_TOKEN")
            .or_else(|| get("TELOXIDE_TOKEN"))
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let bot_api_url = match get("BOT_API_URL") {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                key: "BOT_API_URL",
                value: raw.clone(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        let allowed_chat_ids = parse_chat_ids(get("ALLOWED_CHAT_IDS").as_deref().unwrap_or_default())?;
        let proxies = parse_proxies(get("PROXY").as_deref(), get("PROXY_LIST").as_deref());
        let disk_limit_bytes = parse_disk_limit(get("MAX_DISK_BYTES").as_deref(), get("MAX_DISK_GB").as_deref())?;

        let upload_limit_bytes = match get("UPLOAD_LIMIT_MB") {
            Some(raw) => parse_number::<u64>("UPLOAD_LIMIT_MB", &raw)? * 1024 * 1024,
            None => match &bot_api_url {
                Some(url) if limits::is_local_url(url.as_str()) => limits::LOCAL_API_LIMIT,
                _ => limits::STANDARD_API_LIMIT,
            },
        };

        let progress = ProgressSettings {
            min_interval: Duration::from_secs(secs_or(&get, "PROGRESS_INTERVAL_SECS", 3)?),
            min_step_percent: match get("PROGRESS_STEP_PERCENT") {
                Some(raw) => parse_number::<u8>("PROGRESS_STEP_PERCENT", &raw)?.min(100),
                None => ProgressSettings::default().min_step_percent,
            },
        };

        Ok(Self {
            bot_token: SecretString::from(token),
            bot_api_url,
            allowed_chat_ids,
            proxies,
            disk_limit_bytes,
            subscription_poll_interval: Duration::from_secs(secs_or(&get, "SUBSCRIPTION_CHECK_INTERVAL", 300)?.max(1)),
            subscription_scan_depth: match get("SUBSCRIPTION_SCAN_DEPTH") {
                Some(raw) => parse_number::<usize>("SUBSCRIPTION_SCAN_DEPTH", &raw)?.max(1),
                None => 5,
            },
            download_root: expand_path(get("DOWNLOAD_DIR").as_deref().unwrap_or("./downloads")),
            database_path: expand_path(get("DATABASE_PATH").as_deref().unwrap_or("./data/subscriptions.db")),
            log_file_path: expand_path(get("LOG_FILE_PATH").as_deref().unwrap_or(DEFAULT_LOG_FILE)),
            ytdlp_bin: get("YTDL_BIN").unwrap_or_else(|| "yt-dlp".to_string()),
            ffmpeg_bin: get("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".to_string()),
            extract_timeout: Duration::from_secs(secs_or(&get, "EXTRACT_TIMEOUT_SECS", 3600)?),
            upload_limit_bytes,
            progress,
            disk_reconcile_interval: Duration::from_secs(secs_or(&get, "DISK_RECONCILE_INTERVAL_SECS", 300)?.max(1)),
        })
    }

    /// Returns true if the chat may use the bot.
    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.contains(&chat_id)
    }

    /// Returns true if uploads go through a self-hosted Bot API server.
    pub fn uses_local_bot_api(&self) -> bool {
        self.bot_api_url
            .as_ref()
            .map(|url| limits::is_local_url(url.as_str()))
            .unwrap_or(false)
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn secs_or<G>(get: &G, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_number::<u64>(key, &raw),
        None => Ok(default),
    }
}

/// Parses a comma separated list of chat ids. Empty input allows everyone.
pub fn parse_chat_ids(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_number::<i64>("ALLOWED_CHAT_IDS", part))
        .collect()
}

/// Merges `PROXY` and `PROXY_LIST` into one ordered, deduplicated list.
///
/// The single `PROXY` entry always comes first.
pub fn parse_proxies(single: Option<&str>, list: Option<&str>) -> Vec<String> {
    let mut proxies: Vec<String> = Vec::new();
    let candidates = single
        .into_iter()
        .chain(list.into_iter().flat_map(|l| l.split(',')))
        .map(str::trim)
        .filter(|p| !p.is_empty());

    for proxy in candidates {
        if !proxies.iter().any(|p| p == proxy) {
            proxies.push(proxy.to_string());
        }
    }
    proxies
}

/// Resolves the disk ceiling in bytes. `MAX_DISK_BYTES` wins over `MAX_DISK_GB`.
pub fn parse_disk_limit(bytes: Option<&str>, gigabytes: Option<&str>) -> Result<u64, ConfigError> {
    if let Some(raw) = bytes {
        return parse_number::<u64>("MAX_DISK_BYTES", raw);
    }
    let Some(raw) = gigabytes else {
        return Ok(0);
    };
    let gb = parse_number::<f64>("MAX_DISK_GB", raw)?;
    if !gb.is_finite() || gb < 0.0 {
        return Err(ConfigError::Invalid {
            key: "MAX_DISK_GB",
            value: raw.to_string(),
            reason: "must be a non-negative number".to_string(),
        });
    }
    Ok((gb * 1024.0 * 1024.0 * 1024.0) as u64)
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = config_from(&[]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("BOT_TOKEN"));
    }

    #[test]
    fn test_teloxide_token_fallback() {
        let config = config_from(&[("TELOXIDE_TOKEN", "123:abc")]).unwrap();
        assert_eq!(config.bot_token.expose_secret(), "123:abc");
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("BOT_TOKEN", "t")]).unwrap();
        assert!(config.allowed_chat_ids.is_empty());
        assert!(config.proxies.is_empty());
        assert_eq!(config.disk_limit_bytes, 0);
        assert_eq!(config.subscription_poll_interval, Duration::from_secs(300));
        assert_eq!(config.upload_limit_bytes, limits::STANDARD_API_LIMIT);
        assert_eq!(config.download_root, PathBuf::from("./downloads"));
        assert!(!config.uses_local_bot_api());
    }

    #[test]
    fn test_allow_list() {
        let config = config_from(&[("BOT_TOKEN", "t"), ("ALLOWED_CHAT_IDS", "1, -100200, 3")]).unwrap();
        assert_eq!(config.allowed_chat_ids, vec![1, -100200, 3]);
        assert!(config.is_chat_allowed(-100200));
        assert!(!config.is_chat_allowed(4));

        let open = config_from(&[("BOT_TOKEN", "t"), ("ALLOWED_CHAT_IDS", " ")]).unwrap();
        assert!(open.is_chat_allowed(4));
    }

    #[test]
    fn test_malformed_allow_list_rejected() {
        let err = config_from(&[("BOT_TOKEN", "t"), ("ALLOWED_CHAT_IDS", "1,abc")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ALLOWED_CHAT_IDS", .. }));
    }

    #[test]
    fn test_proxy_merge_keeps_order_and_dedups() {
        let proxies = parse_proxies(
            Some("socks5://a:1080"),
            Some("http://b:8080, socks5://a:1080,,http://c:3128"),
        );
        assert_eq!(proxies, vec!["socks5://a:1080", "http://b:8080", "http://c:3128"]);
        assert!(parse_proxies(None, None).is_empty());
    }

    #[test]
    fn test_disk_limit_parsing() {
        assert_eq!(parse_disk_limit(None, Some("1.5")).unwrap(), 1_610_612_736);
        assert_eq!(parse_disk_limit(Some("1000"), Some("5")).unwrap(), 1000);
        assert_eq!(parse_disk_limit(None, Some("0")).unwrap(), 0);
        assert!(parse_disk_limit(None, Some("-1")).is_err());
        assert!(parse_disk_limit(None, Some("lots")).is_err());
    }

    #[test]
    fn test_local_bot_api_raises_upload_limit() {
        let config = config_from(&[("BOT_TOKEN", "t"), ("BOT_API_URL", "http://localhost:8081")]).unwrap();
        assert!(config.uses_local_bot_api());
        assert_eq!(config.upload_limit_bytes, limits::LOCAL_API_LIMIT);

        let overridden = config_from(&[
            ("BOT_TOKEN", "t"),
            ("BOT_API_URL", "http://localhost:8081"),
            ("UPLOAD_LIMIT_MB", "100"),
        ])
        .unwrap();
        assert_eq!(overridden.upload_limit_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let err = config_from(&[("BOT_TOKEN", "t"), ("SUBSCRIPTION_CHECK_INTERVAL", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SUBSCRIPTION_CHECK_INTERVAL", .. }));
    }
}
