//! Inline button payloads

use crate::download::job::{JobId, Quality};
use crate::storage::settings::DownloadMode;

/// Telegram rejects callback data longer than this
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// `cancel:<id>`
    Cancel(JobId),
    /// `audio:<url>`, audio-only download of an already sent video
    Audio(String),
    /// `mode:video|audio`
    Mode(DownloadMode),
    /// `res:<height>`
    Resolution(u32),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let (kind, value) = data.split_once(':')?;
        match kind {
            "cancel" => value.parse().ok().map(|id| CallbackAction::Cancel(JobId(id))),
            "audio" if !value.is_empty() => Some(CallbackAction::Audio(value.to_string())),
            "mode" => DownloadMode::parse(value).map(CallbackAction::Mode),
            "res" => value
                .parse::<u32>()
                .ok()
                .filter(|h| Quality::from_height(*h).is_some())
                .map(CallbackAction::Resolution),
            _ => None,
        }
    }

    pub fn to_data(&self) -> String {
        match self {
            CallbackAction::Cancel(id) => format!("cancel:{}", id.0),
            CallbackAction::Audio(url) => format!("audio:{}", url),
            CallbackAction::Mode(mode) => format!("mode:{}", mode.as_str()),
            CallbackAction::Resolution(height) => format!("res:{}", height),
        }
    }

    /// The payload if it fits Telegram's callback data limit
    pub fn fitting_data(&self) -> Option<String> {
        let data = self.to_data();
        (data.len() <= MAX_CALLBACK_DATA_BYTES).then_some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_known_actions() {
        assert_eq!(CallbackAction::parse("cancel:17"), Some(CallbackAction::Cancel(JobId(17))));
        assert_eq!(
            CallbackAction::parse("audio:https://youtu.be/abc"),
            Some(CallbackAction::Audio("https://youtu.be/abc".to_string()))
        );
        assert_eq!(CallbackAction::parse("mode:audio"), Some(CallbackAction::Mode(DownloadMode::Audio)));
        assert_eq!(CallbackAction::parse("res:480"), Some(CallbackAction::Resolution(480)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(CallbackAction::parse("cancel:abc"), None);
        assert_eq!(CallbackAction::parse("res:999"), None);
        assert_eq!(CallbackAction::parse("audio:"), None);
        assert_eq!(CallbackAction::parse("nothing"), None);
        assert_eq!(CallbackAction::parse("mode:both"), None);
    }

    #[test]
    fn test_audio_button_only_when_it_fits() {
        let short = CallbackAction::Audio("https://youtu.be/abc".to_string());
        assert!(short.fitting_data().is_some());
        let long = CallbackAction::Audio(format!("https://www.youtube.com/watch?v={}", "x".repeat(40)));
        assert!(long.fitting_data().is_none());
    }
}
