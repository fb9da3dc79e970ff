//! Upload adapter boundary

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use teloxide::types::ChatId;

use crate::download::job::{JobControl, JobKind, Quality};

/// A finished download ready to be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub chat_id: ChatId,
    pub file_path: PathBuf,
    pub caption: String,
    pub kind: JobKind,
    pub quality: Quality,
    pub reply_to: Option<i32>,
    /// Original media URL, used for follow-up actions such as "audio only"
    pub source_url: String,
}

/// What was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReceipt {
    /// 1 for a single file, more when the media had to be split
    pub parts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Cancel flag seen between parts
    Cancelled,
    Failed(String),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Cancelled => write!(f, "upload cancelled"),
            UploadError::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for UploadError {}

/// Wraps the transport's send-file capability.
///
/// Implementations split files above the transport limit into sequential
/// parts, upload them in order and check `control` between parts.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn send(&self, request: &UploadRequest, control: &JobControl) -> Result<UploadReceipt, UploadError>;
}

/// Caption for part `index` (1-based) of `total`.
pub fn part_caption(caption: &str, index: usize, total: usize) -> String {
    if total <= 1 {
        caption.to_string()
    } else {
        format!("{} (Part {}/{})", caption, index, total)
    }
}
