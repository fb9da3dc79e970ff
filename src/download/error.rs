use std::fmt;

use crate::core::utils::format_bytes;

/// Classification of an extraction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The media does not exist (404, removed, bad id)
    NotFound,
    /// The source refuses the current network location; retried via proxies
    GeoRestricted,
    /// No extractor understands the URL
    Unsupported,
    /// Anything else (network, tool crash, timeout)
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::GeoRestricted => "geo_restricted",
            FailureKind::Unsupported => "unsupported",
            FailureKind::Other => "other",
        }
    }
}

/// Failure reported by the extraction adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub kind: FailureKind,
    /// Raw reason, usually the relevant stderr lines of the tool
    pub message: String,
}

impl ExtractionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }

    pub fn is_geo_restricted(&self) -> bool {
        self.kind == FailureKind::GeoRestricted
    }
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}

impl std::error::Error for ExtractionFailure {}

/// Why a job ended without being done.
///
/// Every variant except `Cancelled` drives the job to `failed`; `Cancelled`
/// drives it to `cancelled`.
#[derive(Debug, Clone, PartialEq)]
pub enum JobFailure {
    /// Extraction failed for a reason proxies cannot fix
    Extraction(ExtractionFailure),
    /// The payload would push the download root over the ceiling
    DiskLimitExceeded { used: u64, requested: u64, limit: u64 },
    /// Every proxy was tried and the source stayed geo-restricted
    AllProxiesExhausted { attempts: usize, last: ExtractionFailure },
    /// The transport rejected the upload
    Upload(String),
    /// The user cancelled the job
    Cancelled,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Extraction(e) => write!(f, "extraction failed: {}", e),
            JobFailure::DiskLimitExceeded { used, requested, limit } => write!(
                f,
                "disk limit exceeded: {} used + {} requested > {} limit",
                used, requested, limit
            ),
            JobFailure::AllProxiesExhausted { attempts, last } => {
                write!(f, "all proxies exhausted after {} attempts: {}", attempts, last)
            }
            JobFailure::Upload(msg) => write!(f, "upload failed: {}", msg),
            JobFailure::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for JobFailure {}

impl From<ExtractionFailure> for JobFailure {
    fn from(e: ExtractionFailure) -> Self {
        JobFailure::Extraction(e)
    }
}

impl JobFailure {
    /// Returns subcategory for logs
    pub fn subcategory(&self) -> &'static str {
        match self {
            JobFailure::Extraction(e) => e.kind.as_str(),
            JobFailure::DiskLimitExceeded { .. } => "disk_limit",
            JobFailure::AllProxiesExhausted { .. } => "proxies_exhausted",
            JobFailure::Upload(_) => "upload",
            JobFailure::Cancelled => "cancelled",
        }
    }

    /// Human-readable reason sent to the chat
    pub fn user_message(&self) -> String {
        match self {
            JobFailure::Extraction(e) => match e.kind {
                FailureKind::NotFound => "Video not found. It may have been removed or the link is wrong.".to_string(),
                FailureKind::Unsupported => "This link is not supported.".to_string(),
                FailureKind::GeoRestricted => "The video is not available from the bot's location.".to_string(),
                FailureKind::Other => format!("Download failed: {}", first_line(&e.message)),
            },
            JobFailure::DiskLimitExceeded { requested, limit, .. } => format!(
                "Not enough storage: the file needs {} and the bot is limited to {}.",
                format_bytes(*requested),
                format_bytes(*limit)
            ),
            JobFailure::AllProxiesExhausted { attempts, .. } => format!(
                "The video is geo-restricted and all {} connection(s) were blocked.",
                attempts
            ),
            JobFailure::Upload(msg) => format!("Upload failed: {}", first_line(msg)),
            JobFailure::Cancelled => "Cancelled.".to_string(),
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("unknown error")
}
