/// Classification of yt-dlp failures
///
/// yt-dlp reports everything through free-form stderr text. The matching
/// below is case-insensitive substring search, checked in order: unsupported
/// URLs first, then hard "not found" cases, then everything that a different
/// network location might fix.
use crate::download::error::{ExtractionFailure, FailureKind};

const UNSUPPORTED_PATTERNS: &[&str] = &["unsupported url", "no suitable extractor", "is not a valid url"];

const NOT_FOUND_PATTERNS: &[&str] = &[
    "http error 404",
    "this video does not exist",
    "does not exist",
    "video has been removed",
    "no video formats found",
];

/// Phrases yt-dlp and the sites use when the viewer's location or account is
/// the problem. Private and age-gated videos are included: a different exit
/// node sometimes gets through, and nothing else can.
const GEO_PATTERNS: &[&str] = &[
    "video unavailable",
    "is not available in your country",
    "not made this video available in your country",
    "available in your country",
    "geo restrict",
    "geo-restrict",
    "georestrict",
    "blocked",
    "not available",
    "sign in to confirm your age",
    "this video is not available",
    "private video",
    "removed by the uploader",
    "uploader has not made this video available",
    "country",
];

/// Returns true if the stderr text looks like a geo-restriction.
pub fn is_geo_restricted(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    GEO_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Classifies yt-dlp stderr output
///
/// # Arguments
/// - `stderr`: stderr captured from yt-dlp
///
/// # Returns
/// - `FailureKind`: the detected category
pub fn classify_ytdlp_error(stderr: &str) -> FailureKind {
    let lower = stderr.to_lowercase();

    if UNSUPPORTED_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::Unsupported;
    }
    if NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::NotFound;
    }
    if GEO_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::GeoRestricted;
    }
    FailureKind::Other
}

/// Builds an [`ExtractionFailure`] from yt-dlp's stderr, keeping only the
/// `ERROR:` lines when there are any.
pub fn failure_from_stderr(stderr: &str) -> ExtractionFailure {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    let message = if errors.is_empty() {
        stderr.trim().to_string()
    } else {
        errors.join("\n")
    };
    ExtractionFailure::new(classify_ytdlp_error(stderr), message)
}
