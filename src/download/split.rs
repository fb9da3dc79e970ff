//! Splitting media above the transport limit into sequential parts

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::process::Command as TokioCommand;

/// Parts are cut at this share of the limit; stream copy cuts on keyframes
/// and overshoots a little.
const SAFETY_FACTOR: f64 = 0.95;

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex"));

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),

    #[error("could not determine media duration")]
    UnknownDuration,
}

/// Reads "Duration: HH:MM:SS.xx" from ffmpeg's banner output
pub fn parse_duration(ffmpeg_stderr: &str) -> Option<f64> {
    let caps = DURATION_RE.captures(ffmpeg_stderr)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    (total > 0.0).then_some(total)
}

/// Number of parts and the length of each for a file of `file_size` bytes
pub fn plan_segments(file_size: u64, limit: u64, duration_secs: f64) -> (u64, f64) {
    let safe_target = ((limit as f64) * SAFETY_FACTOR).max(1.0);
    let parts = ((file_size as f64) / safe_target).ceil().max(1.0) as u64;
    (parts, duration_secs / parts as f64)
}

async fn probe_duration(ffmpeg: &str, path: &Path) -> Result<f64, SplitError> {
    // ffmpeg exits non-zero without an output file; the banner is all we need
    let output = TokioCommand::new(ffmpeg)
        .arg("-hide_banner")
        .arg("-i")
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;
    parse_duration(&String::from_utf8_lossy(&output.stderr)).ok_or(SplitError::UnknownDuration)
}

/// Splits `path` into playable parts no larger than roughly `limit` bytes.
///
/// Files already under the limit come back unchanged as a single entry.
/// Parts land next to the source as `<stem>_part_000.<ext>`, in order.
pub async fn split_into_parts(ffmpeg: &str, path: &Path, limit: u64) -> Result<Vec<PathBuf>, SplitError> {
    let file_size = tokio::fs::metadata(path).await?.len();
    if file_size <= limit {
        return Ok(vec![path.to_path_buf()]);
    }

    let duration = probe_duration(ffmpeg, path).await?;
    let (parts, segment_secs) = plan_segments(file_size, limit, duration);
    log::info!(
        "✂️  Splitting {} ({} bytes, {:.0}s) into {} parts of ~{:.1}s",
        path.display(),
        file_size,
        duration,
        parts,
        segment_secs
    );

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "media".to_string());
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    let pattern = parent.join(format!("{}_part_%03d.{}", stem, ext));

    let output = TokioCommand::new(ffmpeg)
        .arg("-hide_banner")
        .arg("-y")
        .arg("-i")
        .arg(path)
        .args(["-f", "segment", "-segment_time"])
        .arg(format!("{:.3}", segment_secs))
        .args(["-c", "copy", "-map", "0", "-reset_timestamps", "1"])
        .arg(&pattern)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SplitError::Ffmpeg(stderr.lines().last().unwrap_or_default().to_string()));
    }

    let prefix = format!("{}_part_", stem);
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(parent).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && name.ends_with(&format!(".{}", ext)) {
            found.push(entry.path());
        }
    }
    found.sort();

    if found.is_empty() {
        return Err(SplitError::Ffmpeg("no parts were written".to_string()));
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        let banner = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'a.mp4':\n  Duration: 00:10:30.50, start: 0.000000, bitrate: 1000 kb/s";
        assert_eq!(parse_duration(banner), Some(630.5));
        assert_eq!(parse_duration("  Duration: N/A, bitrate: N/A"), None);
        assert_eq!(parse_duration("no banner"), None);
    }

    #[test]
    fn test_plan_segments() {
        // 120 bytes over a 50 byte limit: 47.5 safe target -> 3 parts
        let (parts, secs) = plan_segments(120, 50, 300.0);
        assert_eq!(parts, 3);
        assert!((secs - 100.0).abs() < f64::EPSILON);

        let (parts, _) = plan_segments(10, 50, 60.0);
        assert_eq!(parts, 1);
    }

    #[tokio::test]
    async fn test_small_file_is_not_split() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"tiny").unwrap();
        let parts = split_into_parts("ffmpeg-not-needed", &path, 1024).await.unwrap();
        assert_eq!(parts, vec![path]);
    }
}
