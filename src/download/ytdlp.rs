//! yt-dlp backed [`Extractor`]
//!
//! Downloads run the binary in a blocking task with line-buffered output so
//! progress can be parsed as it arrives. Listings and size estimates use
//! `-J` and read the JSON dump.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command as TokioCommand;
use url::Url;

use crate::core::config::{self, Config};
use crate::core::disk::dir_size;
use crate::download::error::{ExtractionFailure, FailureKind};
use crate::download::extractor::{
    ChannelInfo, ChannelListing, Checkpoint, Extractor, FetchError, FetchRequest, ListingOrder, MediaResult, Playlist,
    ProgressSink, ProgressUpdate, VideoEntry,
};
use crate::download::job::Quality;
use crate::download::proxy::ProxyDescriptor;
use crate::download::ytdlp_errors::failure_from_stderr;

/// Upper bound for metadata and listing calls
const LISTING_TIMEOUT: Duration = Duration::from_secs(120);

/// How many stderr lines are kept for error classification
const STDERR_TAIL_LINES: usize = 200;

/// Extensions that never are the final media file
const SIDECAR_EXTENSIONS: &[&str] = &["part", "json", "ytdl", "tmp", "temp", "jpg", "jpeg", "png", "webp"];

/// A fall below this fraction of the current count, without a
/// `Destination:` line, is read as a new stream rather than a revised estimate
const STREAM_RESTART_RATIO: f64 = 0.5;

/// Bytes written so far across the streams of one download.
///
/// yt-dlp restarts its counter for every stream (video, then audio), so
/// finished streams are carried over. Fragmented downloads only report an
/// approximate total that moves both ways; small drops just replace the
/// current figure.
#[derive(Debug, Default)]
struct ByteCounter {
    finished: u64,
    current: u64,
}

impl ByteCounter {
    fn next_stream(&mut self) {
        self.finished = self.finished.saturating_add(self.current);
        self.current = 0;
    }

    fn observe(&mut self, stream_bytes: u64) {
        if (stream_bytes as f64) < self.current as f64 * STREAM_RESTART_RATIO {
            self.next_stream();
        }
        self.current = stream_bytes;
    }

    fn total(&self) -> u64 {
        self.finished.saturating_add(self.current)
    }
}

fn is_new_destination(line: &str) -> bool {
    line.trim_start().starts_with("[download] Destination:")
}

/// HLS/DASH progress lines end with "(frag i/n)"
fn is_fragment_progress(line: &str) -> bool {
    line.contains("(frag ")
}

pub struct YtDlpExtractor {
    bin: String,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ytdlp_bin.clone(), config.extract_timeout)
    }

    async fn dump_json(&self, args: Vec<String>) -> Result<Value, ExtractionFailure> {
        log::debug!("yt-dlp {}", args.join(" "));
        let output = tokio::time::timeout(
            LISTING_TIMEOUT,
            TokioCommand::new(&self.bin)
                .args(&args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ExtractionFailure::other(format!("yt-dlp timed out after {}s", LISTING_TIMEOUT.as_secs())))?
        .map_err(|e| ExtractionFailure::other(format!("failed to start {}: {}", self.bin, e)))?;

        if !output.status.success() {
            return Err(failure_from_stderr(&String::from_utf8_lossy(&output.stderr)));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractionFailure::other(format!("unreadable yt-dlp output: {}", e)))
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn estimate_size(&self, url: &str, quality: Quality, proxy: &ProxyDescriptor) -> Option<u64> {
        let mut args = vec!["-J".to_string(), "--no-playlist".to_string()];
        args.push("-f".to_string());
        args.push(format_selector(quality));
        push_proxy(&mut args, proxy);
        args.push(url.to_string());

        match self.dump_json(args).await {
            Ok(info) => estimate_from_info(&info),
            Err(e) => {
                log::debug!("Size estimate for {} unavailable: {}", url, e);
                None
            }
        }
    }

    async fn fetch(&self, request: FetchRequest, sink: ProgressSink) -> Result<MediaResult, FetchError> {
        let bin = self.bin.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || run_download(&bin, request, &sink, timeout))
            .await
            .map_err(|e| FetchError::Failed(ExtractionFailure::other(format!("download task failed: {}", e))))?
    }

    async fn list_playlist(&self, url: &str, proxy: &ProxyDescriptor) -> Result<Playlist, ExtractionFailure> {
        let mut args = vec!["--flat-playlist".to_string(), "-J".to_string()];
        push_proxy(&mut args, proxy);
        args.push(url.to_string());
        let info = self.dump_json(args).await?;
        Ok(parse_playlist(&info))
    }

    async fn resolve_channel(&self, url: &str) -> Result<ChannelInfo, ExtractionFailure> {
        let args = vec![
            "--flat-playlist".to_string(),
            "--playlist-items".to_string(),
            "1".to_string(),
            "-J".to_string(),
            url.to_string(),
        ];
        let info = self.dump_json(args).await?;
        parse_channel_info(&info)
            .ok_or_else(|| ExtractionFailure::new(FailureKind::NotFound, format!("no channel found at {}", url)))
    }

    async fn list_channel_videos(&self, channel_url: &str, limit: usize) -> Result<ChannelListing, ExtractionFailure> {
        let args = vec![
            "--flat-playlist".to_string(),
            "--playlist-items".to_string(),
            format!("1-{}", limit.max(1)),
            "-J".to_string(),
            videos_tab_url(channel_url),
        ];
        let info = self.dump_json(args).await?;
        Ok(ChannelListing {
            videos: parse_entries(&info),
            order: ListingOrder::NewestFirst,
        })
    }
}

/// yt-dlp `-f` selector for a quality
pub fn format_selector(quality: Quality) -> String {
    match quality.height() {
        Some(h) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
        None => "bestaudio/best".to_string(),
    }
}

fn push_proxy(args: &mut Vec<String>, proxy: &ProxyDescriptor) {
    if let Some(url) = proxy.url() {
        args.push("--proxy".to_string());
        args.push(url.to_string());
    }
}

/// Full argument list for one download attempt
pub fn build_download_args(request: &FetchRequest) -> Vec<String> {
    let template = request.output_dir.join("%(id)s.%(ext)s");
    let mut args = vec![
        "-o".to_string(),
        template.to_string_lossy().into_owned(),
        "--newline".to_string(),
        "--no-playlist".to_string(),
        "--no-part".to_string(),
        "--write-info-json".to_string(),
        "--force-overwrites".to_string(),
        "--fragment-retries".to_string(),
        "10".to_string(),
        "--socket-timeout".to_string(),
        "30".to_string(),
        "-f".to_string(),
        format_selector(request.quality),
    ];
    if request.quality.is_audio() {
        args.extend(
            ["-x", "--audio-format", "m4a", "--audio-quality", "192K"]
                .iter()
                .map(|s| s.to_string()),
        );
    } else {
        args.push("--merge-output-format".to_string());
        args.push("mp4".to_string());
    }
    push_proxy(&mut args, &request.proxy);
    args.push(request.url.clone());
    args
}

enum OutputLine {
    Stdout(String),
    Stderr(String),
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Blocking download loop. Polls the sink at least every
/// [`config::CANCEL_POLL_INTERVAL`] even when yt-dlp is silent.
fn run_download(
    bin: &str,
    request: FetchRequest,
    sink: &ProgressSink,
    timeout: Duration,
) -> Result<MediaResult, FetchError> {
    let args = build_download_args(&request);
    log::debug!("yt-dlp command: {} {}", bin, args.join(" "));

    let mut child = Command::new(bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExtractionFailure::other(format!("failed to start {}: {}", bin, e)))?;

    let (tx, rx) = mpsc::channel::<OutputLine>();
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if tx.send(OutputLine::Stdout(line)).is_err() {
                    break;
                }
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if tx.send(OutputLine::Stderr(line)).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let started = Instant::now();
    let mut stderr_tail: VecDeque<String> = VecDeque::new();
    let mut bytes = ByteCounter::default();

    loop {
        let verdict = match rx.recv_timeout(config::CANCEL_POLL_INTERVAL) {
            Ok(OutputLine::Stdout(line)) => match parse_progress(&line) {
                Some(update) => {
                    bytes.observe(update.downloaded);
                    match sink.report(update) {
                        // Fragment totals are guesses; the job directory is not
                        Checkpoint::Continue if is_fragment_progress(&line) => {
                            let written = dir_size(&request.output_dir).unwrap_or_else(|_| bytes.total());
                            sink.checkpoint(written)
                        }
                        Checkpoint::Continue => sink.checkpoint(bytes.total()),
                        stop => stop,
                    }
                }
                None => {
                    if is_new_destination(&line) {
                        bytes.next_stream();
                    }
                    log::trace!("yt-dlp: {}", line);
                    sink.checkpoint(bytes.total())
                }
            },
            Ok(OutputLine::Stderr(line)) => {
                log::debug!("yt-dlp stderr: {}", line);
                stderr_tail.push_back(line);
                if stderr_tail.len() > STDERR_TAIL_LINES {
                    stderr_tail.pop_front();
                }
                sink.checkpoint(bytes.total())
            }
            // Silent stretches (merging, fragment downloads) are measured on disk
            Err(RecvTimeoutError::Timeout) => {
                let on_disk = dir_size(&request.output_dir).unwrap_or(0);
                sink.checkpoint(bytes.total().max(on_disk))
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Checkpoint::Stop(interrupt) = verdict {
            log::info!("Stopping yt-dlp: {:?}", interrupt);
            kill(&mut child);
            return Err(FetchError::Interrupted(interrupt));
        }
        if started.elapsed() > timeout {
            kill(&mut child);
            return Err(ExtractionFailure::other(format!("download timed out after {}s", timeout.as_secs())).into());
        }
    }

    let status = child
        .wait()
        .map_err(|e| ExtractionFailure::other(format!("yt-dlp process failed: {}", e)))?;
    if !status.success() {
        let stderr = stderr_tail.make_contiguous().join("\n");
        return Err(failure_from_stderr(&stderr).into());
    }

    let file_path = find_media_file(&request.output_dir)
        .ok_or_else(|| ExtractionFailure::other("yt-dlp finished but produced no file"))?;
    let size_bytes = std::fs::metadata(&file_path)
        .map(|m| m.len())
        .map_err(|e| ExtractionFailure::other(format!("cannot stat {}: {}", file_path.display(), e)))?;
    let info = read_info_json(&request.output_dir);
    let title = info
        .as_ref()
        .and_then(|v| v.get("title"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| file_path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default();
    let video_id = info
        .as_ref()
        .and_then(|v| v.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(MediaResult {
        file_path,
        size_bytes,
        title,
        video_id,
        quality: request.quality,
    })
}

/// Largest file in `dir` that is not a sidecar or partial download
pub fn find_media_file(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let ext = path.extension()?.to_string_lossy().to_lowercase();
            if SIDECAR_EXTENSIONS.contains(&ext.as_str()) {
                return None;
            }
            Some((meta.len(), path))
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, path)| path)
}

fn read_info_json(dir: &Path) -> Option<Value> {
    let path = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| p.to_string_lossy().ends_with(".info.json"))?;
    let raw = std::fs::read(path).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Parses a `--newline` progress line such as
/// `[download]  45.2% of ~10.00MiB at 500.00KiB/s ETA 00:10`, or the
/// unknown-size form `[download]   5.00MiB at  1.00MiB/s (00:00:05)`.
/// Fragmented downloads may write the estimate as `of ~ 245.03MiB`.
pub fn parse_progress(line: &str) -> Option<ProgressUpdate> {
    if is_new_destination(line) {
        return None;
    }
    let parts: Vec<&str> = line.split_whitespace().collect();
    let start = parts.iter().position(|part| *part == "[download]")?;
    let parts = &parts[start + 1..];

    if !parts.iter().any(|part| part.ends_with('%')) {
        return match parts {
            [size, "at", rate, ..] => Some(ProgressUpdate {
                downloaded: parse_size(size)?,
                total: None,
                speed: parse_size(rate).map(|b| b as f64),
                eta_secs: None,
            }),
            _ => None,
        };
    }

    let mut percent = None;
    let mut total = None;
    let mut speed = None;
    let mut eta_secs = None;

    for (i, part) in parts.iter().enumerate() {
        let next = parts.get(i + 1).copied();
        if let Some(p) = part.strip_suffix('%') {
            if let Ok(p) = p.parse::<f64>() {
                percent = Some(p.clamp(0.0, 100.0));
            }
        }
        match (*part, next) {
            ("of", Some("~")) => total = parts.get(i + 2).copied().and_then(parse_size),
            ("of", Some(size)) => total = parse_size(size.trim_start_matches('~')),
            ("at", Some(rate)) => speed = parse_size(rate).map(|b| b as f64),
            ("ETA", Some(eta)) => eta_secs = parse_eta(eta),
            _ => {}
        }
    }

    let percent = percent?;
    let downloaded = total.map(|t| (t as f64 * percent / 100.0) as u64).unwrap_or(0);
    Some(ProgressUpdate {
        downloaded,
        total,
        speed,
        eta_secs,
    })
}

/// "10.00MiB", "500.00KiB/s", "1.2GiB" to bytes
pub fn parse_size(size: &str) -> Option<u64> {
    let size = size.trim_end_matches("/s");
    let (number, multiplier) = if let Some(n) = size.strip_suffix("GiB") {
        (n, 1024.0 * 1024.0 * 1024.0)
    } else if let Some(n) = size.strip_suffix("MiB") {
        (n, 1024.0 * 1024.0)
    } else if let Some(n) = size.strip_suffix("KiB") {
        (n, 1024.0)
    } else if let Some(n) = size.strip_suffix('B') {
        (n, 1.0)
    } else {
        return None;
    };
    number.parse::<f64>().ok().map(|n| (n * multiplier) as u64)
}

/// "00:10", "1:23" or "1:02:03" to seconds
fn parse_eta(eta: &str) -> Option<u64> {
    eta.split(':')
        .try_fold((0u64, 0usize), |(acc, n), part| part.parse::<u64>().ok().map(|v| (acc * 60 + v, n + 1)))
        .filter(|(_, n)| (2..=3).contains(n))
        .map(|(secs, _)| secs)
}

fn size_field(info: &Value) -> Option<u64> {
    info.get("filesize")
        .and_then(Value::as_u64)
        .or_else(|| info.get("filesize_approx").and_then(Value::as_u64))
}

/// Size of the selected format(s) from a `-J` dump
pub fn estimate_from_info(info: &Value) -> Option<u64> {
    if let Some(formats) = info.get("requested_formats").and_then(Value::as_array) {
        let sizes: Option<Vec<u64>> = formats.iter().map(size_field).collect();
        if let Some(total) = sizes.map(|s| s.iter().sum::<u64>()) {
            return Some(total);
        }
    }
    size_field(info)
}

/// Flat (`--flat-playlist -J`) listing of a playlist or channel tab
#[derive(Debug, Default, Deserialize)]
struct FlatListing {
    #[serde(default)]
    title: Option<String>,
    /// Unavailable videos show up as `null`
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
}

impl FlatEntry {
    fn into_video(self) -> Option<VideoEntry> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let url = self
            .url
            .filter(|u| u.starts_with("http"))
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", id));
        Some(VideoEntry {
            title: self.title.unwrap_or_else(|| id.clone()),
            id,
            url,
        })
    }
}

fn flat_listing(info: &Value) -> FlatListing {
    FlatListing::deserialize(info).unwrap_or_else(|e| {
        log::warn!("Unexpected listing JSON from yt-dlp: {}", e);
        FlatListing::default()
    })
}

/// Entries of a flat listing, in the order yt-dlp printed them
pub fn parse_entries(info: &Value) -> Vec<VideoEntry> {
    flat_listing(info)
        .entries
        .into_iter()
        .flatten()
        .filter_map(FlatEntry::into_video)
        .collect()
}

pub fn parse_playlist(info: &Value) -> Playlist {
    let listing = flat_listing(info);
    Playlist {
        title: listing.title.unwrap_or_else(|| "Playlist".to_string()),
        entries: listing
            .entries
            .into_iter()
            .flatten()
            .filter_map(FlatEntry::into_video)
            .collect(),
    }
}

/// Channel identity from either a channel or a video dump
pub fn parse_channel_info(info: &Value) -> Option<ChannelInfo> {
    let str_field = |key: &str| info.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
    let id = str_field("channel_id").or_else(|| str_field("uploader_id"))?;
    let name = str_field("channel").or_else(|| str_field("uploader")).unwrap_or(id);
    let url = str_field("channel_url")
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://www.youtube.com/channel/{}", id));
    Some(ChannelInfo {
        id: id.to_string(),
        name: name.to_string(),
        url,
    })
}

/// The uploads tab of a channel URL
pub fn videos_tab_url(channel_url: &str) -> String {
    let trimmed = channel_url.trim_end_matches('/');
    if trimmed.ends_with("/videos") {
        trimmed.to_string()
    } else {
        format!("{}/videos", trimmed)
    }
}

/// True for URLs that point at a playlist rather than a single video
pub fn is_playlist_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let has_list = parsed.query_pairs().any(|(k, _)| k == "list");
    let has_video = parsed.query_pairs().any(|(k, _)| k == "v");
    parsed.path().starts_with("/playlist") || (has_list && !has_video)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_progress_line() {
        let update = parse_progress("[download]  50.0% of ~10.00MiB at 1.00MiB/s ETA 00:05").unwrap();
        assert_eq!(update.total, Some(10 * 1024 * 1024));
        assert_eq!(update.downloaded, 5 * 1024 * 1024);
        assert_eq!(update.speed, Some(1024.0 * 1024.0));
        assert_eq!(update.eta_secs, Some(5));
        assert_eq!(update.percent(), Some(50));
    }

    #[test]
    fn test_parse_progress_ignores_other_lines() {
        assert!(parse_progress("[download] Destination: /tmp/abc.mp4").is_none());
        assert!(parse_progress("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress("[download] abc.mp4 has already been downloaded").is_none());
    }

    #[test]
    fn test_parse_progress_unknown_size() {
        let update = parse_progress("[download]   5.00MiB at  1.00MiB/s (00:00:05)").unwrap();
        assert_eq!(update.downloaded, 5 * 1024 * 1024);
        assert_eq!(update.total, None);
        assert_eq!(update.speed, Some(1024.0 * 1024.0));
        assert_eq!(update.percent(), None);

        let update = parse_progress("[download]  12.50KiB at Unknown B/s (00:00:01)").unwrap();
        assert_eq!(update.downloaded, 12800);
        assert_eq!(update.speed, None);
    }

    #[test]
    fn test_byte_counter_carries_finished_streams() {
        let mut bytes = ByteCounter::default();
        bytes.observe(600);
        bytes.observe(900);
        assert!(is_new_destination("[download] Destination: /tmp/job-1/clip.f140.m4a"));
        bytes.next_stream();
        bytes.observe(100);
        assert_eq!(bytes.total(), 1000);

        // A restart without a Destination line is detected by a large drop
        bytes.observe(40);
        assert_eq!(bytes.total(), 1040);
    }

    #[test]
    fn test_parse_progress_spaced_approximate_total() {
        let update =
            parse_progress("[download]   1.2% of ~ 245.03MiB at  3.67MiB/s ETA 01:50 (frag 2/160)").unwrap();
        let total = parse_size("245.03MiB").unwrap();
        assert_eq!(update.total, Some(total));
        assert_eq!(update.downloaded, (total as f64 * 1.2 / 100.0) as u64);
        assert!(update.downloaded > 0);
        assert_eq!(update.eta_secs, Some(110));
        assert!(is_fragment_progress("[download]   1.2% of ~ 245.03MiB at  3.67MiB/s ETA 01:50 (frag 2/160)"));
        assert!(!is_fragment_progress("[download]  50.0% of 10.00MiB at 1.00MiB/s ETA 00:05"));
    }

    #[test]
    fn test_byte_counter_follows_shrinking_fragment_estimate() {
        let mut bytes = ByteCounter::default();
        let first = parse_progress("[download]  50.0% of ~10.00MiB at 1.00MiB/s ETA 00:05 (frag 10/20)").unwrap();
        let second = parse_progress("[download]  51.0% of ~9.50MiB at 1.00MiB/s ETA 00:05 (frag 11/20)").unwrap();
        assert!(second.downloaded < first.downloaded);

        bytes.observe(first.downloaded);
        bytes.observe(second.downloaded);
        // The revised estimate replaces the old one instead of being added to it
        assert_eq!(bytes.total(), second.downloaded);
    }

    #[test]
    fn test_parse_size_and_eta() {
        assert_eq!(parse_size("1.5KiB"), Some(1536));
        assert_eq!(parse_size("2GiB"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("Unknown"), None);
        assert_eq!(parse_eta("1:23"), Some(83));
        assert_eq!(parse_eta("1:00:01"), Some(3601));
        assert_eq!(parse_eta("NA"), None);
    }

    #[test]
    fn test_format_selector() {
        assert_eq!(
            format_selector(Quality::P480),
            "bestvideo[height<=480]+bestaudio/best[height<=480]"
        );
        assert_eq!(format_selector(Quality::Audio), "bestaudio/best");
    }

    #[test]
    fn test_download_args_use_proxy_and_job_dir() {
        let request = FetchRequest {
            url: "https://youtu.be/abc".to_string(),
            quality: Quality::Audio,
            output_dir: PathBuf::from("/data/job-7"),
            proxy: ProxyDescriptor::parse("socks5://127.0.0.1:1080").unwrap(),
        };
        let args = build_download_args(&request);
        assert_eq!(args[1], "/data/job-7/%(id)s.%(ext)s");
        assert!(args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "socks5://127.0.0.1:1080"));
        assert!(args.contains(&"-x".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");

        let direct = FetchRequest {
            proxy: ProxyDescriptor::Direct,
            quality: Quality::P720,
            ..request
        };
        let args = build_download_args(&direct);
        assert!(!args.contains(&"--proxy".to_string()));
        assert!(args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn test_estimate_sums_requested_formats() {
        let info = json!({
            "filesize_approx": 1,
            "requested_formats": [{"filesize": 1000}, {"filesize_approx": 500}]
        });
        assert_eq!(estimate_from_info(&info), Some(1500));
        assert_eq!(estimate_from_info(&json!({"filesize_approx": 42})), Some(42));
        assert_eq!(estimate_from_info(&json!({})), None);
    }

    #[test]
    fn test_parse_entries_and_channel() {
        let info = json!({
            "title": "Uploads",
            "channel_id": "UC123",
            "channel": "Some Channel",
            "entries": [
                {"id": "v2", "title": "Second", "url": "https://www.youtube.com/watch?v=v2"},
                null,
                {"id": "v1"},
                {"title": "no id"}
            ]
        });
        let entries = parse_entries(&info);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].title, "v1");
        assert_eq!(entries[1].url, "https://www.youtube.com/watch?v=v1");

        let channel = parse_channel_info(&info).unwrap();
        assert_eq!(channel.id, "UC123");
        assert_eq!(channel.name, "Some Channel");
        assert_eq!(channel.url, "https://www.youtube.com/channel/UC123");
        assert!(parse_channel_info(&json!({"title": "x"})).is_none());
    }

    #[test]
    fn test_videos_tab_url() {
        assert_eq!(videos_tab_url("https://www.youtube.com/@chan/"), "https://www.youtube.com/@chan/videos");
        assert_eq!(videos_tab_url("https://www.youtube.com/@chan/videos"), "https://www.youtube.com/@chan/videos");
    }

    #[test]
    fn test_is_playlist_url() {
        assert!(is_playlist_url("https://www.youtube.com/playlist?list=PL123"));
        assert!(!is_playlist_url("https://www.youtube.com/watch?v=abc&list=PL123"));
        assert!(!is_playlist_url("https://youtu.be/abc"));
        assert!(!is_playlist_url("not a url"));
    }

    #[test]
    fn test_find_media_file_skips_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.info.json"), vec![0u8; 5000]).unwrap();
        std::fs::write(dir.path().join("abc.mp4.part"), vec![0u8; 9000]).unwrap();
        std::fs::write(dir.path().join("abc.mp4"), vec![0u8; 100]).unwrap();
        assert_eq!(find_media_file(dir.path()), Some(dir.path().join("abc.mp4")));
    }
}
