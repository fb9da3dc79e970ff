//! Disk usage accounting for the download root
//!
//! The guard keeps three figures: bytes found under the download root outside
//! job directories, bytes committed by jobs, and bytes promised to in-flight
//! jobs. Their sum is checked against the configured ceiling. Only the first
//! one is measured; [`DiskGuard::reconcile`] refreshes it from the directory
//! contents and leaves live `job-*` directories to the job accounting.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::core::utils::format_bytes;

/// Prefix of the per-job working directories created under the root
pub const JOB_DIR_PREFIX: &str = "job-";

/// Outcome of a disk check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Allowed,
    Denied { used: u64, requested: u64, limit: u64 },
}

impl Reservation {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Reservation::Allowed)
    }
}

/// Snapshot of the guard's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    /// Measured bytes outside job directories
    pub on_disk: u64,
    pub committed: u64,
    pub reserved: u64,
    pub limit: u64,
}

impl DiskUsage {
    pub fn used(&self) -> u64 {
        self.on_disk.saturating_add(self.committed).saturating_add(self.reserved)
    }
}

#[derive(Debug, Default)]
struct DiskState {
    /// Bytes under the root outside job directories, as last measured
    on_disk: u64,
    /// Finished payloads still held by jobs
    committed: u64,
    /// Bytes promised to jobs that have not committed yet
    reserved: u64,
}

impl DiskState {
    fn used(&self) -> u64 {
        self.on_disk.saturating_add(self.committed).saturating_add(self.reserved)
    }
}

/// Tracks bytes used under a download root against a ceiling.
///
/// A `limit_bytes` of 0 means unlimited; every check is then `Allowed`.
#[derive(Debug)]
pub struct DiskGuard {
    root: PathBuf,
    limit_bytes: u64,
    state: Mutex<DiskState>,
}

impl DiskGuard {
    pub fn new(root: impl Into<PathBuf>, limit_bytes: u64) -> Self {
        Self {
            root: root.into(),
            limit_bytes,
            state: Mutex::new(DiskState::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit_bytes == 0
    }

    /// Current estimate of used bytes (measured + committed + reserved)
    pub fn used_bytes(&self) -> u64 {
        self.lock().used()
    }

    pub fn usage(&self) -> DiskUsage {
        let state = self.lock();
        DiskUsage {
            on_disk: state.on_disk,
            committed: state.committed,
            reserved: state.reserved,
            limit: self.limit_bytes,
        }
    }

    /// Checks whether `additional` more bytes would fit, without recording anything.
    pub fn check(&self, additional: u64) -> Reservation {
        let state = self.lock();
        self.verdict(state.used(), additional)
    }

    /// Reserves `estimated_bytes` for a download that is about to start.
    ///
    /// On `Allowed` the bytes count against the ceiling until they are either
    /// committed or released with [`DiskGuard::release_reservation`].
    pub fn reserve(&self, estimated_bytes: u64) -> Reservation {
        let mut state = self.lock();
        let verdict = self.verdict(state.used(), estimated_bytes);
        if verdict.is_allowed() {
            state.reserved = state.reserved.saturating_add(estimated_bytes);
        }
        verdict
    }

    /// Turns a reservation into `actual_bytes` of committed usage.
    ///
    /// The actual size may differ from the estimate; if the projected total
    /// then exceeds the ceiling the commit is refused, the reservation is
    /// dropped and the caller must delete the payload.
    pub fn commit(&self, reserved: u64, actual_bytes: u64) -> Reservation {
        let mut state = self.lock();
        state.reserved = state.reserved.saturating_sub(reserved);
        let verdict = self.verdict(state.used(), actual_bytes);
        if verdict.is_allowed() {
            state.committed = state.committed.saturating_add(actual_bytes);
        }
        verdict
    }

    /// Accounts for `bytes` of committed files that were removed.
    pub fn release(&self, bytes: u64) {
        let mut state = self.lock();
        state.committed = state.committed.saturating_sub(bytes);
    }

    /// Drops a reservation that will never be committed.
    pub fn release_reservation(&self, bytes: u64) {
        let mut state = self.lock();
        state.reserved = state.reserved.saturating_sub(bytes);
    }

    /// Forgets every reservation and commit.
    ///
    /// Only for when no job is running, e.g. after the worker lost a job to a
    /// panic before it could release its share.
    pub fn clear_job_usage(&self) {
        let mut state = self.lock();
        state.committed = 0;
        state.reserved = 0;
    }

    /// Recomputes the on-disk figure from the directory contents.
    ///
    /// `job-*` directories are skipped: their bytes are already covered by
    /// the owning job's reservation or commit.
    ///
    /// # Returns
    /// The number of bytes found outside job directories (0 if the root does
    /// not exist yet)
    pub fn reconcile(&self) -> io::Result<u64> {
        let actual = size_outside_jobs(&self.root)?;
        let mut state = self.lock();
        if state.on_disk != actual {
            log::debug!(
                "💾 Disk usage reconciled: {} -> {}",
                format_bytes(state.on_disk),
                format_bytes(actual)
            );
        }
        state.on_disk = actual;
        Ok(actual)
    }

    /// Removes job directories left behind by a previous run.
    ///
    /// Jobs are never persisted, so anything under a `job-*` directory at
    /// startup is an orphan. Must be called before the worker starts.
    pub fn purge_stale_jobs(&self) -> io::Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if is_job_dir(&entry) {
                std::fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn verdict(&self, used: u64, requested: u64) -> Reservation {
        if self.limit_bytes == 0 || used.saturating_add(requested) <= self.limit_bytes {
            Reservation::Allowed
        } else {
            Reservation::Denied {
                used,
                requested,
                limit: self.limit_bytes,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, DiskState> {
        // Counters stay meaningful even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_job_dir(entry: &std::fs::DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with(JOB_DIR_PREFIX) && entry.file_type().is_ok_and(|t| t.is_dir())
}

/// Size of the root without its job directories
fn size_outside_jobs(root: &Path) -> io::Result<u64> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut total = 0u64;
    for entry in entries {
        let entry = entry?;
        if is_job_dir(&entry) {
            continue;
        }
        match dir_size(&entry.path()) {
            Ok(size) => total = total.saturating_add(size),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Total size of all regular files below `path`. Missing paths count as empty.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    if metadata.is_file() {
        return Ok(metadata.len());
    }
    if !metadata.is_dir() {
        return Ok(0);
    }

    let mut total = 0u64;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        // Files can vanish while a job cleans up; skip them
        match dir_size(&entry.path()) {
            Ok(size) => total = total.saturating_add(size),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Start background reconciliation of the disk guard
///
/// Runs an initial reconciliation immediately, then every `interval`.
/// Returns JoinHandle so the caller can abort it on shutdown.
pub fn start_reconcile_task(guard: Arc<DiskGuard>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        log::info!(
            "💾 Disk reconciliation started (interval: {} seconds)",
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            let guard = Arc::clone(&guard);
            let result = tokio::task::spawn_blocking(move || {
                let size = guard.reconcile()?;
                Ok::<_, io::Error>((size, guard.usage()))
            })
            .await;

            match result {
                Ok(Ok((_, usage))) if usage.limit > 0 && usage.used() > usage.limit => {
                    log::warn!(
                        "⚠️  Download root above ceiling: {} used of {}",
                        format_bytes(usage.used()),
                        format_bytes(usage.limit)
                    );
                }
                Ok(Ok((size, _))) => log::debug!("💾 Download root holds {}", format_bytes(size)),
                Ok(Err(e)) => log::error!("Failed to reconcile disk usage: {}", e),
                Err(e) => log::error!("Disk reconciliation task panicked: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unlimited_always_allows() {
        let guard = DiskGuard::new("/nonexistent", 0);
        assert_eq!(guard.reserve(u64::MAX / 2), Reservation::Allowed);
        assert_eq!(guard.reserve(u64::MAX / 2), Reservation::Allowed);
        assert_eq!(guard.check(u64::MAX), Reservation::Allowed);
    }

    #[test]
    fn test_reserve_boundary() {
        let guard = DiskGuard::new("/nonexistent", 100);
        assert_eq!(guard.reserve(60), Reservation::Allowed);
        // 60 + 40 == limit is still allowed
        assert_eq!(guard.check(40), Reservation::Allowed);
        assert_eq!(
            guard.reserve(41),
            Reservation::Denied {
                used: 60,
                requested: 41,
                limit: 100
            }
        );
        // A denial records nothing
        assert_eq!(guard.used_bytes(), 60);
    }

    #[test]
    fn test_reserve_matches_definition_for_all_inputs() {
        let limit = 50;
        for used in [0u64, 10, 49, 50] {
            for x in 0u64..=60 {
                let guard = DiskGuard::new("/nonexistent", limit);
                guard.commit(0, used);
                let expected_allowed = used + x <= limit;
                assert_eq!(guard.reserve(x).is_allowed(), expected_allowed, "used={used} x={x}");
            }
        }
    }

    #[test]
    fn test_commit_moves_reservation_to_disk() {
        let guard = DiskGuard::new("/nonexistent", 1000);
        guard.reserve(300);
        assert_eq!(guard.commit(300, 250), Reservation::Allowed);
        let usage = guard.usage();
        assert_eq!(usage.reserved, 0);
        assert_eq!(usage.committed, 250);

        guard.release(250);
        assert_eq!(guard.used_bytes(), 0);
    }

    #[test]
    fn test_commit_refused_when_actual_exceeds_estimate() {
        let guard = DiskGuard::new("/nonexistent", 1000);
        guard.commit(0, 800);
        guard.reserve(100);
        let verdict = guard.commit(100, 400);
        assert!(!verdict.is_allowed());
        // Reservation dropped, nothing added
        assert_eq!(guard.used_bytes(), 800);
    }

    #[test]
    fn test_release_reservation_and_saturation() {
        let guard = DiskGuard::new("/nonexistent", 0);
        guard.reserve(10);
        guard.release_reservation(25);
        guard.release(5);
        assert_eq!(
            guard.usage(),
            DiskUsage {
                on_disk: 0,
                committed: 0,
                reserved: 0,
                limit: 0
            }
        );
    }

    #[test]
    fn test_reconcile_reads_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.bin"), vec![0u8; 1000]).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("b.bin"), vec![0u8; 24]).unwrap();

        let guard = DiskGuard::new(dir.path(), 0);
        assert_eq!(guard.reconcile().unwrap(), 1024);
        assert_eq!(guard.used_bytes(), 1024);

        fs::remove_file(dir.path().join("a.bin")).unwrap();
        assert_eq!(guard.reconcile().unwrap(), 24);
        assert_eq!(guard.used_bytes(), 24);
    }

    #[test]
    fn test_reconcile_during_download_counts_job_bytes_once() {
        let dir = TempDir::new().unwrap();
        let guard = DiskGuard::new(dir.path(), 1500);
        assert!(guard.reserve(1000).is_allowed());

        fs::create_dir(dir.path().join("job-1")).unwrap();
        fs::write(dir.path().join("job-1").join("video.mp4"), vec![0u8; 1000]).unwrap();
        assert_eq!(guard.reconcile().unwrap(), 0);

        assert_eq!(guard.commit(1000, 1000), Reservation::Allowed);
        assert_eq!(guard.reconcile().unwrap(), 0);
        assert_eq!(guard.used_bytes(), 1000);

        guard.release(1000);
        assert_eq!(guard.used_bytes(), 0);
    }

    #[test]
    fn test_clear_job_usage_keeps_measured_bytes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.bin"), vec![0u8; 10]).unwrap();
        let guard = DiskGuard::new(dir.path(), 0);
        guard.reconcile().unwrap();
        guard.reserve(300);
        guard.commit(0, 200);

        guard.clear_job_usage();
        assert_eq!(guard.used_bytes(), 10);
    }

    #[test]
    fn test_reconcile_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let guard = DiskGuard::new(dir.path().join("not-yet"), 10);
        assert_eq!(guard.reconcile().unwrap(), 0);
    }

    #[test]
    fn test_purge_stale_jobs_keeps_other_entries() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("job-1")).unwrap();
        fs::write(dir.path().join("job-1").join("partial.mp4.part"), b"xx").unwrap();
        fs::create_dir(dir.path().join("job-7")).unwrap();
        fs::write(dir.path().join("keep.txt"), b"keep").unwrap();

        let guard = DiskGuard::new(dir.path(), 0);
        assert_eq!(guard.purge_stale_jobs().unwrap(), 2);
        assert!(!dir.path().join("job-1").exists());
        assert!(dir.path().join("keep.txt").exists());
    }
}
