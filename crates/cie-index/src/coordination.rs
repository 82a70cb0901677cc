//! Cross-process coordination: the index lock and the commit queue.
//!
//! `index.lock` is an advisory exclusive file lock holding `"<pid> <unix>\n"`
//! while the owner runs. Because the kernel drops advisory locks when the
//! owner dies, a crash cannot wedge the lock; the pid in the file is used to
//! tell a live holder from a stale leftover and for diagnostics.
//!
//! `index.queue` is an append-only file of commit hashes. Producers (git
//! hooks) append; the indexer drains it atomically by renaming the file away
//! and reading the snapshot, so concurrent appends land in a fresh queue.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use tracing::{debug, info, warn};

/// Poll interval while waiting for the lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================================
// Index Lock
// ============================================================================

/// Who is holding a contended lock, as read from the lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHolder {
    pub pid: Option<u32>,
    pub since_unix: Option<u64>,
}

/// Outcome of a non-blocking acquisition attempt.
#[derive(Debug)]
pub enum LockState {
    /// The lock is ours until the guard drops
    Acquired(IndexLock),
    /// Another live process holds it
    Held(LockHolder),
}

/// An exclusively held index lock. Released (and the file truncated) on drop.
#[derive(Debug)]
pub struct IndexLock {
    file: File,
    path: PathBuf,
}

impl IndexLock {
    /// Try to acquire the lock without blocking.
    ///
    /// Distinguishes "held by another live process" from I/O errors. A stale
    /// pid left by a crashed owner is reported and reclaimed.
    pub fn try_acquire(path: &Path) -> std::io::Result<LockState> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                let holder = read_holder(&mut file);
                debug!(?holder, "index lock held");
                return Ok(LockState::Held(holder));
            }
            Err(e) => return Err(e),
        }

        // We hold the flock. Leftover content means the previous owner died
        // without truncating.
        let holder = read_holder(&mut file);
        if let Some(pid) = holder.pid {
            if !process_alive(pid) {
                info!(stale_pid = pid, "reclaiming stale index lock");
            }
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{} {}", std::process::id(), now)?;
        file.flush()?;

        Ok(LockState::Acquired(IndexLock {
            file,
            path: path.to_path_buf(),
        }))
    }

    /// Poll for the lock until acquired or the deadline passes.
    pub fn wait_for_lock(path: &Path, deadline: Duration) -> std::io::Result<Option<IndexLock>> {
        let start = Instant::now();
        loop {
            match Self::try_acquire(path)? {
                LockState::Acquired(lock) => return Ok(Some(lock)),
                LockState::Held(_) if start.elapsed() >= deadline => return Ok(None),
                LockState::Held(_) => std::thread::sleep(LOCK_POLL_INTERVAL),
            }
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            warn!("failed to truncate lock file on release: {e}");
        }
        // flock released when the handle closes
    }
}

/// Parse `"<pid> <unix-seconds>"` out of the lock file.
fn read_holder(file: &mut File) -> LockHolder {
    let mut content = String::new();
    let _ = file.seek(SeekFrom::Start(0));
    let _ = file.read_to_string(&mut content);
    let mut parts = content.split_whitespace();
    LockHolder {
        pid: parts.next().and_then(|p| p.parse().ok()),
        since_unix: parts.next().and_then(|p| p.parse().ok()),
    }
}

/// Best-effort liveness probe for a pid.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

// ============================================================================
// Commit Queue
// ============================================================================

/// Append-only queue of commit hashes waiting to be indexed.
#[derive(Debug, Clone)]
pub struct CommitQueue {
    path: PathBuf,
}

impl CommitQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one commit hash.
    pub fn enqueue(&self, commit: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", commit.trim())?;
        file.flush()?;
        Ok(())
    }

    /// Atomically take everything queued so far, oldest first.
    ///
    /// The queue file is renamed away before reading, so producers appending
    /// concurrently write to a fresh file and are picked up by the next drain.
    pub fn drain(&self) -> std::io::Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let scratch = self.path.with_extension("queue.draining");
        match std::fs::rename(&self.path, &scratch) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        let content = std::fs::read_to_string(&scratch)?;
        std::fs::remove_file(&scratch)?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Path of the queue file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
