//! Durable comment log: one serialized entry per line, append-only except
//! for deletes and updates, which rewrite the file atomically.
//!
//! Every operation runs under a single exclusive lock: an in-process mutex
//! plus an advisory `flock` on a companion lock file, so separate server
//! processes sharing a data directory are serialized too. Acquisition gives
//! up after the configured timeout with [`GridnotesError::Busy`].

use std::collections::HashSet;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::entry::EntryId;
use crate::error::GridnotesError;

/// How often a contended file lock is retried.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct CommentLog {
    log_path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    write_lock: Mutex<()>,
}

/// Holds both halves of the store lock; the file lock is released when the
/// descriptor closes.
struct StoreLock<'a> {
    _guard: MutexGuard<'a, ()>,
    file: File,
}

impl Drop for StoreLock<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

impl CommentLog {
    /// Open the log described by `config`, creating the data directory, the
    /// log and the lock file if they do not exist yet.
    pub async fn open(config: &Config) -> Result<Self, GridnotesError> {
        Self::open_at(
            config.log_path(),
            config.lock_path(),
            Duration::from_millis(config.lock_timeout_ms),
        )
        .await
    }

    pub async fn open_at(
        log_path: PathBuf,
        lock_path: PathBuf,
        lock_timeout: Duration,
    ) -> Result<Self, GridnotesError> {
        for path in [&log_path, &lock_path] {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir).await?;
            }
            ensure_exists(path).await?;
        }
        tracing::info!(log = %log_path.display(), "comment log opened");
        Ok(Self {
            log_path,
            lock_path,
            lock_timeout,
            write_lock: Mutex::new(()),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    async fn lock(&self) -> Result<StoreLock<'_>, GridnotesError> {
        let start = Instant::now();
        let busy = |start: Instant| GridnotesError::Busy {
            waited_ms: start.elapsed().as_millis() as u64,
        };

        let guard = tokio::time::timeout(self.lock_timeout, self.write_lock.lock())
            .await
            .map_err(|_| busy(start))?;

        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .await?
            .into_std()
            .await;

        loop {
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc == 0 {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::WouldBlock {
                return Err(err.into());
            }
            if start.elapsed() >= self.lock_timeout {
                tracing::warn!("comment log lock still held after {:?}", self.lock_timeout);
                return Err(busy(start));
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }

        Ok(StoreLock {
            _guard: guard,
            file,
        })
    }

    /// Raw lines of every entry with a date whose first `precision`
    /// characters equal one of `dates`, where `precision` is the longest
    /// requested date. A bare calendar date thus matches stored dates that
    /// carry a time-of-day suffix.
    pub async fn get(&self, dates: &[String]) -> Result<Vec<String>, GridnotesError> {
        let _lock = self.lock().await?;
        let content = read_to_string_lossy(&self.log_path).await?;

        let precision = dates.iter().map(String::len).max().unwrap_or(0);
        let wanted: HashSet<&str> = dates.iter().map(String::as_str).collect();

        let matches: Vec<String> = content
            .lines()
            .filter(|line| entry_matches(line, precision, &wanted))
            .map(str::to_string)
            .collect();
        tracing::debug!(requested = dates.len(), found = matches.len(), "get");
        Ok(matches)
    }

    /// Append a serialized entry. The id inside it is trusted as given.
    pub async fn set(&self, entry: &str) -> Result<(), GridnotesError> {
        validate_line(entry)?;
        let _lock = self.lock().await?;
        self.append_locked(entry).await?;
        tracing::info!(id = entry_id_field(entry), "entry appended");
        Ok(())
    }

    /// Remove the single line belonging to `id`. Refuses when no line or
    /// more than one line would go.
    pub async fn delete(&self, id: &str) -> Result<(), GridnotesError> {
        let id = parse_request_id(id)?;
        let _lock = self.lock().await?;
        self.delete_locked(id).await
    }

    /// Replace the line of `id` with `new_entry`, which goes to the end of
    /// the log. The log is rewritten once, so a failure leaves either the
    /// old line or the new one. Nothing is written if `id` is already gone.
    pub async fn update(&self, id: &str, new_entry: &str) -> Result<(), GridnotesError> {
        let id = parse_request_id(id)?;
        validate_line(new_entry)?;
        if entry_id_field(new_entry) == id.to_string() {
            return Err(GridnotesError::SameIdUpdate { id: id.to_string() });
        }

        let _lock = self.lock().await?;
        let content = read_to_string_lossy(&self.log_path).await?;
        let (mut kept, removed) = without_entry(&content, id);
        match removed {
            1 => {}
            0 => {
                tracing::warn!(%id, "update refused, entry no longer exists");
                return Err(GridnotesError::EntryMissing { id: id.to_string() });
            }
            delta => {
                tracing::warn!(%id, delta, "update refused, ambiguous id");
                return Err(GridnotesError::UnexpectedDiff {
                    id: id.to_string(),
                    delta,
                });
            }
        }

        if !kept.is_empty() && !kept.ends_with('\n') {
            kept.push('\n');
        }
        kept.push_str(new_entry);
        kept.push('\n');
        atomic_write(&self.log_path, &kept).await?;
        tracing::info!(%id, new_id = entry_id_field(new_entry), "entry updated");
        Ok(())
    }

    async fn append_locked(&self, line: &str) -> Result<(), GridnotesError> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.log_path)
            .await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn delete_locked(&self, id: EntryId) -> Result<(), GridnotesError> {
        let content = read_to_string_lossy(&self.log_path).await?;
        let (kept, removed) = without_entry(&content, id);

        match removed {
            1 => {
                atomic_write(&self.log_path, &kept).await?;
                tracing::info!(%id, "entry deleted");
                Ok(())
            }
            0 => {
                tracing::warn!(%id, "delete refused, already deleted");
                Err(GridnotesError::AlreadyDeleted { id: id.to_string() })
            }
            delta => {
                tracing::warn!(%id, delta, "delete refused, unexpected diff");
                Err(GridnotesError::UnexpectedDiff {
                    id: id.to_string(),
                    delta,
                })
            }
        }
    }
}

/// `content` minus every line of `id`, and how many lines that dropped.
fn without_entry(content: &str, id: EntryId) -> (String, i64) {
    let prefix = id.line_prefix();
    let mut kept = String::with_capacity(content.len());
    let mut removed: i64 = 0;
    for line in content.split_inclusive('\n') {
        if line.starts_with(&prefix) {
            removed += 1;
        } else {
            kept.push_str(line);
        }
    }
    (kept, removed)
}

/// Ids arrive from clients, so a bad one is a bad request rather than a
/// damaged log.
fn parse_request_id(id: &str) -> Result<EntryId, GridnotesError> {
    id.parse()
        .map_err(|_| GridnotesError::Protocol(format!("bad entry id {id:?}")))
}

fn entry_matches(line: &str, precision: usize, wanted: &HashSet<&str>) -> bool {
    let Some((_, rest)) = line.split_once(';') else {
        return false;
    };
    let tests_blob = rest.split(';').next().unwrap_or_default();
    tests_blob.split('&').any(|segment| {
        let date = segment.split_once('=').map_or(segment, |(d, _)| d);
        let end = floor_char_boundary(date, precision);
        wanted.contains(&date[..end])
    })
}

fn entry_id_field(line: &str) -> &str {
    line.split(';').next().unwrap_or_default()
}

fn validate_line(line: &str) -> Result<(), GridnotesError> {
    if line.is_empty() {
        return Err(GridnotesError::Protocol("empty entry".to_string()));
    }
    if line.contains(['\n', '\r']) {
        return Err(GridnotesError::Protocol(
            "entry must be a single line".to_string(),
        ));
    }
    // Without a date no get can ever return the entry.
    if line.split(';').nth(1).is_none_or(str::is_empty) {
        return Err(GridnotesError::Protocol("entry has no dates".to_string()));
    }
    Ok(())
}

/// Largest index <= `max` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

async fn ensure_exists(path: &Path) -> Result<(), std::io::Error> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map(|_| ())
}

/// Write via temp file + rename so readers never see a partial log. The
/// replacement keeps the permissions of the file it replaces.
async fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    let result = async {
        tokio::fs::write(&tmp_path, content.as_bytes()).await?;
        if let Ok(meta) = tokio::fs::metadata(path).await {
            tokio::fs::set_permissions(&tmp_path, meta.permissions()).await?;
        }
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

async fn read_to_string_lossy(path: &Path) -> Result<String, std::io::Error> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}
