//! The shared dependency cache.
//!
//! ```text
//! <root>/
//!   .lock            advisory lock
//!   entries/<label>/ published entries (manifest.json, source/, install/)
//!   scratch/         in-progress builds and entries being removed
//!   usage/<label>    last-used timestamps
//! ```
//!
//! Entries become visible only by renaming a finished scratch directory into
//! `entries/`, and leave only by renaming back into `scratch/`, so readers
//! never observe a partial entry.

pub mod lock;
pub mod manager;
pub mod manifest;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use lock::{CacheLock, LockMode};
pub use manager::{CacheEntryInfo, CacheReport, EvictScope, EvictionReport, cache_evict, cache_info};
pub use manifest::Manifest;

use crate::platform::paths::cache_root;
use crate::util::fs::remove_dir_if_exists;

const ENTRIES_DIR: &str = "entries";
const SCRATCH_DIR: &str = "scratch";
const USAGE_DIR: &str = "usage";

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache entry '{label}' is corrupt ({}): {message}", .path.display())]
  Corrupt {
    label: String,
    path: PathBuf,
    message: String,
  },

  #[error(
    "cache is locked by another process: {command} (PID {pid}, started at unix time {started_at_unix})\n\
     If no cxxnode process is running, remove the lock file:\n  {}",
    .lock_path.display()
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "cache is locked by another process\n\
     If no cxxnode process is running, remove the lock file:\n  {}",
    .lock_path.display()
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("cannot determine the cache location: set CXXNODE_CACHE or HOME")]
  NoLocation,

  #[error("cache I/O error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
  move |source| CacheError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Whether a publish made this process's scratch build the visible entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
  Published,
  /// Another process published the same identity first.
  AlreadyPresent,
}

/// Handle on an opened cache root. Opened once per invocation and passed to
/// everything that touches the cache.
#[derive(Debug, Clone)]
pub struct CacheRoot {
  root: PathBuf,
}

impl CacheRoot {
  /// Open (creating if needed) the cache at `root`.
  pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
    let root = root.into();
    for dir in [ENTRIES_DIR, SCRATCH_DIR, USAGE_DIR] {
      let path = root.join(dir);
      fs::create_dir_all(&path).map_err(io_err(&path))?;
    }
    Ok(Self { root })
  }

  /// Open the cache at `CXXNODE_CACHE` or `~/.cxxnode`.
  pub fn open_default() -> Result<Self, CacheError> {
    Self::open(cache_root().ok_or(CacheError::NoLocation)?)
  }

  pub fn path(&self) -> &Path {
    &self.root
  }

  pub fn entries_dir(&self) -> PathBuf {
    self.root.join(ENTRIES_DIR)
  }

  pub fn scratch_dir(&self) -> PathBuf {
    self.root.join(SCRATCH_DIR)
  }

  pub fn usage_dir(&self) -> PathBuf {
    self.root.join(USAGE_DIR)
  }

  pub fn entry_dir(&self, label: &str) -> PathBuf {
    self.entries_dir().join(label)
  }

  pub fn lock(&self, mode: LockMode, command: &str) -> Result<CacheLock, CacheError> {
    CacheLock::acquire(&self.root, mode, command)
  }

  /// The published manifest for `label`.
  ///
  /// `Ok(None)` when no entry exists; [`CacheError::Corrupt`] when the entry
  /// directory exists but its manifest cannot be read.
  pub fn lookup(&self, label: &str) -> Result<Option<Manifest>, CacheError> {
    let dir = self.entry_dir(label);
    if !dir.is_dir() {
      return Ok(None);
    }
    Manifest::read(&dir).map(Some)
  }

  /// A fresh scratch directory for building `label`. Dropping it without
  /// publishing removes it.
  pub fn create_scratch(&self, label: &str) -> Result<TempDir, CacheError> {
    let scratch = self.scratch_dir();
    tempfile::Builder::new()
      .prefix(&format!("{label}."))
      .tempdir_in(&scratch)
      .map_err(io_err(&scratch))
  }

  /// Atomically make `scratch` the entry for `label`.
  ///
  /// If another process already published the label, `scratch` is discarded
  /// and the existing entry stands.
  pub fn publish(&self, scratch: TempDir, label: &str) -> Result<PublishOutcome, CacheError> {
    let dest = self.entry_dir(label);
    match fs::rename(scratch.path(), &dest) {
      Ok(()) => {
        info!(label, path = %dest.display(), "published cache entry");
        Ok(PublishOutcome::Published)
      }
      Err(_) if dest.is_dir() => {
        debug!(label, "entry was published concurrently, discarding scratch build");
        drop(scratch);
        Ok(PublishOutcome::AlreadyPresent)
      }
      Err(e) => Err(io_err(&dest)(e)),
    }
  }

  /// Publish `scratch` over any existing entry for `label`.
  ///
  /// The old entry is first moved out of `entries/`, so there is a moment
  /// with no entry but never one with a partial entry.
  pub fn replace(&self, scratch: TempDir, label: &str) -> Result<PublishOutcome, CacheError> {
    self.unpublish(label)?;
    self.publish(scratch, label)
  }

  /// Move the entry for `label` out of `entries/` and delete it.
  ///
  /// Returns the bytes freed, or `None` if there was no entry.
  pub fn unpublish(&self, label: &str) -> Result<Option<u64>, CacheError> {
    let dir = self.entry_dir(label);
    if !dir.exists() {
      return Ok(None);
    }
    let size = crate::util::fs::dir_size(&dir);
    let graveyard = tempfile::Builder::new()
      .prefix(&format!("{label}.removed."))
      .tempdir_in(self.scratch_dir())
      .map_err(io_err(&dir))?;
    let target = graveyard.path().join(label);
    fs::rename(&dir, &target).map_err(io_err(&dir))?;
    if let Err(e) = graveyard.close() {
      warn!(label, error = %e, "failed to delete removed cache entry");
    }
    let usage = self.usage_dir().join(label);
    if let Err(e) = fs::remove_file(&usage)
      && e.kind() != io::ErrorKind::NotFound
    {
      warn!(path = %usage.display(), error = %e, "failed to remove usage record");
    }
    Ok(Some(size))
  }

  /// Record that `label` was just used.
  pub fn touch(&self, label: &str) {
    let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs();
    let path = self.usage_dir().join(label);
    if let Err(e) = fs::write(&path, now.to_string()) {
      warn!(path = %path.display(), error = %e, "failed to record cache usage");
    }
  }

  /// Last-used time of `label` in unix seconds.
  pub fn last_used(&self, label: &str) -> Option<u64> {
    fs::read_to_string(self.usage_dir().join(label))
      .ok()
      .and_then(|s| s.trim().parse().ok())
  }

  /// Labels of every directory in `entries/`, sorted.
  pub fn labels(&self) -> Result<Vec<String>, CacheError> {
    let dir = self.entries_dir();
    let mut labels: Vec<String> = fs::read_dir(&dir)
      .map_err(io_err(&dir))?
      .flatten()
      .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
      .filter_map(|e| e.file_name().to_str().map(str::to_string))
      .collect();
    labels.sort();
    Ok(labels)
  }

  /// Remove everything in `scratch/` and `usage/`. Only safe under the
  /// exclusive lock.
  pub(crate) fn clear_transient(&self) -> Result<u64, CacheError> {
    let mut freed = 0;
    for dir in [self.scratch_dir(), self.usage_dir()] {
      freed += crate::util::fs::dir_size(&dir);
      remove_dir_if_exists(&dir).map_err(io_err(&dir))?;
      fs::create_dir_all(&dir).map_err(io_err(&dir))?;
    }
    Ok(freed)
  }
}
