//! Advisory lock over the whole cache root.
//!
//! Resolution holds it shared for its duration; eviction holds it exclusive.
//! Acquisition never blocks: a conflicting holder is reported as contention.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CacheError;

pub const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

/// Written into the lock file by exclusive holders.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
}

/// Held until dropped.
#[derive(Debug)]
pub struct CacheLock {
  file: File,
  lock_path: PathBuf,
  mode: LockMode,
}

impl CacheLock {
  pub fn acquire(root: &Path, mode: LockMode, command: &str) -> Result<Self, CacheError> {
    let lock_path = root.join(LOCK_FILENAME);
    std::fs::create_dir_all(root).map_err(|source| CacheError::Io {
      path: root.to_path_buf(),
      source,
    })?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(|source| CacheError::Io {
        path: lock_path.clone(),
        source,
      })?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(contention_error(&lock_path));
      }
      return Err(CacheError::Io { path: lock_path, source: err });
    }

    if mode == LockMode::Exclusive {
      write_metadata(&file, command).map_err(|source| CacheError::Io {
        path: lock_path.clone(),
        source,
      })?;
    }

    debug!(path = %lock_path.display(), ?mode, "acquired cache lock");
    Ok(Self { file, lock_path, mode })
  }

  pub fn mode(&self) -> LockMode {
    self.mode
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  /// Reads metadata through the held handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }
}

fn write_metadata(file: &File, command: &str) -> io::Result<()> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
  };

  file.set_len(0)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(io::Error::other)?;
  writer.flush()
}

fn contention_error(lock_path: &Path) -> CacheError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return CacheError::Contention {
        command: metadata.command,
        pid: metadata.pid,
        started_at_unix: metadata.started_at_unix,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  CacheError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is valid zero-initialized and the handle is owned by `file`.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn shared_locks_coexist() {
    let temp = TempDir::new().unwrap();
    let a = CacheLock::acquire(temp.path(), LockMode::Shared, "build").unwrap();
    let b = CacheLock::acquire(temp.path(), LockMode::Shared, "build").unwrap();
    assert_eq!(a.mode(), LockMode::Shared);
    assert!(b.lock_path().exists());
  }

  #[test]
  #[cfg(unix)]
  fn exclusive_conflicts_with_shared() {
    let temp = TempDir::new().unwrap();
    let _shared = CacheLock::acquire(temp.path(), LockMode::Shared, "build").unwrap();
    let err = CacheLock::acquire(temp.path(), LockMode::Exclusive, "cache clean").unwrap_err();
    assert!(matches!(
      err,
      CacheError::Contention { .. } | CacheError::ContentionUnknown { .. }
    ));
  }

  #[test]
  #[cfg(unix)]
  fn contention_reports_holder() {
    let temp = TempDir::new().unwrap();
    let _held = CacheLock::acquire(temp.path(), LockMode::Exclusive, "cache clean").unwrap();
    match CacheLock::acquire(temp.path(), LockMode::Shared, "build").unwrap_err() {
      CacheError::Contention { command, pid, .. } => {
        assert_eq!(command, "cache clean");
        assert_eq!(pid, std::process::id());
      }
      other => panic!("expected Contention, got {other:?}"),
    }
  }

  #[test]
  fn metadata_written_for_exclusive() {
    let temp = TempDir::new().unwrap();
    let lock = CacheLock::acquire(temp.path(), LockMode::Exclusive, "cache clean").unwrap();
    let metadata = lock.read_metadata().unwrap();
    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.command, "cache clean");
  }

  #[test]
  fn released_on_drop() {
    let temp = TempDir::new().unwrap();
    {
      let _lock = CacheLock::acquire(temp.path(), LockMode::Exclusive, "first").unwrap();
    }
    CacheLock::acquire(temp.path(), LockMode::Exclusive, "second").unwrap();
  }
}
