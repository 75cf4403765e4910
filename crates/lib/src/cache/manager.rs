//! Out-of-band cache inspection and eviction.

use serde::Serialize;
use tracing::{info, warn};

use super::{CacheError, CacheRoot, LockMode, Manifest};
use crate::util::fs::dir_size;

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
  pub label: String,
  pub name: String,
  pub size_bytes: u64,
  /// Unix seconds; falls back to the publish time for never-used entries.
  pub last_used: Option<u64>,
  pub corrupt: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
  pub root: std::path::PathBuf,
  pub entries: Vec<CacheEntryInfo>,
  pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictScope {
  All,
  /// Entries whose declared dependency name matches.
  Named(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvictionReport {
  pub removed: Vec<String>,
  pub bytes_freed: u64,
}

/// Enumerate published entries. Scratch directories are never listed.
pub fn cache_info(cache: &CacheRoot) -> Result<CacheReport, CacheError> {
  let mut entries = Vec::new();
  for label in cache.labels()? {
    let dir = cache.entry_dir(&label);
    let size_bytes = dir_size(&dir);
    let info = match Manifest::read(&dir) {
      Ok(manifest) => CacheEntryInfo {
        name: manifest.name().to_string(),
        last_used: cache.last_used(&label).or(Some(manifest.created_at_unix)),
        label,
        size_bytes,
        corrupt: false,
      },
      Err(_) => CacheEntryInfo {
        name: name_from_label(&label).to_string(),
        last_used: cache.last_used(&label),
        label,
        size_bytes,
        corrupt: true,
      },
    };
    entries.push(info);
  }

  let total_bytes = entries.iter().map(|e| e.size_bytes).sum();
  Ok(CacheReport {
    root: cache.path().to_path_buf(),
    entries,
    total_bytes,
  })
}

/// Remove entries in `scope` under the exclusive lock.
///
/// `All` additionally clears usage records and abandoned scratch builds.
pub fn cache_evict(cache: &CacheRoot, scope: &EvictScope) -> Result<EvictionReport, CacheError> {
  let _lock = cache.lock(LockMode::Exclusive, "cache clean")?;
  let mut report = EvictionReport::default();

  for label in cache.labels()? {
    let matches = match scope {
      EvictScope::All => true,
      EvictScope::Named(name) => match Manifest::read(&cache.entry_dir(&label)) {
        Ok(manifest) => manifest.name() == name,
        Err(_) => name_from_label(&label) == name,
      },
    };
    if !matches {
      continue;
    }
    match cache.unpublish(&label) {
      Ok(Some(bytes)) => {
        report.bytes_freed += bytes;
        report.removed.push(label);
      }
      Ok(None) => {}
      Err(e) => warn!(label = %label, error = %e, "failed to evict cache entry"),
    }
  }

  if *scope == EvictScope::All {
    report.bytes_freed += cache.clear_transient()?;
  }

  info!(removed = report.removed.len(), bytes_freed = report.bytes_freed, "cache eviction complete");
  Ok(report)
}

/// `eigen3-0123abcd` -> `eigen3`
fn name_from_label(label: &str) -> &str {
  label.rsplit_once('-').map(|(name, _)| name).unwrap_or(label)
}
