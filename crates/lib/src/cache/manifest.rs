//! Per-entry manifest: what a published dependency contributes.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::CacheError;
use crate::deps::types::{DependencyArtifacts, DependencySpec};

pub const MANIFEST_FILENAME: &str = "manifest.json";
const MANIFEST_VERSION: u32 = 1;

/// Paths are relative to the entry directory and `/`-separated, so an entry
/// stays valid when the cache root moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
  pub version: u32,
  pub label: String,
  pub spec: DependencySpec,
  pub created_at_unix: u64,
  pub include_dirs: Vec<String>,
  pub lib_dirs: Vec<String>,
  pub libraries: Vec<String>,
}

impl Manifest {
  pub fn new(label: &str, spec: &DependencySpec) -> Self {
    Self {
      version: MANIFEST_VERSION,
      label: label.to_string(),
      spec: spec.clone(),
      created_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      include_dirs: Vec::new(),
      lib_dirs: Vec::new(),
      libraries: Vec::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.spec.name
  }

  /// Load the manifest of the entry at `entry_dir`.
  ///
  /// Any failure, including a version mismatch, marks the entry corrupt.
  pub fn read(entry_dir: &Path) -> Result<Self, CacheError> {
    let path = entry_dir.join(MANIFEST_FILENAME);
    let corrupt = |message: String| CacheError::Corrupt {
      label: label_of(entry_dir),
      path: path.clone(),
      message,
    };
    let content = std::fs::read_to_string(&path).map_err(|e| corrupt(e.to_string()))?;
    let manifest: Manifest = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
    if manifest.version != MANIFEST_VERSION {
      return Err(corrupt(format!("unsupported manifest version {}", manifest.version)));
    }
    Ok(manifest)
  }

  pub fn write(&self, entry_dir: &Path) -> Result<(), CacheError> {
    let path = entry_dir.join(MANIFEST_FILENAME);
    let content = serde_json::to_string_pretty(self).map_err(|e| CacheError::Io {
      path: path.clone(),
      source: std::io::Error::other(e),
    })?;
    std::fs::write(&path, content).map_err(|source| CacheError::Io { path, source })
  }

  /// Record `path`, which must live under `entry_dir`, as an include dir.
  pub fn add_include_dir(&mut self, entry_dir: &Path, path: &Path) {
    if let Some(rel) = relative(entry_dir, path)
      && !self.include_dirs.contains(&rel)
    {
      self.include_dirs.push(rel);
    }
  }

  pub fn add_lib_dir(&mut self, entry_dir: &Path, path: &Path) {
    if let Some(rel) = relative(entry_dir, path)
      && !self.lib_dirs.contains(&rel)
    {
      self.lib_dirs.push(rel);
    }
  }

  /// Absolute artifacts for the entry published at `entry_dir`.
  pub fn artifacts(&self, entry_dir: &Path) -> DependencyArtifacts {
    let absolute = |rel: &String| -> PathBuf { entry_dir.join(rel) };
    DependencyArtifacts {
      name: self.spec.name.clone(),
      label: Some(self.label.clone()),
      include_dirs: self.include_dirs.iter().map(absolute).collect(),
      lib_dirs: self.lib_dirs.iter().map(absolute).collect(),
      libraries: self.libraries.clone(),
    }
  }
}

fn relative(base: &Path, path: &Path) -> Option<String> {
  let rel = path.strip_prefix(base).ok()?;
  Some(
    rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/"),
  )
}

fn label_of(entry_dir: &Path) -> String {
  entry_dir
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::deps::types::DependencyKind;
  use tempfile::TempDir;

  #[test]
  fn artifacts_are_rooted_at_the_entry() {
    let temp = TempDir::new().unwrap();
    let scratch = temp.path().join("scratch");
    let mut manifest = Manifest::new("fmt-abc", &DependencySpec::new("fmt", DependencyKind::Git));
    manifest.add_include_dir(&scratch, &scratch.join("install/include"));
    manifest.add_lib_dir(&scratch, &scratch.join("install/lib"));
    manifest.libraries.push("fmt".into());
    manifest.write(temp.path()).unwrap();

    let published = temp.path().join("entries/fmt-abc");
    let artifacts = Manifest::read(temp.path()).unwrap().artifacts(&published);

    assert_eq!(artifacts.include_dirs, vec![published.join("install/include")]);
    assert_eq!(artifacts.lib_dirs, vec![published.join("install/lib")]);
    assert_eq!(artifacts.libraries, vec!["fmt"]);
    assert_eq!(artifacts.label.as_deref(), Some("fmt-abc"));
  }

  #[test]
  fn garbage_manifest_is_corrupt() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join(MANIFEST_FILENAME), "{ not json").unwrap();
    assert!(matches!(Manifest::read(temp.path()), Err(CacheError::Corrupt { .. })));
  }

  #[test]
  fn missing_manifest_is_corrupt() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(Manifest::read(temp.path()), Err(CacheError::Corrupt { .. })));
  }

  #[test]
  fn paths_outside_entry_are_ignored() {
    let temp = TempDir::new().unwrap();
    let mut manifest = Manifest::new("x-1", &DependencySpec::new("x", DependencyKind::Git));
    manifest.add_include_dir(temp.path(), Path::new("/usr/include"));
    assert!(manifest.include_dirs.is_empty());
  }
}
