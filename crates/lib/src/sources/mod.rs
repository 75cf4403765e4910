//! Source set resolution: include/exclude globs over the project tree.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::toolchain::Language;

const EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx"];

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("invalid source pattern '{pattern}': {message}")]
  Pattern { pattern: String, message: String },
}

/// One compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SourceFile {
  pub path: PathBuf,
  /// Path relative to the project root, `/`-separated.
  pub relative: String,
  pub language: Language,
}

/// Ordered, deduplicated compilation units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSet {
  pub files: Vec<SourceFile>,
}

impl SourceSet {
  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }
}

/// Language of a source path, `None` if it is not a C or C++ file.
pub fn language_of(path: &Path) -> Option<Language> {
  match path.extension()?.to_str()? {
    "c" => Some(Language::C),
    "cc" | "cpp" | "cxx" | "c++" | "C" => Some(Language::Cxx),
    _ => None,
  }
}

/// Patterns used when the project configures none.
pub fn default_patterns(root: &Path) -> Vec<String> {
  let prefix = if root.join("src").is_dir() { "src/" } else { "" };
  EXTENSIONS.iter().map(|ext| format!("{prefix}**/*.{ext}")).collect()
}

/// Expand patterns under `root` into a source set.
///
/// Paths in `skip_dirs` (typically the output directory) and hidden
/// directories are never visited. A path matching any exclude pattern is
/// dropped even if an include pattern matched it.
pub fn resolve_sources(
  root: &Path,
  include: &[String],
  exclude: &[String],
  skip_dirs: &[PathBuf],
) -> Result<SourceSet, SourceError> {
  let include = if include.is_empty() {
    default_patterns(root)
  } else {
    include.to_vec()
  };
  let include_set = build_set(&include)?;
  let exclude_set = build_set(exclude)?;

  let walker = WalkDir::new(root).follow_links(true).into_iter().filter_entry(|e| {
    if e.depth() == 0 {
      return true;
    }
    if e.file_type().is_dir() {
      let hidden = e.file_name().to_string_lossy().starts_with('.');
      return !hidden && !skip_dirs.iter().any(|s| e.path() == s);
    }
    true
  });

  let mut found = BTreeSet::new();
  for entry in walker.filter_map(|e| e.ok()) {
    if !entry.file_type().is_file() {
      continue;
    }
    let Ok(rel) = entry.path().strip_prefix(root) else {
      continue;
    };
    let relative = rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    if !include_set.is_match(&relative) || exclude_set.is_match(&relative) {
      continue;
    }
    let Some(language) = language_of(entry.path()) else {
      continue;
    };
    found.insert(SourceFile {
      path: entry.path().to_path_buf(),
      relative,
      language,
    });
  }

  let files: Vec<SourceFile> = found.into_iter().collect();
  debug!(root = %root.display(), count = files.len(), "resolved sources");
  Ok(SourceSet { files })
}

fn build_set(patterns: &[String]) -> Result<GlobSet, SourceError> {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    let glob = Glob::new(pattern).map_err(|e| SourceError::Pattern {
      pattern: pattern.clone(),
      message: e.to_string(),
    })?;
    builder.add(glob);
  }
  builder.build().map_err(|e| SourceError::Pattern {
    pattern: patterns.join(", "),
    message: e.to_string(),
  })
}
