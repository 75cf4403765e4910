//! Dependency declarations and resolution results.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a dependency's sources are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
  /// Cloned from a git remote at a pinned revision.
  Git,
  /// Copied from a directory on this machine.
  Local,
  /// Provided by the host system, discovered through pkg-config.
  System,
}

impl DependencyKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Git => "git",
      Self::Local => "local",
      Self::System => "system",
    }
  }
}

impl fmt::Display for DependencyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A pinned git revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum Revision {
  Rev(String),
  Tag(String),
  Branch(String),
}

impl Revision {
  pub fn value(&self) -> &str {
    match self {
      Self::Rev(v) | Self::Tag(v) | Self::Branch(v) => v,
    }
  }
}

impl fmt::Display for Revision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Rev(v) => write!(f, "rev {v}"),
      Self::Tag(v) => write!(f, "tag {v}"),
      Self::Branch(v) => write!(f, "branch {v}"),
    }
  }
}

/// External build systems a dependency can be built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
  Cmake,
  Make,
  Ninja,
  /// Header-only: headers are copied into the install prefix.
  None,
}

impl BuildSystem {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Cmake => "cmake",
      Self::Make => "make",
      Self::Ninja => "ninja",
      Self::None => "none",
    }
  }
}

impl FromStr for BuildSystem {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "cmake" => Ok(Self::Cmake),
      "make" => Ok(Self::Make),
      "ninja" => Ok(Self::Ninja),
      "none" | "" | "header-only" => Ok(Self::None),
      other => Err(other.to_string()),
    }
  }
}

impl fmt::Display for BuildSystem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A fully expanded dependency declaration.
///
/// Feature shortcuts are expanded into this form during configuration
/// resolution, so everything downstream sees a single shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
  pub name: String,
  pub kind: DependencyKind,
  pub url: Option<String>,
  pub path: Option<PathBuf>,
  pub revision: Option<Revision>,
  pub subdir: Option<String>,
  /// Kept as written so an unknown value surfaces when the dependency is
  /// resolved rather than when the project file is read.
  pub build_system: Option<String>,
  pub options: BTreeMap<String, String>,
  pub include_dirs: Vec<String>,
  pub lib_dirs: Vec<String>,
  pub libraries: Vec<String>,
  pub pkg_config: Option<String>,
  /// Name of the feature shortcut this spec was expanded from, if any.
  pub feature: Option<String>,
}

impl DependencySpec {
  pub fn new(name: impl Into<String>, kind: DependencyKind) -> Self {
    Self {
      name: name.into(),
      kind,
      url: None,
      path: None,
      revision: None,
      subdir: None,
      build_system: None,
      options: BTreeMap::new(),
      include_dirs: Vec::new(),
      lib_dirs: Vec::new(),
      libraries: Vec::new(),
      pkg_config: None,
      feature: None,
    }
  }

  pub fn git(name: impl Into<String>, url: impl Into<String>, revision: Option<Revision>) -> Self {
    let mut spec = Self::new(name, DependencyKind::Git);
    spec.url = Some(url.into());
    spec.revision = revision;
    spec
  }

  pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    let mut spec = Self::new(name, DependencyKind::Local);
    spec.path = Some(path.into());
    spec
  }
}

/// Whether an existing cache entry may satisfy a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
  #[default]
  Reuse,
  ForceRebuild,
}

/// Usable outputs of a resolved dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyArtifacts {
  pub name: String,
  /// Cache entry label, `None` for system dependencies.
  pub label: Option<String>,
  pub include_dirs: Vec<PathBuf>,
  pub lib_dirs: Vec<PathBuf>,
  pub libraries: Vec<String>,
}

/// Result of resolving one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDependency {
  pub artifacts: DependencyArtifacts,
  /// True when an already published entry was reused.
  pub cache_hit: bool,
}
