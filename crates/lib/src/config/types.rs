//! Project file schema and the resolved configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deps::types::DependencySpec;
use crate::toolchain::{ToolchainPreference, WarningLevel};

pub const DEFAULT_VERSION: &str = "0.1.0";
pub const DEFAULT_CXX_STD: &str = "c++17";
pub const DEFAULT_C_STD: &str = "c11";
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 120;

/// `cxxnode.toml` as written. Enumerations stay strings here so that
/// validation can name the offending field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectFile {
  pub node: NodeSection,
  pub build: BuildSection,
  pub runtime: RuntimeSection,
  pub dependencies: BTreeMap<String, DependencySection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeSection {
  pub name: Option<String>,
  pub version: Option<String>,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildSection {
  pub toolchain: Option<String>,
  pub system: Option<String>,
  pub profile: Option<String>,
  pub std: Option<String>,
  pub c_std: Option<String>,
  pub optimization: Option<String>,
  pub debug_info: Option<bool>,
  pub warnings: Option<String>,
  pub warnings_as_errors: bool,
  pub cflags: Vec<String>,
  pub cxxflags: Vec<String>,
  pub ldflags: Vec<String>,
  pub defines: Vec<String>,
  pub include_dirs: Vec<String>,
  pub lib_dirs: Vec<String>,
  pub libraries: Vec<String>,
  pub sources: Vec<String>,
  pub exclude_sources: Vec<String>,
  pub output: Option<String>,
  pub parallel_jobs: Option<i64>,
  pub build_timeout: Option<u64>,
  pub compile_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
  pub dir: Option<String>,
  pub libraries: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DependencySection {
  #[serde(rename = "type")]
  pub kind: Option<String>,
  pub url: Option<String>,
  pub rev: Option<String>,
  pub tag: Option<String>,
  pub branch: Option<String>,
  pub path: Option<String>,
  pub subdir: Option<String>,
  pub build_system: Option<String>,
  pub cmake_options: BTreeMap<String, toml::Value>,
  pub include_dirs: Vec<String>,
  pub lib_dirs: Vec<String>,
  pub libraries: Vec<String>,
  pub pkg_config: Option<String>,
  pub feature: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
  #[default]
  Debug,
  Release,
}

impl Profile {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Debug => "debug",
      Self::Release => "release",
    }
  }

  /// `CMAKE_BUILD_TYPE` / `--config` spelling.
  pub fn cmake_build_type(&self) -> &'static str {
    match self {
      Self::Debug => "Debug",
      Self::Release => "Release",
    }
  }
}

impl FromStr for Profile {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "debug" => Ok(Self::Debug),
      "release" => Ok(Self::Release),
      other => Err(format!("unknown profile '{other}', expected debug or release")),
    }
  }
}

impl fmt::Display for Profile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How the project itself is built. Only the built-in compile/link driver
/// exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  #[default]
  Native,
}

impl FromStr for BuildMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "native" => Ok(Self::Native),
      other => Err(format!("unknown build system '{other}', expected native")),
    }
  }
}

/// Values supplied on the command line. `None` leaves the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
  pub config: Option<PathBuf>,
  pub no_config: bool,
  pub profile: Option<Profile>,
  pub toolchain: Option<ToolchainPreference>,
  pub std: Option<String>,
  pub output: Option<String>,
  pub out_dir: Option<PathBuf>,
  pub parallel_jobs: Option<usize>,
  pub runtime_dir: Option<PathBuf>,
  pub force_rebuild_deps: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSettings {
  pub toolchain: ToolchainPreference,
  pub system: BuildMode,
  pub profile: Profile,
  pub std: String,
  pub c_std: String,
  pub optimization: Option<String>,
  pub debug_info: Option<bool>,
  pub warnings: WarningLevel,
  pub warnings_as_errors: bool,
  pub cflags: Vec<String>,
  pub cxxflags: Vec<String>,
  pub ldflags: Vec<String>,
  pub defines: Vec<String>,
  pub include_dirs: Vec<PathBuf>,
  pub lib_dirs: Vec<PathBuf>,
  pub libraries: Vec<String>,
  pub sources: Vec<String>,
  pub exclude_sources: Vec<String>,
  /// Executable name without platform suffix.
  pub output: String,
  pub parallel_jobs: Option<usize>,
  pub build_timeout: Duration,
  pub compile_timeout: Duration,
}

impl BuildSettings {
  /// Built-in defaults for an executable named `output`.
  pub fn with_output(output: impl Into<String>) -> Self {
    Self {
      toolchain: ToolchainPreference::Auto,
      system: BuildMode::Native,
      profile: Profile::Debug,
      std: DEFAULT_CXX_STD.to_string(),
      c_std: DEFAULT_C_STD.to_string(),
      optimization: None,
      debug_info: None,
      warnings: WarningLevel::Default,
      warnings_as_errors: false,
      cflags: Vec::new(),
      cxxflags: Vec::new(),
      ldflags: Vec::new(),
      defines: Vec::new(),
      include_dirs: Vec::new(),
      lib_dirs: Vec::new(),
      libraries: Vec::new(),
      sources: Vec::new(),
      exclude_sources: Vec::new(),
      output: output.into(),
      parallel_jobs: None,
      build_timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
      compile_timeout: Duration::from_secs(DEFAULT_COMPILE_TIMEOUT_SECS),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuntimeSettings {
  pub dir: Option<PathBuf>,
  pub libraries: Vec<String>,
}

/// The authoritative input to every downstream component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
  pub project_dir: PathBuf,
  /// File the configuration was read from; `None` in legacy mode.
  pub config_file: Option<PathBuf>,
  pub name: String,
  pub version: String,
  pub description: Option<String>,
  pub build: BuildSettings,
  pub runtime: RuntimeSettings,
  pub dependencies: Vec<DependencySpec>,
  pub out_dir: PathBuf,
  pub force_rebuild_deps: bool,
}

impl ResolvedConfig {
  /// `<out_dir>/<profile>`
  pub fn profile_dir(&self) -> PathBuf {
    self.out_dir.join(self.build.profile.as_str())
  }

  /// Worker count for parallel compilation.
  pub fn jobs(&self) -> usize {
    self
      .build
      .parallel_jobs
      .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
  }
}
