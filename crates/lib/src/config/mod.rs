//! Project configuration: locating, parsing, validating and merging
//! `cxxnode.toml` with command-line overrides.

mod resolve;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;

pub use resolve::{find_config_in, resolve_config};
pub use types::{BuildMode, BuildSettings, CliOverrides, Profile, ResolvedConfig, RuntimeSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("no cxxnode.toml found (searched: {})", display_paths(.searched))]
  NotFound { searched: Vec<PathBuf> },

  #[error("multiple configuration files in {}: {}", .dir.display(), display_paths(.candidates))]
  Ambiguous { dir: PathBuf, candidates: Vec<PathBuf> },

  #[error("invalid configuration in {}: {field}: {message}", .file.display())]
  Invalid {
    file: PathBuf,
    field: String,
    message: String,
  },

  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

fn display_paths(paths: &[PathBuf]) -> String {
  paths
    .iter()
    .map(|p| p.display().to_string())
    .collect::<Vec<_>>()
    .join(", ")
}
