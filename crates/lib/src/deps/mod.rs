//! External dependencies: identity, acquisition, building, and caching.
//!
//! Every declaration, including feature shortcuts, arrives here as a
//! [`DependencySpec`] and goes through the same path: identity, cache lookup,
//! and on a miss acquire, build, and publish.

pub mod build_system;
pub mod features;
mod fetch;
pub mod identity;
mod resolve;
mod system;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;

pub use identity::{DependencyIdentity, identity};
pub use resolve::{ResolveOptions, resolve_dependencies, resolve_dependency, resolve_system};
pub use types::{
  BuildSystem, CachePolicy, DependencyArtifacts, DependencyKind, DependencySpec, ResolvedDependency, Revision,
};

use crate::cache::CacheError;

#[derive(Debug, Error)]
pub enum DependencyError {
  #[error("failed to acquire dependency '{name}': {message}")]
  AcquisitionFailed { name: String, message: String },

  #[error("building dependency '{name}' failed at `{step}`:\n{output}")]
  BuildFailed { name: String, step: String, output: String },

  #[error("dependency '{name}' uses unsupported build system '{build_system}' (expected cmake, make, ninja or none)")]
  UnsupportedBuildSystem { name: String, build_system: String },

  #[error("failed to compute identity of dependency '{name}': {source}")]
  Identity {
    name: String,
    #[source]
    source: crate::util::hash::HashError,
  },

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error("I/O error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl DependencyError {
  /// Whether re-running the same step may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::AcquisitionFailed { .. })
  }
}
