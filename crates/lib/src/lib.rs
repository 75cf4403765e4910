//! cxxnode-lib: the build engine behind `cxxnode`.
//!
//! Turns a node project description into a linked executable:
//!
//! - [`config`]: project file loading, validation and CLI overrides
//! - [`toolchain`]: compiler detection and per-family flag translation
//! - [`sources`]: include/exclude globs to an ordered source set
//! - [`deps`]: dependency identity, acquisition, building and resolution
//! - [`cache`]: the shared dependency cache and its management
//! - [`build`]: incremental compile and link
//! - [`pipeline`]: all of the above in order for one node

pub mod build;
pub mod cache;
pub mod config;
pub mod consts;
pub mod deps;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod sources;
pub mod toolchain;
pub mod util;

use thiserror::Error;

pub use build::{BuildError, BuildReport, build};
pub use cache::{CacheError, CacheRoot, EvictScope, cache_evict, cache_info};
pub use config::{ConfigError, ResolvedConfig, resolve_config};
pub use deps::{DependencyError, resolve_dependency};
pub use pipeline::{BuildOutcome, PipelineOptions, build_node};
pub use sources::{SourceError, resolve_sources};
pub use toolchain::{ToolchainError, ToolchainHandle, detect_toolchain};

/// Any failure of an engine operation.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Toolchain(#[from] ToolchainError),

  #[error(transparent)]
  Sources(#[from] SourceError),

  #[error(transparent)]
  Dependency(#[from] DependencyError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error("unsupported host operating system '{0}'")]
  UnsupportedHost(String),
}
