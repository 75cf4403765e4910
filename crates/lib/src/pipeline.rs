//! The full build of one node: toolchain, sources, dependencies, then
//! compile and link.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::Error;
use crate::build::{BuildReport, build};
use crate::cache::CacheRoot;
use crate::config::ResolvedConfig;
use crate::deps::{
  CachePolicy, DependencyKind, ResolveOptions, ResolvedDependency, resolve_dependencies, resolve_system,
};
use crate::platform::os::Os;
use crate::platform::paths::search_path;
use crate::sources::resolve_sources;
use crate::toolchain::{ToolchainHandle, compiler_override, detect_toolchain};

/// Host facts and cache location for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
  pub os: Os,
  /// Directories searched for compilers.
  pub search_path: Vec<PathBuf>,
  /// Compiler named by the environment, if any.
  pub compiler_override: Option<String>,
  /// Cache root; `None` uses `CXXNODE_CACHE` or `~/.cxxnode`.
  pub cache_root: Option<PathBuf>,
  pub build_retries: u32,
}

impl PipelineOptions {
  /// Options describing the current host and environment.
  pub fn from_env() -> Result<Self, Error> {
    let os = Os::current().ok_or_else(|| Error::UnsupportedHost(std::env::consts::OS.to_string()))?;
    Ok(Self {
      os,
      search_path: search_path(),
      compiler_override: compiler_override(),
      cache_root: None,
      build_retries: 0,
    })
  }
}

/// Everything a node build produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
  pub toolchain: ToolchainHandle,
  pub source_count: usize,
  pub dependencies: Vec<ResolvedDependency>,
  pub report: BuildReport,
}

/// Build the node described by `config`.
///
/// The cache is opened only when a dependency needs it, so a project
/// without cached dependencies never creates a cache root.
pub async fn build_node(config: &ResolvedConfig, options: &PipelineOptions) -> Result<BuildOutcome, Error> {
  info!(name = %config.name, profile = %config.build.profile, dir = %config.project_dir.display(), "building node");

  let toolchain = detect_toolchain(
    config.build.toolchain,
    options.os,
    options.compiler_override.as_deref(),
    &options.search_path,
  )
  .await?;

  let sources = resolve_sources(
    &config.project_dir,
    &config.build.sources,
    &config.build.exclude_sources,
    std::slice::from_ref(&config.out_dir),
  )?;
  info!(count = sources.len(), "resolved sources");

  let resolve = ResolveOptions {
    policy: if config.force_rebuild_deps {
      CachePolicy::ForceRebuild
    } else {
      CachePolicy::Reuse
    },
    profile: config.build.profile,
    jobs: Some(config.jobs()),
    build_timeout: config.build.build_timeout,
    build_retries: options.build_retries,
  };
  let dependencies = if config.dependencies.iter().any(|d| d.kind != DependencyKind::System) {
    let cache = match &options.cache_root {
      Some(root) => CacheRoot::open(root.clone())?,
      None => CacheRoot::open_default()?,
    };
    resolve_dependencies(&cache, &config.dependencies, &resolve).await?
  } else {
    let mut resolved = Vec::with_capacity(config.dependencies.len());
    for spec in &config.dependencies {
      resolved.push(resolve_system(spec, &resolve).await?);
    }
    resolved
  };

  let artifacts: Vec<_> = dependencies.iter().map(|d| d.artifacts.clone()).collect();
  let report = build(config, &toolchain, &sources, &artifacts, options.os).await?;

  Ok(BuildOutcome {
    toolchain,
    source_count: sources.len(),
    dependencies,
    report,
  })
}
