//! Cache-aware dependency resolution.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::build_system::{BuildRequest, build_and_install};
use super::types::{BuildSystem, CachePolicy, DependencyKind, DependencySpec, ResolvedDependency};
use super::{DependencyError, fetch, identity, system};
use crate::cache::{CacheError, CacheLock, CacheRoot, LockMode, Manifest, PublishOutcome};
use crate::config::Profile;
use crate::config::types::DEFAULT_BUILD_TIMEOUT_SECS;
use crate::util::fs::remove_dir_if_exists;

const LOCK_COMMAND: &str = "cxxnode build";

/// Knobs for one resolution run.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
  pub policy: CachePolicy,
  pub profile: Profile,
  /// Parallelism passed to the dependency's build system.
  pub jobs: Option<usize>,
  /// Applies to each acquisition and build step separately.
  pub build_timeout: Duration,
  /// Extra attempts after a failed dependency build.
  pub build_retries: u32,
}

impl Default for ResolveOptions {
  fn default() -> Self {
    Self {
      policy: CachePolicy::Reuse,
      profile: Profile::Debug,
      jobs: None,
      build_timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
      build_retries: 0,
    }
  }
}

/// Resolve one dependency to its artifacts.
///
/// Holds a shared cache lock for the duration, so eviction cannot run
/// concurrently. A forced rebuild holds the lock exclusively instead, since
/// it swaps out entries other builds may be reading.
pub async fn resolve_dependency(
  cache: &CacheRoot,
  spec: &DependencySpec,
  options: &ResolveOptions,
) -> Result<ResolvedDependency, DependencyError> {
  let _lock = lock_if_needed(cache, std::slice::from_ref(spec), options.policy)?;
  resolve_locked(cache, spec, options).await
}

/// Resolve every dependency in declaration order under a single lock.
pub async fn resolve_dependencies(
  cache: &CacheRoot,
  specs: &[DependencySpec],
  options: &ResolveOptions,
) -> Result<Vec<ResolvedDependency>, DependencyError> {
  let _lock = lock_if_needed(cache, specs, options.policy)?;
  let mut resolved = Vec::with_capacity(specs.len());
  for spec in specs {
    resolved.push(resolve_locked(cache, spec, options).await?);
  }
  Ok(resolved)
}

/// Resolve a `system` dependency through pkg-config and its declared
/// libraries. Needs no cache.
pub async fn resolve_system(
  spec: &DependencySpec,
  options: &ResolveOptions,
) -> Result<ResolvedDependency, DependencyError> {
  let artifacts = system::discover(spec, options.build_timeout).await?;
  Ok(ResolvedDependency {
    artifacts,
    cache_hit: false,
  })
}

fn lock_if_needed(
  cache: &CacheRoot,
  specs: &[DependencySpec],
  policy: CachePolicy,
) -> Result<Option<CacheLock>, CacheError> {
  if specs.iter().all(|s| s.kind == DependencyKind::System) {
    return Ok(None);
  }
  let mode = match policy {
    CachePolicy::Reuse => LockMode::Shared,
    CachePolicy::ForceRebuild => LockMode::Exclusive,
  };
  cache.lock(mode, LOCK_COMMAND).map(Some)
}

async fn resolve_locked(
  cache: &CacheRoot,
  spec: &DependencySpec,
  options: &ResolveOptions,
) -> Result<ResolvedDependency, DependencyError> {
  if spec.kind == DependencyKind::System {
    return resolve_system(spec, options).await;
  }

  let build_system = parse_build_system(spec)?;
  let id = identity(spec, build_system, options.profile).map_err(|source| DependencyError::Identity {
    name: spec.name.clone(),
    source,
  })?;
  let label = id.label.as_str();

  if options.policy == CachePolicy::Reuse {
    match cache.lookup(label) {
      Ok(Some(manifest)) => {
        info!(name = %spec.name, label, "dependency cache hit");
        cache.touch(label);
        return Ok(ResolvedDependency {
          artifacts: manifest.artifacts(&cache.entry_dir(label)),
          cache_hit: true,
        });
      }
      Ok(None) => {}
      Err(CacheError::Corrupt { message, .. }) => {
        warn!(name = %spec.name, label, reason = %message, "cache entry is corrupt, rebuilding");
        cache.unpublish(label)?;
      }
      Err(e) => return Err(e.into()),
    }
  }

  info!(name = %spec.name, label, kind = %spec.kind, "dependency cache miss");
  let scratch = cache.create_scratch(label)?;
  let manifest = populate(spec, build_system, scratch.path(), label, options).await?;

  let outcome = match options.policy {
    CachePolicy::Reuse => cache.publish(scratch, label)?,
    CachePolicy::ForceRebuild => cache.replace(scratch, label)?,
  };
  let entry = cache.entry_dir(label);
  let manifest = match outcome {
    PublishOutcome::Published => manifest,
    PublishOutcome::AlreadyPresent => Manifest::read(&entry)?,
  };
  cache.touch(label);

  Ok(ResolvedDependency {
    artifacts: manifest.artifacts(&entry),
    cache_hit: false,
  })
}

fn parse_build_system(spec: &DependencySpec) -> Result<BuildSystem, DependencyError> {
  let Some(declared) = spec.build_system.as_deref() else {
    return Ok(BuildSystem::None);
  };
  declared.parse().map_err(|_| DependencyError::UnsupportedBuildSystem {
    name: spec.name.clone(),
    build_system: declared.to_string(),
  })
}

/// Acquire, build and describe the dependency inside `scratch`, returning
/// the manifest already written there.
async fn populate(
  spec: &DependencySpec,
  build_system: BuildSystem,
  scratch: &Path,
  label: &str,
  options: &ResolveOptions,
) -> Result<Manifest, DependencyError> {
  let source_root = scratch.join("source");
  fetch::acquire(spec, &source_root, options.build_timeout).await?;

  let source_dir = match spec.subdir.as_deref().map(|s| s.trim_matches('/')) {
    Some(sub) if !sub.is_empty() => source_root.join(sub),
    _ => source_root.clone(),
  };
  if !source_dir.is_dir() {
    return Err(DependencyError::AcquisitionFailed {
      name: spec.name.clone(),
      message: format!("subdirectory '{}' not found in sources", spec.subdir.as_deref().unwrap_or_default()),
    });
  }

  let install_dir = scratch.join("install");
  let build_dir = scratch.join("build");
  let request = BuildRequest {
    name: &spec.name,
    system: build_system,
    source_dir: &source_dir,
    build_dir: &build_dir,
    install_dir: &install_dir,
    profile: options.profile,
    jobs: options.jobs,
    timeout: options.build_timeout,
    options: &spec.options,
    include_dirs: &spec.include_dirs,
  };

  let mut attempt = 0;
  loop {
    match build_and_install(&request).await {
      Ok(()) => break,
      Err(e) if matches!(e, DependencyError::BuildFailed { .. }) && attempt < options.build_retries => {
        attempt += 1;
        warn!(name = %spec.name, attempt, error = %e, "dependency build failed, retrying");
        for dir in [&build_dir, &install_dir] {
          remove_dir_if_exists(dir).map_err(|source| DependencyError::Io {
            path: dir.to_path_buf(),
            source,
          })?;
        }
      }
      Err(e) => return Err(e),
    }
  }
  remove_dir_if_exists(&build_dir).map_err(|source| DependencyError::Io {
    path: build_dir.clone(),
    source,
  })?;

  let mut manifest = Manifest::new(label, spec);
  for conventional in ["include", "inc"] {
    let dir = install_dir.join(conventional);
    if dir.is_dir() {
      manifest.add_include_dir(scratch, &dir);
    }
  }
  if build_system != BuildSystem::None {
    for declared in &spec.include_dirs {
      let dir = source_dir.join(declared);
      if dir.is_dir() {
        manifest.add_include_dir(scratch, &dir);
      }
    }
  }
  for conventional in ["lib", "lib64", "libs"] {
    let dir = install_dir.join(conventional);
    if dir.is_dir() {
      manifest.add_lib_dir(scratch, &dir);
    }
  }
  for declared in &spec.lib_dirs {
    let dir = install_dir.join(declared);
    if dir.is_dir() {
      manifest.add_lib_dir(scratch, &dir);
    }
  }
  manifest.libraries = spec.libraries.clone();
  manifest.write(scratch)?;
  Ok(manifest)
}
