//! Compiling and linking the node executable.
//!
//! Layout under `<out_dir>/<profile>/`:
//!
//! ```text
//! build/                 objects and the build stamp
//! include/               staged project headers
//! deps/                  staged runtime headers
//! <output>[.exe]         the executable
//! ```
//!
//! Objects are reused only when the build-wide fingerprint (toolchain,
//! flags, dependency artifacts) is unchanged and the object's own source
//! time and flags match its record in the stamp.

pub mod compile;
pub mod link;
pub mod runtime;
pub mod stamp;

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ResolvedConfig;
use crate::deps::DependencyArtifacts;
use crate::platform::os::Os;
use crate::sources::SourceSet;
use crate::toolchain::ToolchainHandle;
use crate::util::fs::{modified_nanos, remove_dir_if_exists};
use crate::util::hash::{HashError, Hashable};
use compile::{CompileFlags, CompileJob, compile_all, object_name};
use link::{LinkPlan, link, link_fingerprint};
use stamp::{BuildFingerprint, ObjectStamp, STAMP_FILENAME, Stamp, flags_hash};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("no source files found under {}", .root.display())]
  NoSourcesFound { root: PathBuf },

  #[error("source file {} does not exist", .path.display())]
  MissingSource { path: PathBuf },

  #[error("failed to compile {}\n  command: {command}\n{output}", .file.display())]
  CompileFailed {
    file: PathBuf,
    command: String,
    output: String,
  },

  #[error("failed to link {}\n  command: {command}\n{output}", .executable.display())]
  LinkFailed {
    executable: PathBuf,
    command: String,
    output: String,
  },

  #[error("no object files to link")]
  NoObjects,

  #[error("runtime directory {} does not exist", .dir.display())]
  RuntimeNotFound { dir: PathBuf },

  #[error("failed to fingerprint build inputs: {0}")]
  Fingerprint(#[source] HashError),

  #[error("compile task failed: {0}")]
  Task(#[from] tokio::task::JoinError),

  #[error("I/O error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Output paths for one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
  pub profile_dir: PathBuf,
  pub build_dir: PathBuf,
  pub include_dir: PathBuf,
  pub deps_dir: PathBuf,
  pub executable: PathBuf,
}

impl BuildLayout {
  pub fn new(config: &ResolvedConfig, os: Os) -> Self {
    let profile_dir = config.profile_dir();
    Self {
      build_dir: profile_dir.join("build"),
      include_dir: profile_dir.join("include"),
      deps_dir: profile_dir.join("deps"),
      executable: profile_dir.join(format!("{}{}", config.build.output, os.exe_suffix())),
      profile_dir,
    }
  }

  pub fn stamp_path(&self) -> PathBuf {
    self.build_dir.join(STAMP_FILENAME)
  }

  /// Create the directories; staged header dirs start out empty.
  fn prepare(&self) -> Result<(), BuildError> {
    for dir in [&self.include_dir, &self.deps_dir] {
      remove_dir_if_exists(dir).map_err(io(dir))?;
    }
    for dir in [&self.build_dir, &self.include_dir, &self.deps_dir] {
      std::fs::create_dir_all(dir).map_err(io(dir))?;
    }
    Ok(())
  }
}

/// What a build did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
  pub executable: PathBuf,
  pub compiled: usize,
  pub reused: usize,
  pub linked: bool,
}

/// Compile stale sources and link the executable if anything changed.
pub async fn build(
  config: &ResolvedConfig,
  toolchain: &ToolchainHandle,
  sources: &SourceSet,
  dependencies: &[DependencyArtifacts],
  os: Os,
) -> Result<BuildReport, BuildError> {
  if sources.is_empty() {
    return Err(BuildError::NoSourcesFound {
      root: config.project_dir.clone(),
    });
  }
  if let Some(missing) = sources.files.iter().find(|f| !f.path.is_file()) {
    return Err(BuildError::MissingSource {
      path: missing.path.clone(),
    });
  }

  let layout = BuildLayout::new(config, os);
  layout.prepare()?;
  runtime::stage_project_headers(&config.project_dir, &layout.include_dir)?;
  let runtime = runtime::stage_runtime(&config.runtime, config.build.profile, &layout.deps_dir)?;

  let mut include_dirs = vec![layout.include_dir.clone(), layout.deps_dir.clone()];
  let declared = config
    .build
    .include_dirs
    .iter()
    .chain(dependencies.iter().flat_map(|d| &d.include_dirs))
    .chain(&runtime.include_dirs);
  for dir in declared {
    if !include_dirs.contains(dir) {
      include_dirs.push(dir.clone());
    }
  }

  let flags = CompileFlags::assemble(&config.build, toolchain, &include_dirs);
  let fingerprint = BuildFingerprint::new(toolchain, &flags.c, &flags.cxx, dependencies)
    .content_hash()
    .map_err(BuildError::Fingerprint)?
    .0;

  let stamp_path = layout.stamp_path();
  let mut stamp = match Stamp::load(&stamp_path) {
    Some(stamp) if stamp.fingerprint == fingerprint => stamp,
    previous => {
      if previous.is_some() {
        info!(dir = %layout.build_dir.display(), "build inputs changed, discarding all objects");
      }
      remove_dir_if_exists(&layout.build_dir).map_err(io(&layout.build_dir))?;
      std::fs::create_dir_all(&layout.build_dir).map_err(io(&layout.build_dir))?;
      let fresh = Stamp::new(fingerprint);
      fresh.save(&stamp_path)?;
      fresh
    }
  };

  let mut objects = Vec::with_capacity(sources.len());
  let mut jobs = Vec::new();
  for file in &sources.files {
    let name = object_name(&file.relative, toolchain.family);
    let object = layout.build_dir.join(&name);
    let current = ObjectStamp {
      source_mtime: modified_nanos(&file.path).map_err(io(&file.path))?,
      flags_hash: flags_hash(flags.for_language(file.language)),
    };
    if !stamp.is_fresh(&name, &object, &current) {
      if let Some(parent) = object.parent() {
        std::fs::create_dir_all(parent).map_err(io(parent))?;
      }
      jobs.push(CompileJob {
        source: file.path.clone(),
        language: file.language,
        object_name: name.clone(),
        object: object.clone(),
        stamp: current,
      });
    }
    objects.push((name, object));
  }

  let reused = objects.len() - jobs.len();
  debug!(compile = jobs.len(), reused, "planned compilation");

  let compiled = if jobs.is_empty() {
    0
  } else {
    let done = compile_all(
      toolchain,
      &flags,
      jobs,
      config.jobs(),
      config.build.compile_timeout,
      &config.project_dir,
    )
    .await?;
    for job in &done {
      stamp.objects.insert(job.object_name.clone(), job.stamp.clone());
    }
    done.len()
  };
  stamp
    .objects
    .retain(|name, _| objects.iter().any(|(current, _)| current == name));
  stamp.save(&stamp_path)?;

  if objects.is_empty() {
    return Err(BuildError::NoObjects);
  }
  let object_paths: Vec<PathBuf> = objects.into_iter().map(|(_, path)| path).collect();
  let plan = LinkPlan::assemble(&config.build, toolchain, dependencies, &runtime, os);
  let invocation = plan.invocation(
    toolchain,
    &object_paths,
    &layout.executable,
    config.build.compile_timeout,
  );
  let link_fp = link_fingerprint(&invocation);

  let needs_link = compiled > 0
    || !layout.executable.is_file()
    || stamp.link_fingerprint.as_deref() != Some(link_fp.as_str());
  if needs_link {
    stamp.link_fingerprint = None;
    stamp.save(&stamp_path)?;
    link(&invocation, &layout.executable).await?;
    stamp.link_fingerprint = Some(link_fp);
    stamp.save(&stamp_path)?;
  } else {
    info!(executable = %layout.executable.display(), "executable is up to date");
  }

  Ok(BuildReport {
    executable: layout.executable,
    compiled,
    reused,
    linked: needs_link,
  })
}

fn io(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError {
  let path = path.to_path_buf();
  move |source| BuildError::Io { path, source }
}
