//! Running a dependency's own build system into an install prefix.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use walkdir::WalkDir;

use super::DependencyError;
use super::types::BuildSystem;
use crate::config::Profile;
use crate::process::{Invocation, run};
use crate::util::fs::{copy_dir_all, is_header};

/// Everything a build system step needs.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
  pub name: &'a str,
  pub system: BuildSystem,
  pub source_dir: &'a Path,
  pub build_dir: &'a Path,
  pub install_dir: &'a Path,
  pub profile: Profile,
  pub jobs: Option<usize>,
  pub timeout: Duration,
  pub options: &'a BTreeMap<String, String>,
  pub include_dirs: &'a [String],
}

/// Build and install. Failures carry the failing command and its output.
pub async fn build_and_install(req: &BuildRequest<'_>) -> Result<(), DependencyError> {
  info!(name = req.name, system = %req.system, "building dependency");
  std::fs::create_dir_all(req.install_dir).map_err(|source| DependencyError::Io {
    path: req.install_dir.to_path_buf(),
    source,
  })?;

  match req.system {
    BuildSystem::Cmake => {
      std::fs::create_dir_all(req.build_dir).map_err(|source| DependencyError::Io {
        path: req.build_dir.to_path_buf(),
        source,
      })?;
      for step in cmake_steps(req) {
        run_step(req, step).await?;
      }
      Ok(())
    }
    BuildSystem::Make => {
      let jobs = jobs_arg(req.jobs);
      run_step(req, Invocation::new("make", req.timeout).args(jobs).current_dir(req.source_dir)).await?;
      let prefix = format!("PREFIX={}", req.install_dir.display());
      run_step(
        req,
        Invocation::new("make", req.timeout)
          .args(["install".to_string(), prefix])
          .current_dir(req.source_dir),
      )
      .await
    }
    BuildSystem::Ninja => {
      for step in ninja_steps(req) {
        run_step(req, step).await?;
      }
      adopt_staged_prefix(&ninja_stage_dir(req), req.install_dir)
    }
    BuildSystem::None => install_headers(req),
  }
}

fn cmake_steps(req: &BuildRequest<'_>) -> Vec<Invocation> {
  let build_type = req.profile.cmake_build_type();
  let mut configure = Invocation::new("cmake", req.timeout)
    .arg(format!("-DCMAKE_INSTALL_PREFIX={}", req.install_dir.display()))
    .arg(format!("-DCMAKE_BUILD_TYPE={build_type}"));
  for (key, value) in req.options {
    configure = configure.arg(format!("-D{key}={value}"));
  }
  configure = configure.arg(req.source_dir).current_dir(req.build_dir);

  let mut build = Invocation::new("cmake", req.timeout).args(["--build", ".", "--config", build_type]);
  if let Some(jobs) = req.jobs {
    build = build.arg("--parallel").arg(jobs.to_string());
  }
  let build = build.current_dir(req.build_dir);

  let install = Invocation::new("cmake", req.timeout)
    .args(["--install", ".", "--config", build_type])
    .current_dir(req.build_dir);

  vec![configure, build, install]
}

/// `ninja install` only honours `DESTDIR`, so files are staged under
/// `build/stage/<configured prefix>` and adopted afterwards.
fn ninja_steps(req: &BuildRequest<'_>) -> Vec<Invocation> {
  let build = Invocation::new("ninja", req.timeout)
    .args(jobs_arg(req.jobs))
    .current_dir(req.source_dir);
  let install = Invocation::new("ninja", req.timeout)
    .arg("install")
    .env("DESTDIR", ninja_stage_dir(req).to_string_lossy().into_owned())
    .current_dir(req.source_dir);
  vec![build, install]
}

fn ninja_stage_dir(req: &BuildRequest<'_>) -> PathBuf {
  req.build_dir.join("stage")
}

/// Directory names that mark the top of an install prefix.
const PREFIX_LAYOUT_DIRS: &[&str] = &["include", "inc", "lib", "lib64", "libs", "bin", "share"];

/// Copy the installed prefix found under `stage` into `install_dir`.
///
/// The prefix is reached by descending through directories that are the
/// only entry of their parent, stopping at a conventional layout directory.
fn adopt_staged_prefix(stage: &Path, install_dir: &Path) -> Result<(), DependencyError> {
  if !stage.is_dir() {
    return Ok(());
  }
  let mut prefix = stage.to_path_buf();
  loop {
    let entries: Vec<_> = std::fs::read_dir(&prefix).map_err(io(&prefix))?.flatten().collect();
    let [only] = entries.as_slice() else {
      break;
    };
    let is_dir = only.file_type().map(|t| t.is_dir()).unwrap_or(false);
    let name = only.file_name();
    if !is_dir || PREFIX_LAYOUT_DIRS.iter().any(|d| name == *d) {
      break;
    }
    prefix = only.path();
  }
  debug!(prefix = %prefix.display(), "adopting staged install");
  copy_dir_all(&prefix, install_dir).map_err(io(install_dir))
}

fn jobs_arg(jobs: Option<usize>) -> Vec<String> {
  jobs.map(|j| vec![format!("-j{j}")]).unwrap_or_default()
}

async fn run_step(req: &BuildRequest<'_>, invocation: Invocation) -> Result<(), DependencyError> {
  let step = invocation.command_line();
  debug!(name = req.name, step = %step, "running build step");
  let output = run(&invocation).await.map_err(|e| DependencyError::BuildFailed {
    name: req.name.to_string(),
    step: step.clone(),
    output: e.to_string(),
  })?;
  if !output.success() {
    return Err(DependencyError::BuildFailed {
      name: req.name.to_string(),
      step,
      output: output.diagnostics(),
    });
  }
  Ok(())
}

/// Header-only install: declared include dirs are copied under
/// `install/include/<dir>`; otherwise the conventional `include/` tree, or the
/// headers found under `src/` or the root.
fn install_headers(req: &BuildRequest<'_>) -> Result<(), DependencyError> {
  let dest = req.install_dir.join("include");
  std::fs::create_dir_all(&dest).map_err(io(&dest))?;

  if !req.include_dirs.is_empty() {
    for dir in req.include_dirs {
      let src = req.source_dir.join(dir);
      let target = dest.join(dir);
      if src.is_dir() {
        copy_dir_all(&src, &target).map_err(io(&src))?;
      } else if src.is_file() {
        if let Some(parent) = target.parent() {
          std::fs::create_dir_all(parent).map_err(io(parent))?;
        }
        std::fs::copy(&src, &target).map_err(io(&src))?;
      }
    }
    return Ok(());
  }

  let include = req.source_dir.join("include");
  if include.is_dir() {
    return copy_dir_all(&include, &dest).map_err(io(&include));
  }

  let root: PathBuf = [req.source_dir.join("src"), req.source_dir.to_path_buf()]
    .into_iter()
    .find(|p| p.is_dir())
    .unwrap_or_else(|| req.source_dir.to_path_buf());
  for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
    if !entry.file_type().is_file() || !is_header(entry.path()) {
      continue;
    }
    let Ok(rel) = entry.path().strip_prefix(&root) else {
      continue;
    };
    let target = dest.join(rel);
    if let Some(parent) = target.parent() {
      std::fs::create_dir_all(parent).map_err(io(parent))?;
    }
    std::fs::copy(entry.path(), &target).map_err(io(entry.path()))?;
  }
  Ok(())
}

fn io(path: &Path) -> impl FnOnce(std::io::Error) -> DependencyError {
  let path = path.to_path_buf();
  move |source| DependencyError::Io { path, source }
}
