//! Compile flag assembly and parallel per-source compilation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::BuildError;
use super::stamp::ObjectStamp;
use crate::config::{BuildSettings, Profile};
use crate::process::{Invocation, run};
use crate::toolchain::{Family, Language, ToolchainHandle};

/// Compile arguments per language, excluding the source and object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFlags {
  pub c: Vec<String>,
  pub cxx: Vec<String>,
}

impl CompileFlags {
  /// Order: base, standard, warnings, profile, user flags, defines, includes.
  pub fn assemble(build: &BuildSettings, toolchain: &ToolchainHandle, include_dirs: &[PathBuf]) -> Self {
    let family = toolchain.family;
    let shared_tail = || {
      let mut tail: Vec<String> = build.defines.iter().map(|d| family.define_flag(d)).collect();
      tail.extend(include_dirs.iter().map(|dir| family.include_flag(dir)));
      tail
    };

    let mut c = Vec::new();
    if toolchain.needs_force_c()
      && let Some(flag) = family.force_c_flag()
    {
      c.push(flag.to_string());
    }
    c.extend(family.base_compile_flags());
    c.push(family.std_flag(&build.c_std));
    c.extend(family.warning_flags(build.warnings, build.warnings_as_errors));
    c.extend(profile_flags(family, build));
    c.extend(build.cflags.iter().cloned());
    c.extend(shared_tail());

    let mut cxx = family.base_compile_flags();
    cxx.push(family.std_flag(&build.std));
    cxx.extend(family.warning_flags(build.warnings, build.warnings_as_errors));
    cxx.extend(profile_flags(family, build));
    cxx.extend(build.cxxflags.iter().cloned());
    cxx.extend(shared_tail());

    Self { c, cxx }
  }

  pub fn for_language(&self, language: Language) -> &[String] {
    match language {
      Language::C => &self.c,
      Language::Cxx => &self.cxx,
    }
  }
}

/// Optimisation and debug-info flags for the active profile, honouring the
/// explicit overrides.
pub fn profile_flags(family: Family, build: &BuildSettings) -> Vec<String> {
  let (default_level, default_debug) = match build.profile {
    Profile::Debug => ("0", true),
    Profile::Release => ("2", false),
  };
  let level = build.optimization.as_deref().unwrap_or(default_level);
  let mut flags = vec![family.optimization_flag(level)];
  if build.debug_info.unwrap_or(default_debug) {
    flags.push(family.debug_flag());
  }
  if build.profile == Profile::Release {
    flags.push(family.define_flag("NDEBUG"));
  }
  flags
}

/// Object path for a source at `relative` (`/`-separated), relative to the
/// build directory. The source tree is mirrored so distinct sources never
/// share an object.
pub fn object_name(relative: &str, family: Family) -> String {
  format!("{relative}.{}", family.object_extension())
}

/// One source to compile.
#[derive(Debug, Clone)]
pub struct CompileJob {
  pub source: PathBuf,
  pub language: Language,
  pub object_name: String,
  pub object: PathBuf,
  pub stamp: ObjectStamp,
}

pub fn compile_invocation(toolchain: &ToolchainHandle, flags: &[String], job: &CompileJob, timeout: Duration) -> Invocation {
  Invocation::new(toolchain.driver(job.language), timeout)
    .args(flags)
    .args(toolchain.family.compile_only_args(&job.source, &job.object))
}

/// Compile every job with at most `parallelism` compilers running.
///
/// The first failure aborts the remaining jobs and is returned; objects
/// from jobs that finished are left in place for the next build.
pub async fn compile_all(
  toolchain: &ToolchainHandle,
  flags: &CompileFlags,
  jobs: Vec<CompileJob>,
  parallelism: usize,
  timeout: Duration,
  project_dir: &Path,
) -> Result<Vec<CompileJob>, BuildError> {
  let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
  let mut join_set = JoinSet::new();

  for job in jobs {
    let invocation = compile_invocation(toolchain, flags.for_language(job.language), &job, timeout);
    let semaphore = semaphore.clone();
    join_set.spawn(async move {
      // The semaphore is never closed, so this always yields a permit.
      let _permit = semaphore.acquire_owned().await;
      let result = run(&invocation).await;
      (job, invocation.command_line(), result)
    });
  }

  let mut done = Vec::new();
  while let Some(joined) = join_set.join_next().await {
    let (job, command, result) = match joined {
      Ok(v) => v,
      Err(e) => {
        join_set.abort_all();
        return Err(BuildError::Task(e));
      }
    };
    let shown = job.source.strip_prefix(project_dir).unwrap_or(&job.source).display().to_string();
    let output = match result {
      Ok(output) if output.success() => {
        info!(file = %shown, "compiled");
        debug!(cmd = %command, "compile command");
        done.push(job);
        continue;
      }
      Ok(output) => output.diagnostics(),
      Err(e) => e.to_string(),
    };
    join_set.abort_all();
    return Err(BuildError::CompileFailed {
      file: job.source,
      command,
      output,
    });
  }
  Ok(done)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn settings(profile: Profile) -> BuildSettings {
    let mut build = BuildSettings::with_output("node");
    build.profile = profile;
    build
  }

  fn handle(family: Family, separate_c: bool) -> ToolchainHandle {
    let cxx = PathBuf::from("/usr/bin/c++");
    ToolchainHandle {
      family,
      cc: if separate_c { PathBuf::from("/usr/bin/cc") } else { cxx.clone() },
      linker: cxx.clone(),
      cxx,
      version: "test".to_string(),
    }
  }

  #[test]
  fn gnu_flags_follow_documented_order() {
    let mut build = settings(Profile::Release);
    build.warnings_as_errors = true;
    build.cxxflags = vec!["-fno-rtti".to_string()];
    build.defines = vec!["FOO=1".to_string()];
    let includes = vec![PathBuf::from("/staged"), PathBuf::from("/dep/include")];

    let flags = CompileFlags::assemble(&build, &handle(Family::Gcc, true), &includes);

    assert_eq!(
      flags.cxx,
      vec![
        "-std=c++17",
        "-Wall",
        "-Werror",
        "-O2",
        "-DNDEBUG",
        "-fno-rtti",
        "-DFOO=1",
        "-I/staged",
        "-I/dep/include"
      ]
    );
    assert_eq!(flags.c[0], "-std=c11");
  }

  #[test]
  fn msvc_debug_profile() {
    let build = settings(Profile::Debug);

    let flags = CompileFlags::assemble(&build, &handle(Family::Msvc, false), &[]);

    assert_eq!(flags.cxx, vec!["/nologo", "/EHsc", "/MD", "/std:c++17", "/W3", "/Od", "/Z7"]);
  }

  #[test]
  fn c_on_cxx_driver_is_forced() {
    let build = settings(Profile::Debug);

    let shared = CompileFlags::assemble(&build, &handle(Family::Clang, false), &[]);
    let separate = CompileFlags::assemble(&build, &handle(Family::Clang, true), &[]);

    assert_eq!(shared.c[0], "-xc");
    assert_ne!(separate.c[0], "-xc");
  }

  #[test]
  fn overrides_replace_profile_defaults() {
    let mut build = settings(Profile::Release);
    build.optimization = Some("s".to_string());
    build.debug_info = Some(true);

    assert_eq!(profile_flags(Family::Clang, &build), vec!["-Os", "-g", "-DNDEBUG"]);
  }

  #[test]
  fn debug_and_release_differ() {
    assert_ne!(
      profile_flags(Family::Gcc, &settings(Profile::Debug)),
      profile_flags(Family::Gcc, &settings(Profile::Release))
    );
  }

  #[test]
  fn object_names_mirror_source_tree() {
    assert_eq!(object_name("src/net/socket.cc", Family::Gcc), "src/net/socket.cc.o");
    assert_ne!(object_name("src/a_b.cc", Family::Gcc), object_name("src/a/b.cc", Family::Gcc));
    assert_eq!(object_name("main.c", Family::Msvc), "main.c.obj");
  }

  #[test]
  fn compile_invocation_ends_with_source_and_object() {
    let toolchain = handle(Family::Clang, true);
    let job = CompileJob {
      source: PathBuf::from("/p/src/a.c"),
      language: Language::C,
      object_name: "src/a.c.o".to_string(),
      object: PathBuf::from("/p/target/debug/build/src/a.c.o"),
      stamp: ObjectStamp {
        source_mtime: 0,
        flags_hash: String::new(),
      },
    };

    let invocation = compile_invocation(&toolchain, &["-std=c11".to_string()], &job, Duration::from_secs(1));

    assert_eq!(
      invocation.command_line(),
      "/usr/bin/cc -std=c11 -c /p/src/a.c -o /p/target/debug/build/src/a.c.o"
    );
  }
}
