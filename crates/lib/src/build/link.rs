//! The final link step.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use super::BuildError;
use super::runtime::RuntimeContribution;
use crate::config::BuildSettings;
use crate::deps::DependencyArtifacts;
use crate::platform::os::Os;
use crate::process::{Invocation, run};
use crate::toolchain::ToolchainHandle;
use crate::util::hash::hash_bytes;

/// Library search dirs and names in link order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPlan {
  pub lib_dirs: Vec<PathBuf>,
  pub libraries: Vec<String>,
  pub ldflags: Vec<String>,
  pub system_flags: Vec<String>,
}

impl LinkPlan {
  /// Project entries come before dependency entries, which come before the
  /// runtime's.
  pub fn assemble(
    build: &BuildSettings,
    toolchain: &ToolchainHandle,
    dependencies: &[DependencyArtifacts],
    runtime: &RuntimeContribution,
    os: Os,
  ) -> Self {
    let mut plan = Self::default();
    let dirs = build
      .lib_dirs
      .iter()
      .chain(dependencies.iter().flat_map(|d| &d.lib_dirs))
      .chain(&runtime.lib_dirs);
    for dir in dirs {
      if !plan.lib_dirs.contains(dir) {
        plan.lib_dirs.push(dir.clone());
      }
    }
    let libraries = build
      .libraries
      .iter()
      .chain(dependencies.iter().flat_map(|d| &d.libraries))
      .chain(&runtime.libraries);
    for lib in libraries {
      if !plan.libraries.contains(lib) {
        plan.libraries.push(lib.clone());
      }
    }
    plan.ldflags = build.ldflags.clone();
    plan.system_flags = toolchain.family.system_link_flags(os);
    plan
  }

  /// The link command producing `executable` from `objects`.
  pub fn invocation(
    &self,
    toolchain: &ToolchainHandle,
    objects: &[PathBuf],
    executable: &Path,
    timeout: Duration,
  ) -> Invocation {
    let family = toolchain.family;
    let mut invocation = Invocation::new(&toolchain.linker, timeout);
    if family.is_msvc_style() {
      invocation = invocation.arg("/nologo");
    }
    invocation = invocation
      .args(objects)
      .args(family.output_exe_args(executable));

    match family.linker_passthrough() {
      Some(passthrough) => {
        // Library names go to the driver, search paths and raw flags to the linker.
        invocation = invocation
          .args(self.libraries.iter().map(|l| family.library_flag(l)))
          .args(&self.system_flags)
          .arg(passthrough)
          .args(self.lib_dirs.iter().map(|d| family.lib_dir_flag(d)))
          .args(&self.ldflags);
      }
      None => {
        invocation = invocation
          .args(self.lib_dirs.iter().map(|d| family.lib_dir_flag(d)))
          .args(self.libraries.iter().map(|l| family.library_flag(l)))
          .args(&self.ldflags)
          .args(&self.system_flags);
      }
    }
    invocation
  }
}

/// Hash of a link command; a change forces a relink.
pub fn link_fingerprint(invocation: &Invocation) -> String {
  hash_bytes(invocation.command_line().as_bytes()).0
}

pub async fn link(invocation: &Invocation, executable: &Path) -> Result<(), BuildError> {
  let command = invocation.command_line();
  debug!(cmd = %command, "linking");
  let failed = |output: String| BuildError::LinkFailed {
    executable: executable.to_path_buf(),
    command: command.clone(),
    output,
  };
  let output = run(invocation).await.map_err(|e| failed(e.to_string()))?;
  if !output.success() {
    return Err(failed(output.diagnostics()));
  }
  info!(executable = %executable.display(), "linked");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::toolchain::Family;

  fn handle(family: Family) -> ToolchainHandle {
    let driver = PathBuf::from(if family.is_msvc_style() { "cl" } else { "c++" });
    ToolchainHandle {
      family,
      cxx: driver.clone(),
      cc: driver.clone(),
      linker: driver,
      version: "test".to_string(),
    }
  }

  fn plan() -> LinkPlan {
    LinkPlan {
      lib_dirs: vec![PathBuf::from("/proj/lib"), PathBuf::from("/dep/lib")],
      libraries: vec!["proj".to_string(), "dep".to_string()],
      ldflags: vec!["-Wl,--as-needed".to_string()],
      system_flags: vec!["-pthread".to_string()],
    }
  }

  #[test]
  fn gnu_link_order() {
    let objects = vec![PathBuf::from("a.o"), PathBuf::from("b.o")];

    let invocation = plan().invocation(&handle(Family::Gcc), &objects, Path::new("out/node"), Duration::from_secs(1));

    assert_eq!(
      invocation.command_line(),
      "c++ a.o b.o -o out/node -L/proj/lib -L/dep/lib -lproj -ldep -Wl,--as-needed -pthread"
    );
  }

  #[test]
  fn msvc_puts_search_paths_after_link() {
    let mut plan = plan();
    plan.ldflags.clear();
    plan.system_flags = vec!["ws2_32.lib".to_string()];
    let objects = vec![PathBuf::from("a.obj")];

    let invocation = plan.invocation(&handle(Family::Msvc), &objects, Path::new("node.exe"), Duration::from_secs(1));

    assert_eq!(
      invocation.command_line(),
      "cl /nologo a.obj /Fenode.exe proj.lib dep.lib ws2_32.lib /link /LIBPATH:/proj/lib /LIBPATH:/dep/lib"
    );
  }

  #[test]
  fn assemble_dedups_in_precedence_order() {
    let mut build = BuildSettings::with_output("node");
    build.lib_dirs = vec![PathBuf::from("/shared")];
    build.libraries = vec!["z".to_string()];
    let deps = vec![DependencyArtifacts {
      name: "dep".to_string(),
      label: None,
      include_dirs: Vec::new(),
      lib_dirs: vec![PathBuf::from("/shared"), PathBuf::from("/dep/lib")],
      libraries: vec!["dep".to_string(), "z".to_string()],
    }];
    let runtime = RuntimeContribution {
      include_dirs: Vec::new(),
      lib_dirs: vec![PathBuf::from("/runtime/release")],
      libraries: vec!["dora_node_api_c".to_string()],
    };

    let plan = LinkPlan::assemble(&build, &handle(Family::Clang), &deps, &runtime, Os::Linux);

    assert_eq!(
      plan.lib_dirs,
      vec![PathBuf::from("/shared"), PathBuf::from("/dep/lib"), PathBuf::from("/runtime/release")]
    );
    assert_eq!(plan.libraries, vec!["z", "dep", "dora_node_api_c"]);
    assert_eq!(plan.system_flags, vec!["-pthread"]);
  }
}
