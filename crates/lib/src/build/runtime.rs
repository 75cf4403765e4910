//! Header staging for the project and the dataflow runtime.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::BuildError;
use crate::config::{Profile, RuntimeSettings};
use crate::util::fs::is_header;

const BRIDGE_DIR: &str = "cxxbridge";
const BRIDGE_HEADER: &str = "src/lib.rs.h";

/// What the runtime adds to the compile and link lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeContribution {
  pub include_dirs: Vec<PathBuf>,
  pub lib_dirs: Vec<PathBuf>,
  pub libraries: Vec<String>,
}

/// Copy headers from `<project>/include` into `dest`, preserving layout.
/// Returns the number of headers copied.
pub fn stage_project_headers(project_dir: &Path, dest: &Path) -> Result<usize, BuildError> {
  let src = project_dir.join("include");
  if !src.is_dir() {
    return Ok(0);
  }
  let mut copied = 0;
  for entry in WalkDir::new(&src).into_iter().filter_map(|e| e.ok()) {
    if !entry.file_type().is_file() || !is_header(entry.path()) {
      continue;
    }
    let Ok(rel) = entry.path().strip_prefix(&src) else {
      continue;
    };
    let target = dest.join(rel);
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).map_err(io(parent))?;
    }
    fs::copy(entry.path(), &target).map_err(io(entry.path()))?;
    copied += 1;
  }
  debug!(count = copied, dest = %dest.display(), "staged project headers");
  Ok(copied)
}

/// Stage the runtime's bridge headers into `deps_dir` and collect its
/// include and link contributions. No runtime configured contributes nothing.
pub fn stage_runtime(
  runtime: &RuntimeSettings,
  profile: Profile,
  deps_dir: &Path,
) -> Result<RuntimeContribution, BuildError> {
  let Some(dir) = &runtime.dir else {
    return Ok(RuntimeContribution::default());
  };
  if !dir.is_dir() {
    return Err(BuildError::RuntimeNotFound { dir: dir.clone() });
  }

  let mut contribution = RuntimeContribution::default();
  let profile_dir = dir.join(profile.as_str());
  for root in [profile_dir.join(BRIDGE_DIR), dir.join(BRIDGE_DIR)] {
    if !root.is_dir() {
      continue;
    }
    contribution.include_dirs.push(root.clone());
    let mut crates: Vec<PathBuf> = fs::read_dir(&root)
      .map_err(io(&root))?
      .flatten()
      .map(|e| e.path())
      .filter(|p| p.is_dir())
      .collect();
    crates.sort();
    for crate_dir in crates {
      let header = crate_dir.join(BRIDGE_HEADER);
      if !header.is_file() {
        continue;
      }
      let Some(crate_name) = crate_dir.file_name().and_then(|n| n.to_str()) else {
        continue;
      };
      let target = deps_dir.join(header_name(crate_name));
      fs::copy(&header, &target).map_err(io(&header))?;
      debug!(from = %header.display(), to = %target.display(), "staged runtime header");
      contribution.include_dirs.push(crate_dir.join("src"));
    }
  }
  if contribution.include_dirs.is_empty() {
    warn!(dir = %dir.display(), "runtime directory has no bridge headers");
  }

  if profile_dir.is_dir() {
    contribution.lib_dirs.push(profile_dir);
  }
  contribution.libraries = runtime.libraries.clone();
  Ok(contribution)
}

/// `dora-node-api-cxx` becomes `dora-node-api.h`.
pub fn header_name(crate_name: &str) -> String {
  let stem = crate_name
    .strip_suffix("-cxx")
    .or_else(|| crate_name.strip_suffix("-c"))
    .unwrap_or(crate_name);
  format!("{stem}.h")
}

fn io(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError {
  let path = path.to_path_buf();
  move |source| BuildError::Io { path, source }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn header_names_drop_binding_suffix() {
    assert_eq!(header_name("dora-node-api-cxx"), "dora-node-api.h");
    assert_eq!(header_name("dora-operator-api-c"), "dora-operator-api.h");
    assert_eq!(header_name("plain"), "plain.h");
  }

  #[test]
  fn project_headers_keep_layout() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("node");
    fs::create_dir_all(project.join("include/node/detail")).unwrap();
    fs::write(project.join("include/node/api.hpp"), "").unwrap();
    fs::write(project.join("include/node/detail/impl.h"), "").unwrap();
    fs::write(project.join("include/README.md"), "").unwrap();
    let dest = temp.path().join("staged");

    let copied = stage_project_headers(&project, &dest).unwrap();

    assert_eq!(copied, 2);
    assert!(dest.join("node/api.hpp").is_file());
    assert!(dest.join("node/detail/impl.h").is_file());
    assert!(!dest.join("README.md").exists());
  }

  #[test]
  fn runtime_headers_are_staged() {
    let temp = TempDir::new().unwrap();
    let runtime_dir = temp.path().join("target");
    let bridge = runtime_dir.join("release/cxxbridge/dora-node-api-cxx/src");
    fs::create_dir_all(&bridge).unwrap();
    fs::write(bridge.join("lib.rs.h"), "// bridge").unwrap();
    let deps = temp.path().join("deps");
    fs::create_dir_all(&deps).unwrap();
    let settings = RuntimeSettings {
      dir: Some(runtime_dir.clone()),
      libraries: vec!["dora_node_api_cxx".to_string()],
    };

    let contribution = stage_runtime(&settings, Profile::Release, &deps).unwrap();

    assert_eq!(fs::read_to_string(deps.join("dora-node-api.h")).unwrap(), "// bridge");
    assert_eq!(
      contribution.include_dirs,
      vec![runtime_dir.join("release/cxxbridge"), bridge.clone()]
    );
    assert_eq!(contribution.lib_dirs, vec![runtime_dir.join("release")]);
    assert_eq!(contribution.libraries, vec!["dora_node_api_cxx"]);
  }

  #[test]
  fn missing_runtime_dir_is_an_error() {
    let temp = TempDir::new().unwrap();
    let settings = RuntimeSettings {
      dir: Some(temp.path().join("nope")),
      libraries: Vec::new(),
    };

    let err = stage_runtime(&settings, Profile::Debug, temp.path()).unwrap_err();

    assert!(matches!(err, BuildError::RuntimeNotFound { .. }));
  }

  #[test]
  fn no_runtime_contributes_nothing() {
    let temp = TempDir::new().unwrap();
    let contribution = stage_runtime(&RuntimeSettings::default(), Profile::Debug, temp.path()).unwrap();
    assert_eq!(contribution, RuntimeContribution::default());
  }
}
