use std::path::{Path, PathBuf};

use crate::consts::{APP_NAME, CACHE_ENV};

/// Returns the user's home directory
pub fn home_dir() -> Option<PathBuf> {
  dirs::home_dir()
}

/// Returns the shared dependency cache root.
///
/// `CXXNODE_CACHE` wins over the default of `~/.cxxnode`.
pub fn cache_root() -> Option<PathBuf> {
  if let Some(dir) = std::env::var_os(CACHE_ENV).filter(|v| !v.is_empty()) {
    return Some(PathBuf::from(dir));
  }
  home_dir().map(|home| home.join(format!(".{APP_NAME}")))
}

/// Directories listed in `PATH`, in order.
pub fn search_path() -> Vec<PathBuf> {
  std::env::var_os("PATH")
    .map(|paths| std::env::split_paths(&paths).collect())
    .unwrap_or_default()
}

/// Finds `program` in the given directories.
///
/// A name containing a path separator is checked as-is.
pub fn find_executable(program: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
  let candidate = Path::new(program);
  if candidate.components().count() > 1 {
    return is_executable(candidate).then(|| candidate.to_path_buf());
  }

  dirs.iter().find_map(|dir| {
    executable_names(program)
      .into_iter()
      .map(|name| dir.join(name))
      .find(|path| is_executable(path))
  })
}

#[cfg(windows)]
fn executable_names(program: &str) -> Vec<String> {
  if Path::new(program).extension().is_some() {
    vec![program.to_string()]
  } else {
    vec![format!("{program}.exe"), program.to_string()]
  }
}

#[cfg(not(windows))]
fn executable_names(program: &str) -> Vec<String> {
  vec![program.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  path
    .metadata()
    .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
  path.is_file()
}
