//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Driver script: logs its arguments, answers `--version`, writes whatever
/// follows `-o`, and rejects sources named `bad.*`.
#[cfg(unix)]
const FAKE_DRIVER: &str = r#"#!/bin/sh
echo "$0 $*" >> "${0%/*}/invocations.log"
if [ "$1" = "--version" ]; then echo "clang version 17.0.6 (fake)"; exit 0; fi
out=""
prev=""
for a in "$@"; do
  case "$a" in
    */bad.c|*/bad.cc|*/bad.cpp) echo "$a:1:1: error: expected ';'" >&2; exit 1 ;;
  esac
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
if [ -n "$out" ]; then echo "fake output" > "$out"; fi
exit 0
"#;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the node projects,
/// a private dependency cache, and fake compilers on `PATH`.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self { temp };
    #[cfg(unix)]
    env.install_fake_compilers();
    env
  }

  #[cfg(unix)]
  fn install_fake_compilers(&self) {
    use std::os::unix::fs::PermissionsExt;

    let bin = self.bin_path();
    std::fs::create_dir_all(&bin).unwrap();
    for program in ["clang", "clang++"] {
      let path = bin.join(program);
      std::fs::write(&path, FAKE_DRIVER).unwrap();
      std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
  }

  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap_or_else(|_| self.temp.path().to_path_buf())
  }

  pub fn bin_path(&self) -> PathBuf {
    self.root().join("bin")
  }

  pub fn cache_path(&self) -> PathBuf {
    self.root().join("cache")
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.root().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.root().join(relative_path)
  }

  /// Command lines the fake compilers were run with.
  pub fn compiler_invocations(&self) -> Vec<String> {
    std::fs::read_to_string(self.bin_path().join("invocations.log"))
      .map(|s| s.lines().map(str::to_string).collect())
      .unwrap_or_default()
  }

  /// A `cxxnode` command isolated from the host toolchain and cache.
  ///
  /// - `PATH`: only the fake compilers
  /// - `CXXNODE_CACHE`: a private cache root
  /// - `CXX`, `CXX_COMPILER`, `CXXNODE_RUNTIME_DIR`: removed
  pub fn cmd(&self, cwd: &Path) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("cxxnode");
    cmd.current_dir(cwd);
    cmd.env("PATH", self.bin_path());
    cmd.env("CXXNODE_CACHE", self.cache_path());
    cmd.env_remove("CXX");
    cmd.env_remove("CXX_COMPILER");
    cmd.env_remove("CXXNODE_RUNTIME_DIR");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
