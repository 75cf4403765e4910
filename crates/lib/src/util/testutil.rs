//! Test helpers: fake compiler drivers on a private search path.
//!
//! Each fake driver appends its argument list to a shared log, answers
//! `--version`, writes whatever file follows `-o`, and fails on any source
//! named `bad.*`.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub struct FakeToolchain {
  dir: TempDir,
  log: PathBuf,
}

impl FakeToolchain {
  /// Fake `clang`, `clang++`, `gcc` and `g++`.
  pub fn new() -> Self {
    Self::with_programs(&["clang", "clang++", "gcc", "g++"])
  }

  pub fn with_programs(programs: &[&str]) -> Self {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("invocations.log");
    let fake = Self { dir, log };
    for program in programs {
      fake.add(program);
    }
    fake
  }

  pub fn add(&self, program: &str) -> PathBuf {
    let banner = if program.contains("clang") {
      "clang version 17.0.6 (fake)"
    } else {
      "g++ (GCC) 13.2.0 (fake)"
    };
    let script = format!(
      r#"#!/bin/sh
echo "{program} $*" >> "{log}"
if [ "$1" = "--version" ]; then echo "{banner}"; exit 0; fi
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
"#,
      log = self.log.display(),
    );
    self.write_script(program, &script)
  }

  /// A driver that exists but fails its version probe.
  pub fn add_broken(&self, program: &str) -> PathBuf {
    self.write_script(program, "#!/bin/sh\necho broken >&2\nexit 1\n")
  }

  fn write_script(&self, program: &str, script: &str) -> PathBuf {
    let path = self.dir.path().join(program);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  pub fn bin_dir(&self) -> &Path {
    self.dir.path()
  }

  pub fn search_path(&self) -> Vec<PathBuf> {
    vec![self.dir.path().to_path_buf()]
  }

  pub fn invocations(&self) -> Vec<String> {
    fs::read_to_string(&self.log)
      .map(|s| s.lines().map(str::to_string).collect())
      .unwrap_or_default()
  }

  pub fn compile_count(&self) -> usize {
    self.invocations().iter().filter(|l| l.contains(" -c ")).count()
  }

  pub fn link_count(&self) -> usize {
    self
      .invocations()
      .iter()
      .filter(|l| !l.contains(" -c ") && !l.ends_with("--version"))
      .count()
  }

  pub fn clear_log(&self) {
    let _ = fs::remove_file(&self.log);
  }
}
