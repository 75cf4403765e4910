//! Compiler families and their flag translation.
//!
//! Every abstract build option becomes a concrete argument here and nowhere
//! else. Adding a family means adding a variant and filling in each match.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::platform::os::Os;

/// Which compiler family a project asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolchainPreference {
  #[default]
  Auto,
  Msvc,
  ClangCl,
  Clang,
  Gcc,
}

impl ToolchainPreference {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Auto => "auto",
      Self::Msvc => "msvc",
      Self::ClangCl => "clang-cl",
      Self::Clang => "clang",
      Self::Gcc => "gcc",
    }
  }

  /// The single family this preference restricts detection to.
  pub fn family(&self) -> Option<Family> {
    match self {
      Self::Auto => None,
      Self::Msvc => Some(Family::Msvc),
      Self::ClangCl => Some(Family::ClangCl),
      Self::Clang => Some(Family::Clang),
      Self::Gcc => Some(Family::Gcc),
    }
  }
}

impl FromStr for ToolchainPreference {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "auto" => Ok(Self::Auto),
      "msvc" | "cl" => Ok(Self::Msvc),
      "clang-cl" => Ok(Self::ClangCl),
      "clang" => Ok(Self::Clang),
      "gcc" | "gnu" => Ok(Self::Gcc),
      other => Err(format!(
        "unknown toolchain '{other}', expected one of auto, msvc, clang-cl, clang, gcc"
      )),
    }
  }
}

impl fmt::Display for ToolchainPreference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Source language of a compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  C,
  Cxx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
  None,
  #[default]
  Default,
  All,
}

impl FromStr for WarningLevel {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "none" | "off" => Ok(Self::None),
      "default" => Ok(Self::Default),
      "all" => Ok(Self::All),
      other => Err(format!("unknown warning level '{other}', expected none, default or all")),
    }
  }
}

/// A supported compiler family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Family {
  Msvc,
  ClangCl,
  Clang,
  Gcc,
}

impl Family {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Msvc => "msvc",
      Self::ClangCl => "clang-cl",
      Self::Clang => "clang",
      Self::Gcc => "gcc",
    }
  }

  /// Detection order used when no family is requested.
  pub fn auto_priority(os: Os) -> &'static [Family] {
    if os.is_windows() {
      &[Self::Msvc, Self::ClangCl, Self::Clang, Self::Gcc]
    } else {
      &[Self::Clang, Self::Gcc]
    }
  }

  /// Executable name of the C++ driver.
  pub fn cxx_program(&self) -> &'static str {
    match self {
      Self::Msvc => "cl",
      Self::ClangCl => "clang-cl",
      Self::Clang => "clang++",
      Self::Gcc => "g++",
    }
  }

  /// Executable name of the C driver.
  pub fn cc_program(&self) -> &'static str {
    match self {
      Self::Msvc => "cl",
      Self::ClangCl => "clang-cl",
      Self::Clang => "clang",
      Self::Gcc => "gcc",
    }
  }

  /// Families that take MSVC-style `/flag` arguments.
  pub fn is_msvc_style(&self) -> bool {
    matches!(self, Self::Msvc | Self::ClangCl)
  }

  pub fn object_extension(&self) -> &'static str {
    if self.is_msvc_style() { "obj" } else { "o" }
  }

  /// Arguments for the identification probe.
  pub fn probe_args(&self) -> &'static [&'static str] {
    match self {
      Self::Msvc => &[],
      _ => &["--version"],
    }
  }

  /// Guess the family of an explicitly named compiler.
  ///
  /// `probe_output` refines a GCC-looking name that is really clang
  /// (e.g. `c++` on macOS).
  pub fn infer(program: &Path, probe_output: &str) -> Family {
    let stem = program
      .file_stem()
      .map(|s| s.to_string_lossy().to_ascii_lowercase())
      .unwrap_or_default();
    if stem == "cl" {
      Self::Msvc
    } else if stem == "clang-cl" {
      Self::ClangCl
    } else if stem.contains("clang") || probe_output.to_ascii_lowercase().contains("clang") {
      Self::Clang
    } else {
      Self::Gcc
    }
  }

  /// Flags every compile starts with.
  pub fn base_compile_flags(&self) -> Vec<String> {
    match self {
      Self::Msvc | Self::ClangCl => vec!["/nologo".into(), "/EHsc".into(), "/MD".into()],
      Self::Clang | Self::Gcc => Vec::new(),
    }
  }

  pub fn std_flag(&self, std: &str) -> String {
    if self.is_msvc_style() {
      format!("/std:{std}")
    } else {
      format!("-std={std}")
    }
  }

  pub fn warning_flags(&self, level: WarningLevel, as_errors: bool) -> Vec<String> {
    let mut flags: Vec<String> = match (self.is_msvc_style(), level) {
      (true, WarningLevel::None) => vec!["/W0".into()],
      (true, WarningLevel::Default) => vec!["/W3".into()],
      (true, WarningLevel::All) => vec!["/W4".into()],
      (false, WarningLevel::None) => vec!["-w".into()],
      (false, WarningLevel::Default) => vec!["-Wall".into()],
      (false, WarningLevel::All) => vec!["-Wall".into(), "-Wextra".into(), "-Wpedantic".into()],
    };
    if as_errors && level != WarningLevel::None {
      flags.push(if self.is_msvc_style() { "/WX".into() } else { "-Werror".into() });
    }
    flags
  }

  /// Optimisation level: `0`-`3`, `s` or `z`.
  pub fn optimization_flag(&self, level: &str) -> String {
    if !self.is_msvc_style() {
      return format!("-O{level}");
    }
    match level {
      "0" => "/Od".into(),
      "1" | "s" | "z" => "/O1".into(),
      "3" => "/Ox".into(),
      _ => "/O2".into(),
    }
  }

  pub fn debug_flag(&self) -> String {
    if self.is_msvc_style() { "/Z7".into() } else { "-g".into() }
  }

  pub fn define_flag(&self, define: &str) -> String {
    if self.is_msvc_style() {
      format!("/D{define}")
    } else {
      format!("-D{define}")
    }
  }

  pub fn include_flag(&self, dir: &Path) -> String {
    if self.is_msvc_style() {
      format!("/I{}", dir.display())
    } else {
      format!("-I{}", dir.display())
    }
  }

  /// Arguments that compile `source` to `object` without linking.
  pub fn compile_only_args(&self, source: &Path, object: &Path) -> Vec<OsString> {
    if self.is_msvc_style() {
      let mut fo = OsString::from("/Fo");
      fo.push(object);
      vec!["/c".into(), source.into(), fo]
    } else {
      vec!["-c".into(), source.into(), "-o".into(), object.into()]
    }
  }

  /// Forces a C++ driver to treat the next source as C.
  ///
  /// MSVC-style drivers pick the language from the extension already.
  pub fn force_c_flag(&self) -> Option<&'static str> {
    match self {
      Self::Clang | Self::Gcc => Some("-xc"),
      Self::Msvc | Self::ClangCl => None,
    }
  }

  pub fn output_exe_args(&self, exe: &Path) -> Vec<OsString> {
    if self.is_msvc_style() {
      let mut fe = OsString::from("/Fe");
      fe.push(exe);
      vec![fe]
    } else {
      vec!["-o".into(), exe.into()]
    }
  }

  pub fn lib_dir_flag(&self, dir: &Path) -> String {
    if self.is_msvc_style() {
      format!("/LIBPATH:{}", dir.display())
    } else {
      format!("-L{}", dir.display())
    }
  }

  pub fn library_flag(&self, name: &str) -> String {
    if self.is_msvc_style() {
      if name.to_ascii_lowercase().ends_with(".lib") {
        name.to_string()
      } else {
        format!("{name}.lib")
      }
    } else {
      format!("-l{name}")
    }
  }

  /// Libraries and flags the host always needs at link time.
  pub fn system_link_flags(&self, os: Os) -> Vec<String> {
    match (self.is_msvc_style(), os.is_windows()) {
      (true, _) => [
        "ws2_32.lib",
        "userenv.lib",
        "bcrypt.lib",
        "ole32.lib",
        "oleaut32.lib",
        "advapi32.lib",
        "ntdll.lib",
        "shell32.lib",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      (false, true) => vec!["-lws2_32".into()],
      (false, false) => vec!["-pthread".into()],
    }
  }

  /// Separator between compiler-driver arguments and linker-only arguments.
  pub fn linker_passthrough(&self) -> Option<&'static str> {
    if self.is_msvc_style() { Some("/link") } else { None }
  }
}

impl fmt::Display for Family {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
