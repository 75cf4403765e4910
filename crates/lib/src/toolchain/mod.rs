//! Compiler discovery and per-family flag translation.

mod detect;
pub mod family;

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub use detect::{PROBE_TIMEOUT, compiler_override, detect_toolchain};
pub use family::{Family, Language, ToolchainPreference, WarningLevel};

#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("toolchain '{requested}' is not available (tried: {})", .tried.join(", "))]
  Unavailable { requested: String, tried: Vec<String> },
}

/// A detected, invocable compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainHandle {
  pub family: Family,
  /// C++ compiler driver.
  pub cxx: PathBuf,
  /// C compiler driver; equals `cxx` when no separate driver was found.
  pub cc: PathBuf,
  /// Driver used for the link step.
  pub linker: PathBuf,
  /// First line of the identification probe.
  pub version: String,
}

impl ToolchainHandle {
  /// Driver for sources of the given language.
  pub fn driver(&self, language: Language) -> &PathBuf {
    match language {
      Language::C => &self.cc,
      Language::Cxx => &self.cxx,
    }
  }

  /// Whether C sources must be forced to C on the C++ driver.
  pub fn needs_force_c(&self) -> bool {
    self.cc == self.cxx && self.family.force_c_flag().is_some()
  }
}
