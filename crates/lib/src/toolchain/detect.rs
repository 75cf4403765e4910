use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::family::{Family, ToolchainPreference};
use super::{ToolchainError, ToolchainHandle};
use crate::consts::{CXX_COMPILER_ENV, CXX_ENV};
use crate::platform::os::Os;
use crate::platform::paths::find_executable;
use crate::process::{Invocation, run};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Compiler override from `CXX`, falling back to `CXX_COMPILER`.
pub fn compiler_override() -> Option<String> {
  [CXX_ENV, CXX_COMPILER_ENV]
    .iter()
    .filter_map(|key| std::env::var(key).ok())
    .map(|v| v.trim().to_string())
    .find(|v| !v.is_empty())
}

/// Select a compiler.
///
/// An invocable `env_override` wins outright. Otherwise the families allowed
/// by `preference` are probed in priority order and the first that answers
/// is used. A requested family that is missing is an error, never a fallback.
pub async fn detect_toolchain(
  preference: ToolchainPreference,
  os: Os,
  env_override: Option<&str>,
  search: &[PathBuf],
) -> Result<ToolchainHandle, ToolchainError> {
  if let Some(program) = env_override {
    match probe_override(program, search).await {
      Some(handle) => {
        info!(cxx = %handle.cxx.display(), family = %handle.family, "using compiler from environment");
        return Ok(handle);
      }
      None => warn!(program, "compiler override is not invocable, falling back to detection"),
    }
  }

  let candidates: Vec<Family> = match preference.family() {
    Some(family) => vec![family],
    None => Family::auto_priority(os).to_vec(),
  };

  let mut tried = Vec::new();
  for family in candidates {
    tried.push(family.cxx_program().to_string());
    let Some(cxx) = find_executable(family.cxx_program(), search) else {
      debug!(family = %family, "compiler not on search path");
      continue;
    };
    let Some(version) = probe(family, &cxx).await else {
      debug!(family = %family, cxx = %cxx.display(), "compiler failed its probe");
      continue;
    };
    let cc = find_c_driver(family, &cxx, search).await;
    let handle = ToolchainHandle {
      family,
      linker: cxx.clone(),
      cc,
      cxx,
      version,
    };
    info!(family = %handle.family, cxx = %handle.cxx.display(), version = %handle.version, "detected toolchain");
    return Ok(handle);
  }

  Err(ToolchainError::Unavailable {
    requested: preference.as_str().to_string(),
    tried,
  })
}

async fn probe_override(program: &str, search: &[PathBuf]) -> Option<ToolchainHandle> {
  let cxx = find_executable(program, search)?;
  // The family is unknown until the probe answers, so probe GNU-style first
  // unless the name says MSVC.
  let guess = Family::infer(&cxx, "");
  let version = probe(guess, &cxx).await?;
  let family = Family::infer(&cxx, &version);
  let cc = sibling_c_driver(&cxx, search).unwrap_or_else(|| cxx.clone());
  Some(ToolchainHandle {
    family,
    linker: cxx.clone(),
    cc,
    cxx,
    version,
  })
}

/// Run the identification probe; `None` means treat as absent.
async fn probe(family: Family, program: &Path) -> Option<String> {
  let invocation = Invocation::new(program, PROBE_TIMEOUT).args(family.probe_args());
  let output = match run(&invocation).await {
    Ok(output) => output,
    Err(e) => {
      debug!(program = %program.display(), error = %e, "probe failed");
      return None;
    }
  };

  // cl prints its banner on stderr and may exit non-zero without inputs.
  let accepted = output.success() || (family == Family::Msvc && output.stderr.contains("Microsoft"));
  if !accepted {
    return None;
  }

  let text = if output.stdout.trim().is_empty() {
    &output.stderr
  } else {
    &output.stdout
  };
  Some(text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default().to_string())
}

async fn find_c_driver(family: Family, cxx: &Path, search: &[PathBuf]) -> PathBuf {
  if family.cc_program() == family.cxx_program() {
    return cxx.to_path_buf();
  }
  if let Some(cc) = sibling_c_driver(cxx, search)
    && probe(family, &cc).await.is_some()
  {
    return cc;
  }
  cxx.to_path_buf()
}

/// `clang++-17` -> `clang-17`, `x86_64-linux-gnu-g++` -> `x86_64-linux-gnu-gcc`.
fn sibling_c_driver(cxx: &Path, search: &[PathBuf]) -> Option<PathBuf> {
  let name = cxx.file_name()?.to_str()?;
  let c_name = if name.contains("clang++") {
    name.replacen("clang++", "clang", 1)
  } else if name.contains("g++") {
    name.replacen("g++", "gcc", 1)
  } else if name.contains("c++") {
    name.replacen("c++", "cc", 1)
  } else {
    return None;
  };
  let sibling = cxx.with_file_name(&c_name);
  find_executable(&sibling.to_string_lossy(), search).or_else(|| find_executable(&c_name, search))
}
