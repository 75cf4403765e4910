//! Host-provided dependencies discovered through pkg-config.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use super::DependencyError;
use super::types::{DependencyArtifacts, DependencySpec};
use crate::process::{Invocation, run};

/// Artifacts of a `system` dependency. Never touches the cache.
pub async fn discover(spec: &DependencySpec, timeout: Duration) -> Result<DependencyArtifacts, DependencyError> {
  let mut artifacts = DependencyArtifacts {
    name: spec.name.clone(),
    ..Default::default()
  };

  if let Some(package) = &spec.pkg_config {
    let cflags = pkg_config(&spec.name, package, "--cflags-only-I", timeout).await?;
    let libs = pkg_config(&spec.name, package, "--libs", timeout).await?;
    apply_flags(&mut artifacts, &cflags);
    apply_flags(&mut artifacts, &libs);
  }

  artifacts.include_dirs.extend(spec.include_dirs.iter().map(PathBuf::from));
  artifacts.lib_dirs.extend(spec.lib_dirs.iter().map(PathBuf::from));
  for lib in &spec.libraries {
    if !artifacts.libraries.contains(lib) {
      artifacts.libraries.push(lib.clone());
    }
  }
  debug!(name = %spec.name, ?artifacts, "resolved system dependency");
  Ok(artifacts)
}

async fn pkg_config(name: &str, package: &str, query: &str, timeout: Duration) -> Result<String, DependencyError> {
  let invocation = Invocation::new("pkg-config", timeout).arg(query).arg(package);
  let step = invocation.command_line();
  let output = run(&invocation).await.map_err(|e| DependencyError::BuildFailed {
    name: name.to_string(),
    step: step.clone(),
    output: e.to_string(),
  })?;
  if !output.success() {
    return Err(DependencyError::BuildFailed {
      name: name.to_string(),
      step,
      output: output.diagnostics(),
    });
  }
  Ok(output.stdout)
}

/// Fold `-I`, `-L` and `-l` tokens into `artifacts`; anything else is ignored.
fn apply_flags(artifacts: &mut DependencyArtifacts, output: &str) {
  for token in output.split_whitespace() {
    if let Some(dir) = token.strip_prefix("-I") {
      artifacts.include_dirs.push(PathBuf::from(dir));
    } else if let Some(dir) = token.strip_prefix("-L") {
      artifacts.lib_dirs.push(PathBuf::from(dir));
    } else if let Some(lib) = token.strip_prefix("-l")
      && !artifacts.libraries.iter().any(|l| l == lib)
    {
      artifacts.libraries.push(lib.to_string());
    }
  }
}
