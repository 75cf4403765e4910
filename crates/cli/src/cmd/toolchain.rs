//! Implementation of the `cxxnode toolchain` command.

use anyhow::{Context, Result};

use cxxnode_lib::pipeline::PipelineOptions;
use cxxnode_lib::platform::host_triple;
use cxxnode_lib::toolchain::{ToolchainPreference, detect_toolchain};

use crate::output::{OutputFormat, print_json, print_stat, print_success};

pub fn cmd_toolchain(preference: ToolchainPreference, output: OutputFormat) -> Result<()> {
  let options = PipelineOptions::from_env()?;
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let handle = rt.block_on(detect_toolchain(
    preference,
    options.os,
    options.compiler_override.as_deref(),
    &options.search_path,
  ))?;

  if output.is_json() {
    return print_json(&handle);
  }

  print_success(&format!("Found {} toolchain", handle.family));
  if let Some(triple) = host_triple() {
    print_stat("Platform", &triple);
  }
  print_stat("C++ compiler", &handle.cxx.display().to_string());
  print_stat("C compiler", &handle.cc.display().to_string());
  print_stat("Linker", &handle.linker.display().to_string());
  print_stat("Version", &handle.version);
  Ok(())
}
