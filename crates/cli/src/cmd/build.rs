//! Implementation of the `cxxnode build` command.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use cxxnode_lib::config::{CliOverrides, Profile, resolve_config};
use cxxnode_lib::pipeline::{PipelineOptions, build_node};
use cxxnode_lib::toolchain::ToolchainPreference;

use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success};

#[derive(Debug, Args)]
pub struct BuildArgs {
  /// Node project directory (default: auto-detect from the current directory)
  #[arg(long)]
  pub node_dir: Option<PathBuf>,

  /// Configuration file to read instead of searching for one
  #[arg(long, conflicts_with = "no_config")]
  pub config: Option<PathBuf>,

  /// Ignore any configuration file and build from defaults
  #[arg(long)]
  pub no_config: bool,

  /// Build profile (debug or release)
  #[arg(long)]
  pub profile: Option<Profile>,

  /// Compiler family (auto, msvc, clang-cl, clang, gcc)
  #[arg(long)]
  pub toolchain: Option<ToolchainPreference>,

  /// C++ language standard, e.g. c++20
  #[arg(long)]
  pub std: Option<String>,

  /// Executable name
  #[arg(long)]
  pub out: Option<String>,

  /// Output directory (default: <node-dir>/target)
  #[arg(long)]
  pub out_dir: Option<PathBuf>,

  /// Parallel compile jobs
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// Dataflow runtime build output directory
  #[arg(long)]
  pub runtime_dir: Option<PathBuf>,

  /// Rebuild dependencies even if they are cached
  #[arg(long)]
  pub force_deps: bool,
}

impl BuildArgs {
  fn overrides(&self) -> CliOverrides {
    CliOverrides {
      config: self.config.clone(),
      no_config: self.no_config,
      profile: self.profile,
      toolchain: self.toolchain,
      std: self.std.clone(),
      output: self.out.clone(),
      out_dir: self.out_dir.clone(),
      parallel_jobs: self.jobs,
      runtime_dir: self.runtime_dir.clone(),
      force_rebuild_deps: self.force_deps,
    }
  }
}

pub fn cmd_build(args: BuildArgs, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let cwd = std::env::current_dir().context("Failed to determine current directory")?;

  let config = resolve_config(args.node_dir.as_deref(), &cwd, &args.overrides())
    .context("Failed to resolve project configuration")?;
  let options = PipelineOptions::from_env()?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt
    .block_on(build_node(&config, &options))
    .with_context(|| format!("Failed to build node '{}'", config.name))?;

  if output.is_json() {
    return print_json(&outcome);
  }

  let report = &outcome.report;
  println!();
  if report.linked {
    print_success(&format!("Built {}", config.name));
  } else {
    print_info(&format!("{} is up to date", config.name));
  }
  print_stat("Executable", &report.executable.display().to_string());
  print_stat(
    "Toolchain",
    &format!("{} ({})", outcome.toolchain.family, outcome.toolchain.cxx.display()),
  );
  print_stat("Profile", config.build.profile.as_str());
  print_stat(
    "Sources",
    &format!(
      "{} ({} compiled, {} up to date)",
      outcome.source_count, report.compiled, report.reused
    ),
  );
  if !outcome.dependencies.is_empty() {
    let hits = outcome.dependencies.iter().filter(|d| d.cache_hit).count();
    print_stat(
      "Dependencies",
      &format!("{} ({} from cache)", outcome.dependencies.len(), hits),
    );
  }
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
