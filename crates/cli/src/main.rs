mod cmd;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cxxnode_lib::toolchain::ToolchainPreference;

use crate::cmd::BuildArgs;
use crate::output::{OutputFormat, print_error};

/// Build C/C++ dataflow nodes
#[derive(Parser)]
#[command(name = "cxxnode")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a node executable
  Build {
    #[command(flatten)]
    args: BuildArgs,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
  },

  /// Inspect or clean the shared dependency cache
  Cache {
    #[command(subcommand)]
    command: CacheCommands,
  },

  /// Show the toolchain that would be used
  Toolchain {
    /// Compiler family to look for (auto, msvc, clang-cl, clang, gcc)
    #[arg(long, default_value = "auto")]
    toolchain: ToolchainPreference,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
  },
}

#[derive(Subcommand)]
enum CacheCommands {
  /// List cached dependency builds
  Info {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
  },

  /// Remove cached dependency builds
  Clean {
    /// Only remove entries for this dependency name
    name: Option<String>,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_filter = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .init();

  if let Err(e) = run(cli.command) {
    print_error(&format!("{e:#}"));
    std::process::exit(1);
  }
}

fn run(command: Commands) -> Result<()> {
  match command {
    Commands::Build { args, format } => cmd::cmd_build(args, format),
    Commands::Cache { command } => match command {
      CacheCommands::Info { format } => cmd::cmd_cache_info(format),
      CacheCommands::Clean { name, format } => cmd::cmd_cache_clean(name, format),
    },
    Commands::Toolchain { toolchain, format } => cmd::cmd_toolchain(toolchain, format),
  }
}
